//! Domain model for classifications, workbaskets, access control and tasks.
//!
//! # Responsibility
//! - Define canonical data structures used by resolvers, queries and services.
//! - Keep validation rules next to the data they constrain.
//!
//! # Invariants
//! - Classifications are identified by `(key, domain)`; `domain == ""` is the
//!   domain-independent root definition.
//! - Workbaskets are identified by generated id and by unique key.
//! - Rows are never physically deleted by the core.

pub mod access;
pub mod classification;
pub mod service_level;
pub mod task;
pub mod workbasket;

/// Generates a prefixed system id such as `CLI:5f0c...`.
pub(crate) fn generate_id(prefix: &str) -> String {
    format!("{prefix}:{}", uuid::Uuid::new_v4())
}

/// Number of generic custom string columns on classifications and workbaskets.
pub const CUSTOM_FIELD_COUNT: usize = 10;

/// Generic custom string columns, addressed 1-based through accessors.
pub type CustomFields = [Option<String>; CUSTOM_FIELD_COUNT];

pub(crate) fn custom_slot(fields: &CustomFields, number: usize) -> Option<&str> {
    number
        .checked_sub(1)
        .and_then(|index| fields.get(index))
        .and_then(|value| value.as_deref())
}

pub(crate) fn set_custom_slot(
    fields: &mut CustomFields,
    number: usize,
    value: Option<String>,
) -> bool {
    match number.checked_sub(1).and_then(|index| fields.get_mut(index)) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{custom_slot, generate_id, set_custom_slot, CustomFields};

    #[test]
    fn generated_ids_carry_prefix_and_are_unique() {
        let first = generate_id("CLI");
        let second = generate_id("CLI");
        assert!(first.starts_with("CLI:"));
        assert_ne!(first, second);
    }

    #[test]
    fn custom_slots_are_one_based() {
        let mut fields = CustomFields::default();
        assert!(set_custom_slot(&mut fields, 1, Some("a".to_string())));
        assert!(set_custom_slot(&mut fields, 10, Some("j".to_string())));
        assert!(!set_custom_slot(&mut fields, 0, Some("x".to_string())));
        assert!(!set_custom_slot(&mut fields, 11, Some("x".to_string())));
        assert_eq!(custom_slot(&fields, 1), Some("a"));
        assert_eq!(custom_slot(&fields, 10), Some("j"));
        assert_eq!(custom_slot(&fields, 0), None);
    }
}
