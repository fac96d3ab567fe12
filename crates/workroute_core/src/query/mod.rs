//! Authorization-scoped query builders.
//!
//! # Responsibility
//! - Accumulate filter dimensions through by-value setters.
//! - Hand the finished filter to the repository inside a connection scope.
//!
//! # Invariants
//! - An empty dimension places no constraint; values in one dimension are
//!   alternatives and dimensions combine conjunctively.
//! - `list` and `list_page` share the id-ascending order, so pages are stable
//!   over an unchanged dataset.
//! - `single` never picks an arbitrary row: more than one match fails with
//!   `CoreError::AmbiguousResult`.

mod classification_query;
mod workbasket_query;

pub use classification_query::ClassificationQuery;
pub use workbasket_query::WorkbasketQuery;

use crate::error::{CoreError, CoreResult};

pub(crate) fn string_list<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

/// Reduces a fetch of at most two rows to the `single()` contract.
pub(crate) fn expect_single<T>(
    mut rows: Vec<T>,
    count_all: impl FnOnce() -> CoreResult<u64>,
) -> CoreResult<Option<T>> {
    match rows.len() {
        0 => Ok(None),
        1 => Ok(rows.pop()),
        _ => Err(CoreError::AmbiguousResult(count_all()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::{expect_single, string_list};
    use crate::error::CoreError;

    #[test]
    fn single_contract() {
        assert_eq!(expect_single(Vec::<u8>::new(), || Ok(0)).unwrap(), None);
        assert_eq!(expect_single(vec![7u8], || Ok(1)).unwrap(), Some(7));
        assert!(matches!(
            expect_single(vec![1u8, 2], || Ok(5)),
            Err(CoreError::AmbiguousResult(5))
        ));
    }

    #[test]
    fn string_list_accepts_str_and_string() {
        assert_eq!(string_list(["a", "b"]), vec!["a", "b"]);
        assert_eq!(string_list(vec!["c".to_string()]), vec!["c"]);
        assert!(string_list(Vec::<String>::new()).is_empty());
    }
}
