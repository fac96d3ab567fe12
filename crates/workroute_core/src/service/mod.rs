//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Run every call inside one engine connection scope.

pub mod classification_service;
pub mod monitor_service;
pub mod task_service;
pub mod workbasket_service;
