//! Serialization utilities for common patterns
//!
//! This module contains helpers for wire formats that are looser than the
//! types we want to expose.

// Used with the module pattern: #[serde(with = "string_or_number")]
pub mod string_or_number;
