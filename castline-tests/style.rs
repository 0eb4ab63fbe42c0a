//! Style Enforcement Tests
//!
//! Checks patterns that clippy alone does not catch.
//!
//! # Test Organization
//!
//! - `dead_code_enforcement` - Prevents #[allow(dead_code)] in production code
//!
//! These tests scan every workspace crate and fail if violations are found.

#[path = "style/dead_code_enforcement.rs"]
mod dead_code_enforcement;
