//! Foundation module - core utilities shared by every layer
//!
//! - Math types and transform helpers
//! - Logging setup

pub mod logging;
pub mod math;
