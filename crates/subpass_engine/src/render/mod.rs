//! Rendering
//!
//! [`vulkan`] holds the backend wrappers and graph-building primitives;
//! [`RenderContext`] ties the long-lived pieces together for one run.

mod context;
pub mod vulkan;

pub use context::RenderContext;
