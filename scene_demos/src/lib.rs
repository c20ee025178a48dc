//! Shared plumbing for the demo binaries
//!
//! Every binary implements [`common::RenderGraph`] for its own render pass
//! layout and hands it to [`common::run`], which owns the window, the render
//! context, the loaded scene and the frame loop.

pub mod common;
