//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Loader: module discovery and manifest sources
//! - Emitter: in-process event source
//! - Adapters: platform integrations (console)

pub mod adapters;
pub mod config;
pub mod emitter;
pub mod loader;
