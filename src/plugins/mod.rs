//! Built-in modules
//!
//! Each built-in is a named factory that module manifests refer to with
//! `factory:`. The sources returned here carry every built-in factory.

pub mod builtin;

pub use builtin::{command_source, inhibitor_source, listener_source};
