//! Domain traits - Abstractions for external collaborators

pub mod loader;
pub mod registrar;
pub mod source;

pub use loader::{FileSystem, ModuleSource};
pub use registrar::SchemaRegistrar;
pub use source::{EventSource, ListenerFn};
