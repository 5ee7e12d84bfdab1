//! Module loading - file discovery and YAML manifest sources
//!
//! A module file is a manifest naming the factory that builds the module
//! plus the options it is built with.

pub mod fs;
pub mod manifest;
pub mod source;

pub use fs::LocalFs;
pub use manifest::ModuleManifest;
pub use source::{Factory, ManifestSource};
