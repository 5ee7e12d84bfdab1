//! Domain layer - Core types with no I/O
//!
//! This layer contains:
//! - Entities: modules, categories, interactions, command/inhibitor/listener options
//! - Traits: Abstractions for external collaborators (event sources, schema registrar)

pub mod entities;
pub mod traits;
