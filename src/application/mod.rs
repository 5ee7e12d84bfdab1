//! Application layer - Registries and dispatch
//!
//! This layer contains:
//! - Registry: generic module loading, indexing and hot reload
//! - Inhibitors, Listeners: specialised registries
//! - Messaging: the command dispatcher and its checks
//! - Events: the typed event bus each registry owns
//! - Errors: Domain-specific errors

pub mod errors;
pub mod events;
pub mod inhibitors;
pub mod listeners;
pub mod messaging;
pub mod registry;

pub use events::{EventBus, EventKind, HandlerEvent, PermissionSide};
pub use inhibitors::InhibitorHandler;
pub use listeners::{ListenerHandler, CLIENT_SOURCE};
pub use messaging::{CommandHandler, DispatchConfig, Outcome};
pub use registry::{HandlerOptions, LoadedModule, ModuleHandler, RegistryHooks};
