//! carik-dispatch - module registry and command dispatch for chat bots
//!
//! Commands, inhibitors and listeners are loaded from manifest files into
//! generic registries that support hot reload. Incoming interactions run
//! through a phased inhibitor chain, permission and cooldown checks before a
//! command body executes.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod plugins;

pub use application::errors::{CommandError, ConfigError, HandlerError, HandlerResult, LoadError};
pub use application::{
    CommandHandler, DispatchConfig, EventBus, EventKind, HandlerEvent, HandlerOptions, InhibitorHandler,
    ListenerHandler, ModuleHandler, Outcome,
};
