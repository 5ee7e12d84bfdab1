//! Command dispatch - inhibitor phases, permission and cooldown checks,
//! argument extraction and execution

pub mod arguments;
pub mod cooldown;
pub mod dispatcher;
pub mod permissions;

pub use arguments::extract_arguments;
pub use cooldown::{CooldownCheck, CooldownManager};
pub use dispatcher::{CommandHandler, CommandKey, DispatchConfig, Outcome, INTERACTION_CREATE, MESSAGE_CREATE};
pub use permissions::missing_permissions;
