//! Domain entities - Core objects shared by every handler

pub mod category;
pub mod command;
pub mod inhibitor;
pub mod interaction;
pub mod listener;
pub mod module;
pub mod schema;
pub mod user;

pub use category::Category;
pub use command::{
    ArgValue, ArgumentSpec, ArgumentType, ChannelKind, Command, CommandArgs, CommandOptions,
    IgnoreRule, PermissionCheck, PermissionResolver,
};
pub use inhibitor::{Inhibitor, InhibitorOptions, InhibitorPhase};
pub use interaction::{CommandData, CommandOption, Content, Interaction, OptionType, Resolved};
pub use listener::{Listener, ListenerMode, ListenerOptions, SourceRef};
pub use module::{Module, ModuleInfo, ModuleKind, DEFAULT_CATEGORY};
pub use schema::{CommandSchema, SchemaNode, SyncTarget};
pub use user::User;
