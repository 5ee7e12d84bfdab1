use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{Interaction, Module, ModuleKind, DEFAULT_CATEGORY};
use crate::application::errors::{CommandError, HandlerError};

/// Where a command may be invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Guild,
    Dm,
}

/// Type tag of a declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Boolean,
    Integer,
    Number,
    String,
    User,
    Mentionable,
    Channel,
    Role,
    Member,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArgumentSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

impl ArgumentSpec {
    pub fn new(id: impl Into<String>, kind: ArgumentType) -> Self {
        Self {
            id: id.into(),
            kind,
            description: String::new(),
            required: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Value extracted for one argument. Absent or unresolvable options are `Empty`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    User(Value),
    Member(Value),
    Role(Value),
    Channel(Value),
    Mentionable(Value),
    Empty,
}

impl ArgValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, ArgValue::Empty)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Extracted arguments keyed by argument id, in declaration order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandArgs {
    values: IndexMap<String, ArgValue>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, value: ArgValue) {
        self.values.insert(id.into(), value);
    }

    /// Returns `Empty` for undeclared ids
    pub fn get(&self, id: &str) -> &ArgValue {
        self.values.get(id).unwrap_or(&ArgValue::Empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves the permissions an interaction is missing.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    /// `None` when nothing is missing.
    async fn missing(&self, interaction: &Interaction) -> Result<Option<Vec<String>>, CommandError>;
}

/// Permission requirement for one side (client or user)
#[derive(Clone)]
pub enum PermissionCheck {
    /// Named flags, compared against the permissions resolved on the interaction
    Flags(Vec<String>),
    Custom(Arc<dyn PermissionResolver>),
}

impl fmt::Debug for PermissionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionCheck::Flags(flags) => f.debug_tuple("Flags").field(flags).finish(),
            PermissionCheck::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub type IgnorePredicate = Arc<dyn Fn(&Interaction, &CommandOptions) -> bool + Send + Sync>;

/// Bypass rule for cooldowns and user permissions
#[derive(Clone)]
pub enum IgnoreRule {
    User(String),
    Users(Vec<String>),
    Predicate(IgnorePredicate),
}

impl IgnoreRule {
    pub fn matches(&self, interaction: &Interaction, command: &CommandOptions) -> bool {
        match self {
            IgnoreRule::User(id) => interaction.user.id == *id,
            IgnoreRule::Users(ids) => ids.iter().any(|id| *id == interaction.user.id),
            IgnoreRule::Predicate(predicate) => predicate(interaction, command),
        }
    }
}

impl fmt::Debug for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreRule::User(id) => f.debug_tuple("User").field(id).finish(),
            IgnoreRule::Users(ids) => f.debug_tuple("Users").field(ids).finish(),
            IgnoreRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Static description of a command
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    /// Parent command for subcommands; `"config"` or `"config user"` for a group
    pub parent: Option<String>,
    pub args: Vec<ArgumentSpec>,
    /// Cooldown in milliseconds; falls back to the handler default when `None`
    pub cooldown: Option<u64>,
    /// Uses allowed per cooldown window
    pub ratelimit: u32,
    pub owner_only: bool,
    pub channel: Option<ChannelKind>,
    pub client_permissions: Option<PermissionCheck>,
    pub user_permissions: Option<PermissionCheck>,
    pub ignore_cooldown: Option<IgnoreRule>,
    pub ignore_permissions: Option<IgnoreRule>,
    pub default_permission: bool,
}

impl CommandOptions {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: DEFAULT_CATEGORY.to_string(),
            parent: None,
            args: Vec::new(),
            cooldown: None,
            ratelimit: 1,
            owner_only: false,
            channel: None,
            client_permissions: None,
            user_permissions: None,
            ignore_cooldown: None,
            ignore_permissions: None,
            default_permission: true,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_arg(mut self, arg: ArgumentSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_cooldown(mut self, millis: u64, ratelimit: u32) -> Self {
        self.cooldown = Some(millis);
        self.ratelimit = ratelimit;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    pub fn with_channel(mut self, channel: ChannelKind) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_client_permissions(mut self, check: PermissionCheck) -> Self {
        self.client_permissions = Some(check);
        self
    }

    pub fn with_user_permissions(mut self, check: PermissionCheck) -> Self {
        self.user_permissions = Some(check);
        self
    }

    pub fn with_ignore_cooldown(mut self, rule: IgnoreRule) -> Self {
        self.ignore_cooldown = Some(rule);
        self
    }

    pub fn with_ignore_permissions(mut self, rule: IgnoreRule) -> Self {
        self.ignore_permissions = Some(rule);
        self
    }

    /// Fails when the command has no name.
    pub fn validate(self) -> Result<Self, HandlerError> {
        if self.name.trim().is_empty() {
            return Err(HandlerError::MissingName {
                kind: ModuleKind::Command,
                id: self.id,
                field: "name",
            });
        }
        Ok(self)
    }
}

/// A command module
#[async_trait]
pub trait Command: Send + Sync {
    fn options(&self) -> &CommandOptions;

    async fn exec(&self, _interaction: &Interaction, _args: &CommandArgs) -> Result<Value, CommandError> {
        Err(CommandError::not_implemented(&self.options().id, "exec"))
    }
}

impl Module for dyn Command {
    fn id(&self) -> &str {
        &self.options().id
    }

    fn category_id(&self) -> &str {
        &self.options().category
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::User;

    #[test]
    fn test_nameless_command_fails_validation() {
        let err = CommandOptions::new("broken", "  ").validate().unwrap_err();
        assert!(matches!(err, HandlerError::MissingName { field: "name", .. }));
        assert!(CommandOptions::new("ping", "ping").validate().is_ok());
    }

    #[test]
    fn test_ignore_rules() {
        let options = CommandOptions::new("ping", "ping");
        let alice = Interaction::command(User::new("alice"), "ping");

        assert!(IgnoreRule::User("alice".into()).matches(&alice, &options));
        assert!(!IgnoreRule::User("bob".into()).matches(&alice, &options));
        assert!(IgnoreRule::Users(vec!["bob".into(), "alice".into()]).matches(&alice, &options));
        let by_name = IgnoreRule::Predicate(Arc::new(|_, cmd| cmd.name == "ping"));
        assert!(by_name.matches(&alice, &options));
    }

    #[test]
    fn test_args_default_to_empty() {
        let mut args = CommandArgs::new();
        args.insert("text", ArgValue::String("hi".into()));
        assert_eq!(args.get("text").as_str(), Some("hi"));
        assert!(args.get("missing").is_empty());
    }
}
