//! Module manifest definition

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::application::errors::{HandlerError, LoadError};
use crate::domain::entities::{
    ArgumentSpec, ChannelKind, CommandOptions, IgnoreRule, InhibitorOptions, InhibitorPhase, ListenerMode,
    ListenerOptions, ModuleKind, PermissionCheck, DEFAULT_CATEGORY,
};

/// One module file.
///
/// Only the fields of the declared `kind` are read; the rest are ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleManifest {
    pub kind: ModuleKind,
    pub id: String,

    /// Factory that builds the module. Defaults to the id.
    pub factory: Option<String>,

    pub category: Option<String>,

    pub description: Option<String>,

    /// Command name (required for commands)
    pub name: Option<String>,

    /// Parent command path of a subcommand
    pub parent: Option<String>,

    #[serde(default)]
    pub args: Vec<ArgumentSpec>,

    /// Cooldown in milliseconds
    pub cooldown: Option<u64>,

    pub ratelimit: Option<u32>,

    #[serde(default)]
    pub owner_only: bool,

    pub channel: Option<ChannelKind>,

    pub client_permissions: Option<Vec<String>>,

    pub user_permissions: Option<Vec<String>>,

    /// User ids that skip the cooldown
    pub ignore_cooldown: Option<Vec<String>>,

    /// User ids that skip user permission checks
    pub ignore_permissions: Option<Vec<String>>,

    pub phase: Option<InhibitorPhase>,

    #[serde(default)]
    pub priority: i32,

    /// Block reason reported by an inhibitor
    pub reason: Option<String>,

    /// Source key a listener binds to. Defaults to the client.
    pub emitter: Option<String>,

    pub event: Option<String>,

    #[serde(default)]
    pub mode: ListenerMode,

    /// Factory-specific settings
    #[serde(default)]
    pub settings: Value,
}

impl ModuleManifest {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| LoadError::Parse(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> Result<Self, LoadError> {
        serde_yaml::from_str(content).map_err(|e| LoadError::Parse(e.to_string()))
    }

    pub fn factory_name(&self) -> &str {
        self.factory.as_deref().unwrap_or(&self.id)
    }

    fn category_id(&self) -> String {
        self.category.clone().unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    pub fn command_options(&self) -> Result<CommandOptions, HandlerError> {
        let mut options = CommandOptions::new(&self.id, self.name.clone().unwrap_or_default())
            .with_category(self.category_id())
            .with_description(self.description.clone().unwrap_or_default());
        options.parent = self.parent.clone();
        options.args = self.args.clone();
        options.cooldown = self.cooldown;
        options.ratelimit = self.ratelimit.unwrap_or(1);
        options.owner_only = self.owner_only;
        options.channel = self.channel;
        options.client_permissions = self.client_permissions.clone().map(PermissionCheck::Flags);
        options.user_permissions = self.user_permissions.clone().map(PermissionCheck::Flags);
        options.ignore_cooldown = self.ignore_cooldown.clone().map(IgnoreRule::Users);
        options.ignore_permissions = self.ignore_permissions.clone().map(IgnoreRule::Users);
        options.validate()
    }

    pub fn inhibitor_options(&self) -> InhibitorOptions {
        InhibitorOptions::new(&self.id, self.phase.unwrap_or_default())
            .with_category(self.category_id())
            .with_priority(self.priority)
            .with_reason(self.reason.clone().unwrap_or_else(|| self.id.clone()))
    }

    pub fn listener_options(&self) -> Result<ListenerOptions, HandlerError> {
        let emitter = self.emitter.as_deref().unwrap_or(crate::application::listeners::CLIENT_SOURCE);
        let mut options = ListenerOptions::new(&self.id, emitter, self.event.clone().unwrap_or_default())
            .with_category(self.category_id());
        options.mode = self.mode;
        options.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::ArgumentType;

    #[test]
    fn test_command_manifest() {
        let manifest = ModuleManifest::parse(
            r#"
kind: command
id: config-set
factory: config
name: Set
parent: config
cooldown: 1000
ratelimit: 2
owner-only: true
args:
  - id: key
    type: string
    required: true
client-permissions: [SEND_MESSAGES]
ignore-cooldown: ["42"]
"#,
        )
        .unwrap();

        assert_eq!(manifest.factory_name(), "config");
        let options = manifest.command_options().unwrap();
        assert_eq!(options.parent.as_deref(), Some("config"));
        assert_eq!(options.cooldown, Some(1000));
        assert_eq!(options.ratelimit, 2);
        assert!(options.owner_only);
        assert_eq!(options.args[0].kind, ArgumentType::String);
        assert!(matches!(options.client_permissions, Some(PermissionCheck::Flags(ref f)) if f == &["SEND_MESSAGES"]));
        assert_eq!(options.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_nameless_command_is_rejected() {
        let manifest = ModuleManifest::parse("kind: command\nid: ghost\n").unwrap();
        assert!(matches!(
            manifest.command_options(),
            Err(HandlerError::MissingName { field: "name", .. })
        ));
    }

    #[test]
    fn test_inhibitor_and_listener_defaults() {
        let inhibitor = ModuleManifest::parse("kind: inhibitor\nid: blacklist\npriority: 3\n").unwrap();
        let options = inhibitor.inhibitor_options();
        assert_eq!(options.phase, InhibitorPhase::Post);
        assert_eq!(options.reason, "blacklist");
        assert_eq!(options.priority, 3);

        let listener = ModuleManifest::parse("kind: listener\nid: ready\nevent: ready\nmode: once\n").unwrap();
        let options = listener.listener_options().unwrap();
        assert_eq!(options.mode, ListenerMode::Once);
        assert!(matches!(options.emitter, crate::domain::entities::SourceRef::Key(ref k) if k == "client"));

        let deaf = ModuleManifest::parse("kind: listener\nid: deaf\n").unwrap();
        assert!(deaf.listener_options().is_err());
    }

    #[test]
    fn test_malformed_manifest() {
        assert!(matches!(ModuleManifest::parse("kind: [oops"), Err(LoadError::Parse(_))));
        assert!(matches!(ModuleManifest::parse("kind: widget\nid: x\n"), Err(LoadError::Parse(_))));
    }
}
