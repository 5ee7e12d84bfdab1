use super::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Declared type of a slash-command option in the platform payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    SubCommand,
    SubCommandGroup,
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
}

/// One option of a command invocation. Subcommands and groups nest their
/// own options.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OptionType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandOption {
    pub fn new(name: impl Into<String>, kind: OptionType, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            kind,
            value: Some(value.into()),
            options: Vec::new(),
        }
    }

    pub fn subcommand(name: impl Into<String>, options: Vec<CommandOption>) -> Self {
        Self {
            name: name.into(),
            kind: OptionType::SubCommand,
            value: None,
            options,
        }
    }

    pub fn group(name: impl Into<String>, subcommand: CommandOption) -> Self {
        Self {
            name: name.into(),
            kind: OptionType::SubCommandGroup,
            value: None,
            options: vec![subcommand],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

/// Interaction content
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Message { text: String },
    Command(CommandData),
}

/// Entities referenced by id from command options
#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct Resolved {
    #[serde(default)]
    pub users: HashMap<String, Value>,
    #[serde(default)]
    pub members: HashMap<String, Value>,
    #[serde(default)]
    pub roles: HashMap<String, Value>,
    #[serde(default)]
    pub channels: HashMap<String, Value>,
}

/// An incoming event: a plain message or a command invocation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Interaction {
    #[serde(default = "new_interaction_id")]
    pub id: String,
    pub user: User,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub content: Content,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Permissions the application holds in the channel
    #[serde(default)]
    pub app_permissions: Option<Vec<String>>,
    /// Permissions the invoking member holds in the channel
    #[serde(default)]
    pub member_permissions: Option<Vec<String>>,
    #[serde(default)]
    pub resolved: Resolved,
}

fn new_interaction_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Interaction {
    pub fn new(user: User, content: Content) -> Self {
        Self {
            id: new_interaction_id(),
            user,
            guild_id: None,
            channel_id: None,
            content,
            created_at: Utc::now(),
            app_permissions: None,
            member_permissions: None,
            resolved: Resolved::default(),
        }
    }

    pub fn message(user: User, text: impl Into<String>) -> Self {
        Self::new(user, Content::Message { text: text.into() })
    }

    pub fn command(user: User, name: impl Into<String>) -> Self {
        Self::new(
            user,
            Content::Command(CommandData {
                name: name.into(),
                options: Vec::new(),
            }),
        )
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    pub fn in_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        if let Content::Command(data) = &mut self.content {
            data.options.push(option);
        }
        self
    }

    pub fn with_app_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.app_permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_member_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.member_permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_resolved(mut self, resolved: Resolved) -> Self {
        self.resolved = resolved;
        self
    }

    pub fn is_command(&self) -> bool {
        matches!(self.content, Content::Command(_))
    }

    pub fn is_guild(&self) -> bool {
        self.guild_id.is_some()
    }

    pub fn command_data(&self) -> Option<&CommandData> {
        match &self.content {
            Content::Command(data) => Some(data),
            Content::Message { .. } => None,
        }
    }

    /// Event timestamp in milliseconds since the epoch
    pub fn created_timestamp(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    pub fn subcommand_group(&self) -> Option<&str> {
        self.command_data()?
            .options
            .iter()
            .find(|o| o.kind == OptionType::SubCommandGroup)
            .map(|o| o.name.as_str())
    }

    pub fn subcommand(&self) -> Option<&str> {
        let data = self.command_data()?;
        let scope = match data.options.iter().find(|o| o.kind == OptionType::SubCommandGroup) {
            Some(group) => &group.options,
            None => &data.options,
        };
        scope
            .iter()
            .find(|o| o.kind == OptionType::SubCommand)
            .map(|o| o.name.as_str())
    }

    /// The `(parent, name)` pair a command is resolved by.
    ///
    /// `/ping` is `(None, "ping")`, `/config set` is `(Some("config"), "set")`
    /// and `/config user set` is `(Some("config user"), "set")`.
    pub fn command_path(&self) -> Option<(Option<String>, String)> {
        let data = self.command_data()?;
        match self.subcommand() {
            Some(sub) => {
                let parent = match self.subcommand_group() {
                    Some(group) => format!("{} {}", data.name, group),
                    None => data.name.clone(),
                };
                Some((Some(parent), sub.to_string()))
            }
            None => Some((None, data.name.clone())),
        }
    }

    /// Value-bearing options of the invoked (sub)command
    pub fn options(&self) -> &[CommandOption] {
        let Some(data) = self.command_data() else {
            return &[];
        };
        let mut scope = data.options.as_slice();
        while let Some(nested) = scope
            .iter()
            .find(|o| matches!(o.kind, OptionType::SubCommand | OptionType::SubCommandGroup))
        {
            scope = nested.options.as_slice();
        }
        scope
    }

    pub fn option(&self, name: &str) -> Option<&CommandOption> {
        self.options().iter().find(|o| o.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_path_for_top_level_command() {
        let interaction = Interaction::command(User::new("1"), "ping");
        assert_eq!(interaction.command_path(), Some((None, "ping".to_string())));
    }

    #[test]
    fn test_command_path_for_subcommand_and_group() {
        let sub = Interaction::command(User::new("1"), "config").with_option(
            CommandOption::subcommand(
                "set",
                vec![CommandOption::new("key", OptionType::String, "prefix")],
            ),
        );
        assert_eq!(
            sub.command_path(),
            Some((Some("config".to_string()), "set".to_string()))
        );
        assert_eq!(sub.options().len(), 1);
        assert_eq!(sub.option("key").and_then(|o| o.value.clone()), Some("prefix".into()));

        let grouped = Interaction::command(User::new("1"), "config").with_option(
            CommandOption::group("user", CommandOption::subcommand("set", vec![])),
        );
        assert_eq!(
            grouped.command_path(),
            Some((Some("config user".to_string()), "set".to_string()))
        );
    }

    #[test]
    fn test_message_has_no_command_path() {
        let message = Interaction::message(User::new("1"), "hello");
        assert!(!message.is_command());
        assert!(message.command_path().is_none());
        assert!(message.options().is_empty());
    }

    #[test]
    fn test_deserialize_gateway_payload() {
        let payload = serde_json::json!({
            "user": { "id": "42", "username": "alice" },
            "guild_id": "7",
            "content": {
                "type": "command",
                "name": "echo",
                "options": [{ "name": "text", "type": "string", "value": "hi" }]
            }
        });

        let interaction: Interaction = serde_json::from_value(payload).unwrap();
        assert!(interaction.is_guild());
        assert!(!interaction.id.is_empty());
        assert_eq!(interaction.option("text").unwrap().kind, OptionType::String);
    }
}
