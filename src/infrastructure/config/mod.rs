//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::application::errors::ConfigError;
use crate::application::messaging::DispatchConfig;
use crate::application::registry::HandlerOptions;
use crate::domain::entities::{IgnoreRule, ModuleKind};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BotConfig {
    pub name: String,
    /// User id the application posts as
    pub client_id: Option<String>,
    #[serde(default)]
    pub owners: Vec<String>,
    /// Guild that receives the command schema while testing
    pub testing_guild: Option<String>,
    /// Prefix the console adapter recognises commands by
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    "/".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "carik-dispatch".to_string(),
            client_id: None,
            owners: Vec::new(),
            testing_guild: None,
            prefix: default_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HandlersConfig {
    pub commands: HandlerConfig,
    pub inhibitors: HandlerConfig,
    pub listeners: HandlerConfig,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            commands: HandlerConfig::at("./modules/commands"),
            inhibitors: HandlerConfig::at("./modules/inhibitors"),
            listeners: HandlerConfig::at("./modules/listeners"),
        }
    }
}

/// Where one registry loads its modules from
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct HandlerConfig {
    pub directory: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_true")]
    pub automate_categories: bool,
}

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

fn default_true() -> bool {
    true
}

impl HandlerConfig {
    fn at(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extensions: default_extensions(),
            automate_categories: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DispatchSettings {
    #[serde(default = "default_true")]
    pub block_client: bool,
    #[serde(default = "default_true")]
    pub block_bots: bool,
    /// Milliseconds; 0 disables the default cooldown
    #[serde(default)]
    pub default_cooldown: u64,
    /// User ids that skip cooldowns. Owners when unset.
    pub ignore_cooldown: Option<Vec<String>>,
    /// User ids that skip user permission checks
    #[serde(default)]
    pub ignore_permissions: Vec<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            block_client: true,
            block_bots: true,
            default_cooldown: 0,
            ignore_cooldown: None,
            ignore_permissions: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `BOT_*` environment variables
    pub fn load_env() -> Self {
        let mut config = Config::default();

        if let Ok(name) = std::env::var("BOT_NAME") {
            config.bot.name = name;
        }
        if let Ok(id) = std::env::var("BOT_CLIENT_ID") {
            config.bot.client_id = Some(id);
        }
        if let Ok(owners) = std::env::var("BOT_OWNERS") {
            config.bot.owners = owners
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(guild) = std::env::var("BOT_TESTING_GUILD") {
            config.bot.testing_guild = Some(guild);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        for (kind, handler) in self.handler_configs() {
            if handler.extensions.is_empty() {
                return Err(ConfigError::InvalidValue(format!("{} handler has no extensions", kind)));
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn handler_configs(&self) -> [(ModuleKind, &HandlerConfig); 3] {
        [
            (ModuleKind::Command, &self.handlers.commands),
            (ModuleKind::Inhibitor, &self.handlers.inhibitors),
            (ModuleKind::Listener, &self.handlers.listeners),
        ]
    }

    pub fn handler_options(&self, kind: ModuleKind) -> HandlerOptions {
        let handler = match kind {
            ModuleKind::Command => &self.handlers.commands,
            ModuleKind::Inhibitor => &self.handlers.inhibitors,
            ModuleKind::Listener => &self.handlers.listeners,
        };
        HandlerOptions::new(kind)
            .with_directory(&handler.directory)
            .with_extensions(&handler.extensions)
            .with_automate_categories(handler.automate_categories)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            client_id: self.bot.client_id.clone(),
            owners: self.bot.owners.clone(),
            block_client: self.dispatch.block_client,
            block_bots: self.dispatch.block_bots,
            default_cooldown: self.dispatch.default_cooldown,
            ignore_cooldown: self.dispatch.ignore_cooldown.clone().map(IgnoreRule::Users),
            ignore_permissions: Some(IgnoreRule::Users(self.dispatch.ignore_permissions.clone())),
            testing_guild: self.bot.testing_guild.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::parse(
            r#"
bot:
  name: test-bot
  owners: ["1"]
dispatch:
  default-cooldown: 500
"#,
        )
        .unwrap();

        assert_eq!(config.bot.prefix, "/");
        assert!(config.dispatch.block_bots);
        assert_eq!(config.handlers.listeners.directory, PathBuf::from("./modules/listeners"));

        let dispatch = config.dispatch_config();
        assert!(dispatch.is_owner("1"));
        assert_eq!(dispatch.default_cooldown, 500);
        assert!(dispatch.ignore_cooldown.is_none());
    }

    #[test]
    fn test_handler_options() {
        let mut config = Config::default();
        config.handlers.commands.extensions = vec![".yml".to_string()];

        let options = config.handler_options(ModuleKind::Command);
        assert_eq!(options.class_to_handle, ModuleKind::Command);
        assert!(options.extensions.contains("yml"));
        assert!(options.automate_categories);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Config::parse("bot:\n  name: ''\n"),
            Err(ConfigError::MissingField(_))
        ));
        assert!(matches!(Config::parse("bot: [1, 2"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_round_trips() {
        let yaml = Config::default().to_yaml().unwrap();
        assert_eq!(Config::parse(&yaml).unwrap().bot.name, "carik-dispatch");
    }
}
