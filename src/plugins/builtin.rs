//! Built-in commands, inhibitors and listeners

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::application::errors::{CommandError, LoadError};
use crate::domain::entities::{
    ArgValue, ArgumentSpec, ArgumentType, Command, CommandArgs, CommandOptions, Inhibitor, InhibitorOptions,
    InhibitorPhase, Interaction, Listener, ListenerOptions,
};
use crate::infrastructure::loader::{ManifestSource, ModuleManifest};

/// Replies with `pong`
pub struct PingCommand {
    options: CommandOptions,
}

impl PingCommand {
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self, LoadError> {
        Ok(Self {
            options: manifest.command_options()?,
        })
    }
}

#[async_trait]
impl Command for PingCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn exec(&self, _interaction: &Interaction, _args: &CommandArgs) -> Result<Value, CommandError> {
        Ok(json!("pong"))
    }
}

/// Repeats its `text` argument
pub struct EchoCommand {
    options: CommandOptions,
}

impl EchoCommand {
    pub const ARG: &'static str = "text";

    /// Declares the `text` argument when the manifest does not
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self, LoadError> {
        let mut options = manifest.command_options()?;
        if !options.args.iter().any(|a| a.id == Self::ARG) {
            options = options.with_arg(
                ArgumentSpec::new(Self::ARG, ArgumentType::String)
                    .with_description("Text to repeat")
                    .required(),
            );
        }
        Ok(Self { options })
    }
}

#[async_trait]
impl Command for EchoCommand {
    fn options(&self) -> &CommandOptions {
        &self.options
    }

    async fn exec(&self, _interaction: &Interaction, args: &CommandArgs) -> Result<Value, CommandError> {
        match args.get(Self::ARG) {
            ArgValue::String(text) => Ok(json!(text)),
            _ => Err(CommandError::InvalidArgs(format!("'{}' is required", Self::ARG))),
        }
    }
}

/// Blocks users listed under `settings.users`. Runs in the global phase
/// unless the manifest names another.
pub struct BlacklistInhibitor {
    options: InhibitorOptions,
    users: HashSet<String>,
}

impl BlacklistInhibitor {
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self, LoadError> {
        let mut options = manifest.inhibitor_options();
        if manifest.phase.is_none() {
            options.phase = InhibitorPhase::All;
        }
        let users = match manifest.settings.get("users") {
            None | Some(Value::Null) => HashSet::new(),
            Some(users) => serde_json::from_value(users.clone())
                .map_err(|e| LoadError::Parse(format!("{}: settings.users: {}", manifest.id, e)))?,
        };
        Ok(Self { options, users })
    }
}

#[async_trait]
impl Inhibitor for BlacklistInhibitor {
    fn options(&self) -> &InhibitorOptions {
        &self.options
    }

    async fn exec(&self, interaction: &Interaction, _command: Option<&dyn Command>) -> Result<bool, CommandError> {
        Ok(self.users.contains(&interaction.user.id))
    }
}

/// Logs once the client reports it is ready
pub struct ReadyListener {
    options: ListenerOptions,
}

impl ReadyListener {
    pub fn from_manifest(manifest: &ModuleManifest) -> Result<Self, LoadError> {
        Ok(Self {
            options: manifest.listener_options()?,
        })
    }
}

#[async_trait]
impl Listener for ReadyListener {
    fn options(&self) -> &ListenerOptions {
        &self.options
    }

    async fn exec(&self, args: &[Value]) -> Result<(), CommandError> {
        let name = args.first().and_then(Value::as_str).unwrap_or("client");
        info!("{} is ready", name);
        Ok(())
    }
}

pub fn command_source() -> ManifestSource<dyn Command> {
    ManifestSource::new()
        .with_factory("ping", |m: &ModuleManifest| {
            Ok(Arc::new(PingCommand::from_manifest(m)?) as Arc<dyn Command>)
        })
        .with_factory("echo", |m: &ModuleManifest| {
            Ok(Arc::new(EchoCommand::from_manifest(m)?) as Arc<dyn Command>)
        })
}

pub fn inhibitor_source() -> ManifestSource<dyn Inhibitor> {
    ManifestSource::new().with_factory("blacklist", |m: &ModuleManifest| {
        Ok(Arc::new(BlacklistInhibitor::from_manifest(m)?) as Arc<dyn Inhibitor>)
    })
}

pub fn listener_source() -> ManifestSource<dyn Listener> {
    ManifestSource::new().with_factory("ready", |m: &ModuleManifest| {
        Ok(Arc::new(ReadyListener::from_manifest(m)?) as Arc<dyn Listener>)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{CommandOption, OptionType, User};
    use crate::application::messaging::extract_arguments;

    #[tokio::test]
    async fn test_echo_declares_and_reads_text() {
        let manifest = ModuleManifest::parse("kind: command\nid: echo\nname: echo\n").unwrap();
        let echo = EchoCommand::from_manifest(&manifest).unwrap();
        assert_eq!(echo.options().args.len(), 1);

        let interaction = Interaction::command(User::new("1"), "echo")
            .with_option(CommandOption::new("text", OptionType::String, "hi"));
        let args = extract_arguments(&echo.options().args, &interaction);
        assert_eq!(echo.exec(&interaction, &args).await.unwrap(), json!("hi"));

        let empty = extract_arguments(&echo.options().args, &Interaction::command(User::new("1"), "echo"));
        assert!(matches!(
            echo.exec(&interaction, &empty).await,
            Err(CommandError::InvalidArgs(_))
        ));
    }

    #[tokio::test]
    async fn test_blacklist_defaults_to_global_phase() {
        let manifest = ModuleManifest::parse(
            "kind: inhibitor\nid: blacklist\nreason: blacklisted\nsettings:\n  users: [\"13\"]\n",
        )
        .unwrap();
        let blacklist = BlacklistInhibitor::from_manifest(&manifest).unwrap();

        assert_eq!(blacklist.options().phase, InhibitorPhase::All);
        let banned = Interaction::message(User::new("13"), "hi");
        let welcome = Interaction::message(User::new("14"), "hi");
        assert!(blacklist.exec(&banned, None).await.unwrap());
        assert!(!blacklist.exec(&welcome, None).await.unwrap());
    }

    #[test]
    fn test_bad_settings_fail_to_load() {
        let manifest = ModuleManifest::parse("kind: inhibitor\nid: blacklist\nsettings:\n  users: 5\n").unwrap();
        assert!(matches!(
            BlacklistInhibitor::from_manifest(&manifest),
            Err(LoadError::Parse(_))
        ));
    }
}
