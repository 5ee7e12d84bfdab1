//! Command dispatcher - routes interactions through the inhibitor phases,
//! permission and cooldown checks, and finally into the command body

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{debug, error, warn};

use super::arguments::extract_arguments;
use super::cooldown::{CooldownCheck, CooldownManager};
use super::permissions::missing_permissions;
use crate::application::errors::{CommandError, HandlerError, HandlerResult};
use crate::application::events::{reasons, EventKind, HandlerEvent, PermissionSide};
use crate::application::inhibitors::InhibitorHandler;
use crate::application::registry::{HandlerOptions, ModuleHandler, RegistryHooks};
use crate::domain::entities::{
    ChannelKind, Command, CommandSchema, IgnoreRule, InhibitorPhase, Interaction, ModuleKind, SchemaNode,
    SyncTarget,
};
use crate::domain::traits::{EventSource, FileSystem, ListenerFn, ModuleSource, SchemaRegistrar};
use crate::infrastructure::loader::LocalFs;

/// Client event carrying command invocations
pub const INTERACTION_CREATE: &str = "interactionCreate";
/// Client event carrying plain messages
pub const MESSAGE_CREATE: &str = "messageCreate";
const BINDING_KEY: &str = "commandHandler";

/// Dispatch settings fixed at construction
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// User id of the application itself
    pub client_id: Option<String>,
    pub owners: Vec<String>,
    pub block_client: bool,
    pub block_bots: bool,
    /// Cooldown in milliseconds for commands that set none; 0 disables
    pub default_cooldown: u64,
    /// Cooldown bypass for commands without their own rule. Owners when unset.
    pub ignore_cooldown: Option<IgnoreRule>,
    /// User-permission bypass for commands without their own rule
    pub ignore_permissions: Option<IgnoreRule>,
    /// Guild that receives the command schema instead of the global scope
    pub testing_guild: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            owners: Vec::new(),
            block_client: true,
            block_bots: true,
            default_cooldown: 0,
            ignore_cooldown: None,
            ignore_permissions: None,
            testing_guild: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn with_owner(mut self, id: impl Into<String>) -> Self {
        self.owners.push(id.into());
        self
    }

    pub fn with_default_cooldown(mut self, millis: u64) -> Self {
        self.default_cooldown = millis;
        self
    }

    pub fn with_testing_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.testing_guild = Some(guild_id.into());
        self
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owners.iter().any(|o| o == user_id)
    }
}

/// How an interaction left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The command body ran
    Completed,
    /// An inhibitor, permission or cooldown check stopped it
    Blocked,
    /// No command matched
    Invalid,
    /// A plain message passed the global checks; there is nothing to run
    Ignored,
    /// An error was delivered to `Error` subscribers
    Failed,
}

/// Resolution key: parent path and name, both lowercased
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub parent: Option<String>,
    pub name: String,
}

impl CommandKey {
    pub fn new(parent: Option<&str>, name: &str) -> Self {
        Self {
            parent: parent.map(|p| p.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()),
            name: name.trim().to_lowercase(),
        }
    }

    fn of(command: &dyn Command) -> Self {
        let options = command.options();
        Self::new(options.parent.as_deref(), &options.name)
    }
}

/// Scoped name index kept in step with the command registry
#[derive(Default)]
struct CommandNames {
    keys: RwLock<HashMap<CommandKey, String>>,
}

impl CommandNames {
    fn lookup(&self, key: &CommandKey) -> Option<String> {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }
}

impl RegistryHooks<dyn Command> for CommandNames {
    fn conflicts(&self, command: &dyn Command) -> bool {
        self.lookup(&CommandKey::of(command)).is_some()
    }

    fn duplicate(&self, command: &dyn Command) -> HandlerError {
        let id = command.options().id.clone();
        HandlerError::AliasConflict {
            alias: id.clone(),
            id: id.clone(),
            conflict: id,
        }
    }

    fn on_register(&self, command: &Arc<dyn Command>) -> HandlerResult<()> {
        let options = command.options();
        if options.name.trim().is_empty() {
            return Err(HandlerError::MissingName {
                kind: ModuleKind::Command,
                id: options.id.clone(),
                field: "name",
            });
        }
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let key = CommandKey::of(command.as_ref());
        if let Some(existing) = keys.get(&key) {
            return Err(HandlerError::AliasConflict {
                alias: options.name.clone(),
                id: options.id.clone(),
                conflict: existing.clone(),
            });
        }
        keys.insert(key, options.id.clone());
        Ok(())
    }

    fn on_deregister(&self, command: &Arc<dyn Command>) -> HandlerResult<()> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let key = CommandKey::of(command.as_ref());
        if keys.get(&key).is_some_and(|id| *id == command.options().id) {
            keys.remove(&key);
        }
        Ok(())
    }
}

/// A dispatch error and the command it happened in
struct Failure {
    error: CommandError,
    command: Option<Arc<dyn Command>>,
}

impl Failure {
    fn bare(error: CommandError) -> Self {
        Self { error, command: None }
    }

    fn with(command: &Arc<dyn Command>) -> impl FnOnce(CommandError) -> Self + '_ {
        move |error| Self {
            error,
            command: Some(Arc::clone(command)),
        }
    }
}

/// Command registry and dispatcher
pub struct CommandHandler {
    registry: ModuleHandler<dyn Command>,
    names: Arc<CommandNames>,
    config: DispatchConfig,
    inhibitors: RwLock<Option<Arc<InhibitorHandler>>>,
    cooldowns: CooldownManager,
}

impl CommandHandler {
    pub fn new(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<dyn Command>>,
        config: DispatchConfig,
    ) -> HandlerResult<Self> {
        Self::with_file_system(options, source, Arc::new(LocalFs), config)
    }

    pub fn with_file_system(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<dyn Command>>,
        fs: Arc<dyn FileSystem>,
        config: DispatchConfig,
    ) -> HandlerResult<Self> {
        if options.class_to_handle != ModuleKind::Command {
            return Err(HandlerError::InvalidClassToHandle {
                given: options.class_to_handle,
                expected: ModuleKind::Command,
            });
        }
        let names = Arc::new(CommandNames::default());
        let hooks: Arc<dyn RegistryHooks<dyn Command>> = names.clone();
        Ok(Self {
            registry: ModuleHandler::with_parts(options, source, fs, hooks),
            names,
            config,
            inhibitors: RwLock::new(None),
            cooldowns: CooldownManager::new(),
        })
    }

    pub fn registry(&self) -> &ModuleHandler<dyn Command> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn cooldowns(&self) -> &CooldownManager {
        &self.cooldowns
    }

    /// Attaches the inhibitor chain used by every phase
    pub fn use_inhibitor_handler(&self, inhibitors: Arc<InhibitorHandler>) {
        *self.inhibitors.write().unwrap_or_else(PoisonError::into_inner) = Some(inhibitors);
    }

    pub fn inhibitor_handler(&self) -> Option<Arc<InhibitorHandler>> {
        self.inhibitors.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Case-insensitive lookup of a top-level command by name
    pub fn find_command(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.resolve_key(&CommandKey::new(None, name))
    }

    /// Lookup of a subcommand under `parent` (`"config"` or `"config user"`)
    pub fn find_subcommand(&self, parent: &str, name: &str) -> Option<Arc<dyn Command>> {
        self.resolve_key(&CommandKey::new(Some(parent), name))
    }

    fn resolve_key(&self, key: &CommandKey) -> Option<Arc<dyn Command>> {
        let id = self.names.lookup(key)?;
        self.registry.get(&id).map(|entry| Arc::clone(entry.module()))
    }

    /// The command an interaction invokes, if it is a command invocation
    pub fn parse_command(&self, interaction: &Interaction) -> Option<Arc<dyn Command>> {
        let (parent, name) = interaction.command_path()?;
        self.resolve_key(&CommandKey::new(parent.as_deref(), &name))
    }

    /// Runs an interaction through the whole pipeline.
    ///
    /// Errors go to `Error` subscribers and yield [`Outcome::Failed`]. With
    /// no subscriber they are returned.
    pub async fn handle(&self, interaction: impl Into<Arc<Interaction>>) -> Result<Outcome, CommandError> {
        let interaction = interaction.into();
        let result = self.dispatch(&interaction).await;
        self.settle(result, interaction)
    }

    /// Runs a known command, skipping the post-phase checks when `ignore`
    /// is set.
    pub async fn handle_direct_command(
        &self,
        interaction: impl Into<Arc<Interaction>>,
        command: Arc<dyn Command>,
        ignore: bool,
    ) -> Result<Outcome, CommandError> {
        let interaction = interaction.into();
        let result = self.run_command(&interaction, command, ignore).await;
        self.settle(result, interaction)
    }

    /// Runs the global phase for a plain message
    pub async fn handle_message(&self, interaction: impl Into<Arc<Interaction>>) -> Result<Outcome, CommandError> {
        let interaction = interaction.into();
        let result = match self.run_all_inhibitors(&interaction).await {
            Ok(true) => Ok(Outcome::Blocked),
            Ok(false) => Ok(Outcome::Ignored),
            Err(e) => Err(Failure::bare(e)),
        };
        self.settle(result, interaction)
    }

    async fn dispatch(&self, interaction: &Arc<Interaction>) -> Result<Outcome, Failure> {
        if self.run_all_inhibitors(interaction).await.map_err(Failure::bare)? {
            return Ok(Outcome::Blocked);
        }
        if !interaction.is_command() {
            return Ok(Outcome::Ignored);
        }
        if self.run_pre_inhibitors(interaction).await.map_err(Failure::bare)? {
            return Ok(Outcome::Blocked);
        }

        let Some(command) = self.parse_command(interaction) else {
            debug!("No command matches interaction {}", interaction.id);
            self.emit(HandlerEvent::MessageInvalid {
                interaction: Arc::clone(interaction),
            });
            return Ok(Outcome::Invalid);
        };
        self.run_command(interaction, command, false).await
    }

    async fn run_command(
        &self,
        interaction: &Arc<Interaction>,
        command: Arc<dyn Command>,
        ignore: bool,
    ) -> Result<Outcome, Failure> {
        if !ignore && self.run_post_checks(interaction, &command).await.map_err(Failure::with(&command))? {
            return Ok(Outcome::Blocked);
        }

        let args = Arc::new(extract_arguments(&command.options().args, interaction));
        self.emit(HandlerEvent::CommandStarted {
            interaction: Arc::clone(interaction),
            command: Arc::clone(&command),
            args: Arc::clone(&args),
        });

        let result = command
            .exec(interaction, &args)
            .await
            .map_err(Failure::with(&command))?;

        self.emit(HandlerEvent::CommandFinished {
            interaction: Arc::clone(interaction),
            command,
            args,
            result,
        });
        Ok(Outcome::Completed)
    }

    fn settle(&self, result: Result<Outcome, Failure>, interaction: Arc<Interaction>) -> Result<Outcome, CommandError> {
        let failure = match result {
            Ok(outcome) => return Ok(outcome),
            Err(failure) => failure,
        };
        if !self.registry.events().has_subscribers(EventKind::Error) {
            return Err(failure.error);
        }
        self.emit(HandlerEvent::Error {
            error: Arc::new(failure.error),
            interaction,
            command: failure.command,
        });
        Ok(Outcome::Failed)
    }

    fn emit(&self, event: HandlerEvent) {
        self.registry.events().emit(event);
    }

    async fn test_inhibitors(
        &self,
        phase: InhibitorPhase,
        interaction: &Interaction,
        command: Option<&dyn Command>,
    ) -> Result<Option<String>, CommandError> {
        match self.inhibitor_handler() {
            Some(inhibitors) => inhibitors.test(phase, interaction, command).await,
            None => Ok(None),
        }
    }

    /// Global phase. Custom inhibitors win over the client and bot checks.
    pub async fn run_all_inhibitors(&self, interaction: &Arc<Interaction>) -> Result<bool, CommandError> {
        let author = &interaction.user;
        let reason = match self.test_inhibitors(InhibitorPhase::All, interaction, None).await? {
            Some(reason) => Some(reason),
            None if self.config.block_client && self.config.client_id.as_deref() == Some(author.id.as_str()) => {
                Some(reasons::CLIENT.to_string())
            }
            None if self.config.block_bots && author.bot => Some(reasons::BOT.to_string()),
            None => None,
        };
        Ok(self.block_message(interaction, reason))
    }

    /// Pre-resolution phase, custom inhibitors only
    pub async fn run_pre_inhibitors(&self, interaction: &Arc<Interaction>) -> Result<bool, CommandError> {
        let reason = self.test_inhibitors(InhibitorPhase::Pre, interaction, None).await?;
        Ok(self.block_message(interaction, reason))
    }

    fn block_message(&self, interaction: &Arc<Interaction>, reason: Option<String>) -> bool {
        let Some(reason) = reason else {
            return false;
        };
        debug!("Interaction {} blocked: {}", interaction.id, reason);
        self.emit(HandlerEvent::MessageBlocked {
            interaction: Arc::clone(interaction),
            reason,
        });
        true
    }

    fn block_command(&self, interaction: &Arc<Interaction>, command: &Arc<dyn Command>, reason: &str) -> bool {
        debug!("Command '{}' blocked: {}", command.options().id, reason);
        self.emit(HandlerEvent::CommandBlocked {
            interaction: Arc::clone(interaction),
            command: Arc::clone(command),
            reason: reason.to_string(),
        });
        true
    }

    /// Post phase: owner, channel, permissions, inhibitors, then cooldown.
    /// Stops at the first check that blocks.
    pub async fn run_post_checks(
        &self,
        interaction: &Arc<Interaction>,
        command: &Arc<dyn Command>,
    ) -> Result<bool, CommandError> {
        let options = command.options();
        if options.owner_only && !self.config.is_owner(&interaction.user.id) {
            return Ok(self.block_command(interaction, command, reasons::OWNER));
        }
        match options.channel {
            Some(ChannelKind::Guild) if !interaction.is_guild() => {
                return Ok(self.block_command(interaction, command, reasons::GUILD));
            }
            Some(ChannelKind::Dm) if interaction.is_guild() => {
                return Ok(self.block_command(interaction, command, reasons::DM));
            }
            _ => {}
        }
        if self.run_permission_checks(interaction, command).await? {
            return Ok(true);
        }
        if let Some(reason) = self
            .test_inhibitors(InhibitorPhase::Post, interaction, Some(command.as_ref()))
            .await?
        {
            return Ok(self.block_command(interaction, command, &reason));
        }
        Ok(self.run_cooldowns(interaction, command))
    }

    /// Client-side requirements first, then user-side. Only the user side
    /// honours bypass rules.
    pub async fn run_permission_checks(
        &self,
        interaction: &Arc<Interaction>,
        command: &Arc<dyn Command>,
    ) -> Result<bool, CommandError> {
        let options = command.options();
        if let Some(check) = &options.client_permissions {
            if let Some(missing) = missing_permissions(check, interaction.app_permissions.as_deref(), interaction).await? {
                return Ok(self.missing(interaction, command, PermissionSide::Client, missing));
            }
        }

        if let Some(check) = &options.user_permissions {
            let bypass = match options.ignore_permissions.as_ref().or(self.config.ignore_permissions.as_ref()) {
                Some(rule) => rule.matches(interaction, options),
                None => false,
            };
            if !bypass {
                if let Some(missing) =
                    missing_permissions(check, interaction.member_permissions.as_deref(), interaction).await?
                {
                    return Ok(self.missing(interaction, command, PermissionSide::User, missing));
                }
            }
        }
        Ok(false)
    }

    fn missing(
        &self,
        interaction: &Arc<Interaction>,
        command: &Arc<dyn Command>,
        side: PermissionSide,
        missing: Vec<String>,
    ) -> bool {
        debug!("Command '{}' missing {} permissions {:?}", command.options().id, side, missing);
        self.emit(HandlerEvent::MissingPermissions {
            interaction: Arc::clone(interaction),
            command: Arc::clone(command),
            side,
            missing,
        });
        true
    }

    /// Charges the invocation against the user's bucket for `command`
    pub fn run_cooldowns(&self, interaction: &Arc<Interaction>, command: &Arc<dyn Command>) -> bool {
        let options = command.options();
        let user_id = &interaction.user.id;
        let bypass = match options.ignore_cooldown.as_ref().or(self.config.ignore_cooldown.as_ref()) {
            Some(rule) => rule.matches(interaction, options),
            None => self.config.is_owner(user_id),
        };
        if bypass {
            return false;
        }

        let cooldown = options.cooldown.unwrap_or(self.config.default_cooldown);
        if cooldown == 0 {
            return false;
        }

        match self.cooldowns.check(
            user_id,
            &options.id,
            interaction.created_timestamp(),
            cooldown,
            options.ratelimit,
        ) {
            CooldownCheck::Allowed { .. } => false,
            CooldownCheck::Limited { remaining_ms } => {
                debug!("Command '{}' on cooldown for {} ({}ms)", options.id, user_id, remaining_ms);
                self.emit(HandlerEvent::Cooldown {
                    interaction: Arc::clone(interaction),
                    command: Arc::clone(command),
                    remaining_ms,
                });
                true
            }
        }
    }

    /// Flat schema of every registered command, in registration order
    pub fn command_schema(&self) -> Vec<CommandSchema> {
        self.registry
            .modules()
            .iter()
            .map(|entry| CommandSchema::from(entry.options()))
            .collect()
    }

    /// Pushes the grouped schema to the testing guild, or globally when none
    /// is configured. Refused until `load_all` has completed.
    pub async fn sync_commands(&self, registrar: &dyn SchemaRegistrar) -> Result<(), CommandError> {
        if !self.registry.is_loaded() {
            return Err(HandlerError::NotLoaded(ModuleKind::Command).into());
        }
        let target = match &self.config.testing_guild {
            Some(guild) => SyncTarget::Guild(guild.clone()),
            None => SyncTarget::Global,
        };
        let schema = SchemaNode::group(&self.command_schema());
        registrar.push(target, schema).await
    }

    /// Subscribes to the client's message and interaction events
    pub fn bind(self: &Arc<Self>, client: &dyn EventSource) {
        let callback = gateway_callback(Arc::downgrade(self));
        client.on(INTERACTION_CREATE, BINDING_KEY, callback.clone());
        client.on(MESSAGE_CREATE, BINDING_KEY, callback);
    }

    pub fn unbind(&self, client: &dyn EventSource) {
        client.off(INTERACTION_CREATE, BINDING_KEY);
        client.off(MESSAGE_CREATE, BINDING_KEY);
    }
}

fn gateway_callback(handler: Weak<CommandHandler>) -> ListenerFn {
    Arc::new(move |args: Vec<Value>| {
        let handler = handler.clone();
        async move {
            let (Some(handler), Some(payload)) = (handler.upgrade(), args.into_iter().next()) else {
                return;
            };
            let interaction: Interaction = match serde_json::from_value(payload) {
                Ok(interaction) => interaction,
                Err(e) => {
                    warn!("Dropping malformed gateway payload: {}", e);
                    return;
                }
            };
            if let Err(e) = handler.handle(interaction).await {
                error!("Unhandled dispatch error: {}", e);
            }
        }
        .boxed()
    })
}

impl Deref for CommandHandler {
    type Target = ModuleHandler<dyn Command>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}
