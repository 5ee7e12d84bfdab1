//! Console adapter for development/testing
//!
//! Reads lines from stdin and emits them on the client source the way a
//! gateway would. `/name key=value ...` becomes a command invocation,
//! anything else a plain message. Subcommands are addressed with dots
//! (`/config.user.set key=prefix`); bare words after the command name are
//! joined into a `text` option.

use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::application::messaging::{INTERACTION_CREATE, MESSAGE_CREATE};
use crate::domain::entities::{CommandOption, Interaction, OptionType, User};
use crate::infrastructure::emitter::Emitter;

pub struct ConsoleAdapter {
    prefix: String,
    user: User,
    guild_id: Option<String>,
    client: Arc<Emitter>,
}

impl ConsoleAdapter {
    pub fn new(client: Arc<Emitter>) -> Self {
        Self {
            prefix: "/".to_string(),
            user: User::new("console").with_username("console"),
            guild_id: None,
            client,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    /// Makes every interaction look like it came from `guild_id`
    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }

    /// `None` for blank lines
    pub fn parse_line(&self, line: &str) -> Option<Interaction> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let interaction = match line.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !rest.trim().is_empty() => self.parse_command(rest),
            _ => Interaction::message(self.user.clone(), line),
        };
        Some(match &self.guild_id {
            Some(guild) => interaction.in_guild(guild),
            None => interaction,
        })
    }

    fn parse_command(&self, text: &str) -> Interaction {
        let mut tokens = text.split_whitespace();
        let path = tokens.next().unwrap_or_default();
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let name = segments.next().unwrap_or(path);
        let nested: Vec<&str> = segments.collect();

        let mut options = Vec::new();
        let mut words = Vec::new();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => options.push(typed_option(key, value)),
                _ => words.push(token),
            }
        }
        if !words.is_empty() {
            options.push(CommandOption::new("text", OptionType::String, words.join(" ")));
        }

        let interaction = Interaction::command(self.user.clone(), name);
        match nested.as_slice() {
            [] => options.into_iter().fold(interaction, Interaction::with_option),
            [sub] => interaction.with_option(CommandOption::subcommand(*sub, options)),
            [group, sub, ..] => {
                interaction.with_option(CommandOption::group(*group, CommandOption::subcommand(*sub, options)))
            }
        }
    }

    /// Emits one line on the client source. Returns how many callbacks ran.
    pub async fn dispatch_line(&self, line: &str) -> usize {
        let Some(interaction) = self.parse_line(line) else {
            return 0;
        };
        let event = if interaction.is_command() {
            INTERACTION_CREATE
        } else {
            MESSAGE_CREATE
        };
        match serde_json::to_value(&interaction) {
            Ok(payload) => self.client.emit(event, vec![payload]).await,
            Err(e) => {
                tracing::warn!("Failed to encode interaction: {}", e);
                0
            }
        }
    }

    /// Reads stdin until EOF or `quit`
    pub async fn run(&self) -> io::Result<()> {
        tracing::info!("Starting console adapter (dev mode), type 'quit' to exit");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if matches!(line.trim(), "quit" | "exit") {
                break;
            }
            self.dispatch_line(&line).await;
        }
        Ok(())
    }
}

fn typed_option(key: &str, raw: &str) -> CommandOption {
    if let Ok(flag) = raw.parse::<bool>() {
        return CommandOption::new(key, OptionType::Boolean, flag);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return CommandOption::new(key, OptionType::Integer, n);
    }
    match raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        Some(n) => CommandOption::new(key, OptionType::Number, Value::Number(n)),
        None => CommandOption::new(key, OptionType::String, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> ConsoleAdapter {
        ConsoleAdapter::new(Arc::new(Emitter::new("client")))
    }

    #[test]
    fn test_plain_text_is_a_message() {
        let interaction = adapter().parse_line("hello there").unwrap();
        assert!(!interaction.is_command());
        assert!(adapter().parse_line("   ").is_none());
        assert!(!adapter().parse_line("/").unwrap().is_command());
    }

    #[test]
    fn test_command_with_typed_options_and_text() {
        let interaction = adapter().parse_line("/roll sides=20 loud=true good luck").unwrap();

        assert_eq!(interaction.command_path(), Some((None, "roll".to_string())));
        assert_eq!(interaction.option("sides").unwrap().kind, OptionType::Integer);
        assert_eq!(interaction.option("loud").unwrap().kind, OptionType::Boolean);
        assert_eq!(
            interaction.option("text").and_then(|o| o.value.clone()),
            Some(Value::from("good luck"))
        );
    }

    #[test]
    fn test_dotted_path_addresses_subcommands() {
        let adapter = adapter().in_guild("g");
        let sub = adapter.parse_line("/config.set key=prefix").unwrap();
        assert_eq!(sub.command_path(), Some((Some("config".to_string()), "set".to_string())));
        assert_eq!(sub.option("key").unwrap().kind, OptionType::String);
        assert!(sub.is_guild());

        let grouped = adapter.parse_line("/config.user.set").unwrap();
        assert_eq!(
            grouped.command_path(),
            Some((Some("config user".to_string()), "set".to_string()))
        );
    }
}
