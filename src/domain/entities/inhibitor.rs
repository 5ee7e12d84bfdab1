use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Command, Interaction, Module, ModuleKind, DEFAULT_CATEGORY};
use crate::application::errors::CommandError;

/// Stage of the dispatch pipeline an inhibitor runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InhibitorPhase {
    /// Every raw event, before anything else
    All,
    /// Command invocations, before the command is resolved
    Pre,
    /// Resolved commands, after owner/channel/permission checks
    #[default]
    Post,
}

impl fmt::Display for InhibitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InhibitorPhase::All => "all",
            InhibitorPhase::Pre => "pre",
            InhibitorPhase::Post => "post",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InhibitorOptions {
    pub id: String,
    pub category: String,
    pub phase: InhibitorPhase,
    pub priority: i32,
    pub reason: String,
}

impl InhibitorOptions {
    pub fn new(id: impl Into<String>, phase: InhibitorPhase) -> Self {
        Self {
            id: id.into(),
            category: DEFAULT_CATEGORY.to_string(),
            phase,
            priority: 0,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// A prioritized predicate that can block processing
#[async_trait]
pub trait Inhibitor: Send + Sync {
    fn options(&self) -> &InhibitorOptions;

    /// Returns `true` to block. `command` is only set in the post phase.
    async fn exec(&self, _interaction: &Interaction, _command: Option<&dyn Command>) -> Result<bool, CommandError> {
        Err(CommandError::not_implemented(&self.options().id, "exec"))
    }
}

impl Module for dyn Inhibitor {
    fn id(&self) -> &str {
        &self.options().id
    }

    fn category_id(&self) -> &str {
        &self.options().category
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Inhibitor
    }
}
