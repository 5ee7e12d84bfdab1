use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::{Module, ModuleKind, DEFAULT_CATEGORY};
use crate::application::errors::{CommandError, HandlerError};
use crate::domain::traits::EventSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    #[default]
    On,
    Once,
}

/// Event source a listener binds to
#[derive(Clone)]
pub enum SourceRef {
    /// Looked up in the listener handler's source table
    Key(String),
    /// Used directly
    Live(Arc<dyn EventSource>),
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Key(key) => f.debug_tuple("Key").field(key).finish(),
            SourceRef::Live(_) => f.write_str("Live(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListenerOptions {
    pub id: String,
    pub category: String,
    pub emitter: SourceRef,
    pub event: String,
    pub mode: ListenerMode,
}

impl ListenerOptions {
    pub fn new(id: impl Into<String>, emitter: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: DEFAULT_CATEGORY.to_string(),
            emitter: SourceRef::Key(emitter.into()),
            event: event.into(),
            mode: ListenerMode::On,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.emitter = SourceRef::Live(source);
        self
    }

    pub fn once(mut self) -> Self {
        self.mode = ListenerMode::Once;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Fails when the listener names no event.
    pub fn validate(self) -> Result<Self, HandlerError> {
        if self.event.trim().is_empty() {
            return Err(HandlerError::MissingName {
                kind: ModuleKind::Listener,
                id: self.id,
                field: "event",
            });
        }
        Ok(self)
    }
}

/// A module bound to a named event on an event source
#[async_trait]
pub trait Listener: Send + Sync {
    fn options(&self) -> &ListenerOptions;

    async fn exec(&self, _args: &[Value]) -> Result<(), CommandError> {
        Err(CommandError::not_implemented(&self.options().id, "exec"))
    }
}

impl Module for dyn Listener {
    fn id(&self) -> &str {
        &self.options().id
    }

    fn category_id(&self) -> &str {
        &self.options().category
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Listener
    }
}
