//! Typed publish/subscribe bus owned by each handler
//!
//! Subscribers are called synchronously, in subscription order, on the task
//! that emits. They must not block.

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::application::errors::CommandError;
use crate::domain::entities::{Command, CommandArgs, Interaction, ModuleInfo};

/// Which side of a permission check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionSide {
    Client,
    User,
}

impl fmt::Display for PermissionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionSide::Client => f.write_str("client"),
            PermissionSide::User => f.write_str("user"),
        }
    }
}

/// Reasons reported by the built-in checks
pub mod reasons {
    pub const CLIENT: &str = "client";
    pub const BOT: &str = "bot";
    pub const OWNER: &str = "owner";
    pub const GUILD: &str = "guild";
    pub const DM: &str = "dm";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Load,
    Remove,
    MessageBlocked,
    MessageInvalid,
    CommandBlocked,
    MissingPermissions,
    Cooldown,
    CommandStarted,
    CommandFinished,
    Error,
}

#[derive(Clone)]
pub enum HandlerEvent {
    Load {
        module: ModuleInfo,
        is_reload: bool,
    },
    Remove {
        module: ModuleInfo,
    },
    MessageBlocked {
        interaction: Arc<Interaction>,
        reason: String,
    },
    MessageInvalid {
        interaction: Arc<Interaction>,
    },
    CommandBlocked {
        interaction: Arc<Interaction>,
        command: Arc<dyn Command>,
        reason: String,
    },
    MissingPermissions {
        interaction: Arc<Interaction>,
        command: Arc<dyn Command>,
        side: PermissionSide,
        missing: Vec<String>,
    },
    Cooldown {
        interaction: Arc<Interaction>,
        command: Arc<dyn Command>,
        remaining_ms: i64,
    },
    CommandStarted {
        interaction: Arc<Interaction>,
        command: Arc<dyn Command>,
        args: Arc<CommandArgs>,
    },
    CommandFinished {
        interaction: Arc<Interaction>,
        command: Arc<dyn Command>,
        args: Arc<CommandArgs>,
        result: Value,
    },
    Error {
        error: Arc<CommandError>,
        interaction: Arc<Interaction>,
        command: Option<Arc<dyn Command>>,
    },
}

impl HandlerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            HandlerEvent::Load { .. } => EventKind::Load,
            HandlerEvent::Remove { .. } => EventKind::Remove,
            HandlerEvent::MessageBlocked { .. } => EventKind::MessageBlocked,
            HandlerEvent::MessageInvalid { .. } => EventKind::MessageInvalid,
            HandlerEvent::CommandBlocked { .. } => EventKind::CommandBlocked,
            HandlerEvent::MissingPermissions { .. } => EventKind::MissingPermissions,
            HandlerEvent::Cooldown { .. } => EventKind::Cooldown,
            HandlerEvent::CommandStarted { .. } => EventKind::CommandStarted,
            HandlerEvent::CommandFinished { .. } => EventKind::CommandFinished,
            HandlerEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Id of the command the event concerns, if any
    pub fn command_id(&self) -> Option<&str> {
        match self {
            HandlerEvent::CommandBlocked { command, .. }
            | HandlerEvent::MissingPermissions { command, .. }
            | HandlerEvent::Cooldown { command, .. }
            | HandlerEvent::CommandStarted { command, .. }
            | HandlerEvent::CommandFinished { command, .. } => Some(&command.options().id),
            HandlerEvent::Error { command, .. } => command.as_ref().map(|c| c.options().id.as_str()),
            _ => None,
        }
    }

    /// Block reason of `MessageBlocked`/`CommandBlocked`
    pub fn reason(&self) -> Option<&str> {
        match self {
            HandlerEvent::MessageBlocked { reason, .. } | HandlerEvent::CommandBlocked { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}

impl fmt::Debug for HandlerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("HandlerEvent");
        s.field("kind", &self.kind());
        if let Some(id) = self.command_id() {
            s.field("command", &id);
        }
        if let Some(reason) = self.reason() {
            s.field("reason", &reason);
        }
        s.finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&HandlerEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    callback: Subscriber,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

/// Cheaply cloneable handle to a handler's event stream
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&HandlerEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(callback))
    }

    /// Subscribe to every event
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&HandlerEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(callback))
    }

    fn insert(&self, kind: Option<EventKind>, callback: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, callback });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Whether anything would observe an event of `kind`
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| s.kind.map_or(true, |k| k == kind))
    }

    pub fn emit(&self, event: HandlerEvent) {
        let kind = event.kind();
        // Subscribers may subscribe or unsubscribe from inside a callback.
        let targets: Vec<Subscriber> = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in targets {
            callback(&event);
        }
    }
}
