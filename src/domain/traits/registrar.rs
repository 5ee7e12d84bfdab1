use async_trait::async_trait;

use crate::application::errors::CommandError;
use crate::domain::entities::{SchemaNode, SyncTarget};

/// Remote slash-command registrar - abstraction for the platform's command API
#[async_trait]
pub trait SchemaRegistrar: Send + Sync {
    /// Replace the registered command set for `target` with `schema`
    async fn push(&self, target: SyncTarget, schema: Vec<SchemaNode>) -> Result<(), CommandError>;
}
