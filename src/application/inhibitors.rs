//! Inhibitor chain runner

use futures::future::join_all;
use std::cmp::Reverse;
use std::ops::Deref;
use std::sync::Arc;

use crate::application::errors::{CommandError, HandlerError, HandlerResult};
use crate::application::registry::{HandlerOptions, ModuleHandler, NoHooks};
use crate::domain::entities::{Command, Inhibitor, InhibitorPhase, Interaction, ModuleKind};
use crate::domain::traits::{FileSystem, ModuleSource};
use crate::infrastructure::loader::LocalFs;

/// Registry of inhibitors that also evaluates them per phase
pub struct InhibitorHandler {
    registry: ModuleHandler<dyn Inhibitor>,
}

impl InhibitorHandler {
    pub fn new(options: HandlerOptions, source: Arc<dyn ModuleSource<dyn Inhibitor>>) -> HandlerResult<Self> {
        Self::with_file_system(options, source, Arc::new(LocalFs))
    }

    pub fn with_file_system(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<dyn Inhibitor>>,
        fs: Arc<dyn FileSystem>,
    ) -> HandlerResult<Self> {
        if options.class_to_handle != ModuleKind::Inhibitor {
            return Err(HandlerError::InvalidClassToHandle {
                given: options.class_to_handle,
                expected: ModuleKind::Inhibitor,
            });
        }
        Ok(Self {
            registry: ModuleHandler::with_parts(options, source, fs, Arc::new(NoHooks)),
        })
    }

    pub fn registry(&self) -> &ModuleHandler<dyn Inhibitor> {
        &self.registry
    }

    /// Runs every inhibitor of `phase` concurrently and returns the reason of
    /// the highest-priority one that fired.
    ///
    /// Equal priorities resolve to the first registered. Errors from an
    /// inhibitor are returned as-is.
    pub async fn test(
        &self,
        phase: InhibitorPhase,
        interaction: &Interaction,
        command: Option<&dyn Command>,
    ) -> Result<Option<String>, CommandError> {
        let candidates: Vec<Arc<dyn Inhibitor>> = self
            .registry
            .modules()
            .iter()
            .map(|entry| Arc::clone(entry.module()))
            .filter(|inhibitor| inhibitor.options().phase == phase)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let results = join_all(candidates.iter().map(|i| i.exec(interaction, command))).await;

        let mut fired = Vec::new();
        for (inhibitor, result) in candidates.iter().zip(results) {
            if result? {
                fired.push(inhibitor);
            }
        }
        // sort_by_key is stable, so registration order breaks ties
        fired.sort_by_key(|i| Reverse(i.options().priority));
        Ok(fired.first().map(|i| i.options().reason.clone()))
    }
}

impl Deref for InhibitorHandler {
    type Target = ModuleHandler<dyn Inhibitor>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}
