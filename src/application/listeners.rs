//! Listener registry
//!
//! Registering a listener binds it on its event source under the listener
//! id; deregistering unbinds it. The client source is always present under
//! [`CLIENT_SOURCE`].

use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;

use crate::application::errors::{HandlerError, HandlerResult};
use crate::application::registry::{HandlerOptions, ModuleHandler, RegistryHooks};
use crate::domain::entities::{Listener, ListenerMode, ModuleKind, SourceRef};
use crate::domain::traits::{EventSource, FileSystem, ListenerFn, ModuleSource};
use crate::infrastructure::loader::LocalFs;

/// Reserved source key of the platform client
pub const CLIENT_SOURCE: &str = "client";

fn invalid_source(name: &str) -> HandlerError {
    HandlerError::InvalidType {
        name: name.to_string(),
        expected: "EventEmitter".to_string(),
    }
}

/// Named event sources listeners resolve their `emitter` key against
struct SourceTable {
    sources: RwLock<HashMap<String, Arc<dyn EventSource>>>,
}

impl SourceTable {
    fn get(&self, key: &str) -> Option<Arc<dyn EventSource>> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn lookup(&self, listener: &dyn Listener) -> Option<Arc<dyn EventSource>> {
        match &listener.options().emitter {
            SourceRef::Live(source) => Some(Arc::clone(source)),
            SourceRef::Key(key) => self.get(key),
        }
    }

    fn bind(&self, listener: &Arc<dyn Listener>) -> HandlerResult<()> {
        let source = self
            .lookup(listener.as_ref())
            .filter(|s| s.is_open())
            .ok_or_else(|| invalid_source("emitter"))?;
        let options = listener.options();
        let callback = callback(Arc::clone(listener));
        match options.mode {
            ListenerMode::On => source.on(&options.event, &options.id, callback),
            ListenerMode::Once => source.once(&options.event, &options.id, callback),
        }
        Ok(())
    }

    fn unbind(&self, listener: &dyn Listener) -> bool {
        let options = listener.options();
        self.lookup(listener)
            .is_some_and(|source| source.off(&options.event, &options.id))
    }
}

impl RegistryHooks<dyn Listener> for SourceTable {
    fn on_register(&self, listener: &Arc<dyn Listener>) -> HandlerResult<()> {
        self.bind(listener)
    }

    fn on_deregister(&self, listener: &Arc<dyn Listener>) -> HandlerResult<()> {
        // A once-listener that already fired has nothing left to unbind.
        self.unbind(listener.as_ref());
        Ok(())
    }
}

/// Event callback pinned to one listener instance
fn callback(listener: Arc<dyn Listener>) -> ListenerFn {
    Arc::new(move |args: Vec<Value>| {
        let listener = Arc::clone(&listener);
        async move {
            if let Err(e) = listener.exec(&args).await {
                error!("Listener '{}' failed: {}", listener.options().id, e);
            }
        }
        .boxed()
    })
}

pub struct ListenerHandler {
    registry: ModuleHandler<dyn Listener>,
    sources: Arc<SourceTable>,
}

impl ListenerHandler {
    pub fn new(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<dyn Listener>>,
        client: Arc<dyn EventSource>,
    ) -> HandlerResult<Self> {
        Self::with_file_system(options, source, Arc::new(LocalFs), client)
    }

    pub fn with_file_system(
        options: HandlerOptions,
        source: Arc<dyn ModuleSource<dyn Listener>>,
        fs: Arc<dyn FileSystem>,
        client: Arc<dyn EventSource>,
    ) -> HandlerResult<Self> {
        if options.class_to_handle != ModuleKind::Listener {
            return Err(HandlerError::InvalidClassToHandle {
                given: options.class_to_handle,
                expected: ModuleKind::Listener,
            });
        }
        let sources = Arc::new(SourceTable {
            sources: RwLock::new(HashMap::from([(CLIENT_SOURCE.to_string(), client)])),
        });
        let hooks: Arc<dyn RegistryHooks<dyn Listener>> = sources.clone();
        Ok(Self {
            registry: ModuleHandler::with_parts(options, source, fs, hooks),
            sources,
        })
    }

    pub fn registry(&self) -> &ModuleHandler<dyn Listener> {
        &self.registry
    }

    /// Adds named sources. Every value is checked before any is stored.
    pub fn set_emitters<I>(&self, emitters: I) -> HandlerResult<()>
    where
        I: IntoIterator<Item = (String, Arc<dyn EventSource>)>,
    {
        let emitters: Vec<_> = emitters.into_iter().collect();
        if let Some((key, _)) = emitters.iter().find(|(_, source)| !source.is_open()) {
            return Err(invalid_source(key));
        }
        self.sources
            .sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(emitters);
        Ok(())
    }

    pub fn emitter(&self, key: &str) -> Option<Arc<dyn EventSource>> {
        self.sources.get(key)
    }

    /// Rebinds a registered listener, e.g. a once-listener that has fired.
    pub fn add_to_emitter(&self, id: &str) -> HandlerResult<()> {
        let entry = self.registry.get(id).ok_or_else(|| HandlerError::ModuleNotFound {
            kind: ModuleKind::Listener,
            id: id.to_string(),
        })?;
        self.sources.bind(entry.module())
    }

    /// Unbinds a registered listener without removing it.
    pub fn remove_from_emitter(&self, id: &str) -> HandlerResult<bool> {
        let entry = self.registry.get(id).ok_or_else(|| HandlerError::ModuleNotFound {
            kind: ModuleKind::Listener,
            id: id.to_string(),
        })?;
        Ok(self.sources.unbind(entry.module().as_ref()))
    }
}

impl Deref for ListenerHandler {
    type Target = ModuleHandler<dyn Listener>;

    fn deref(&self) -> &Self::Target {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::{CommandError, LoadError};
    use crate::domain::entities::ListenerOptions;
    use crate::infrastructure::emitter::Emitter;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoSource;

    impl ModuleSource<dyn Listener> for NoSource {
        fn load(&self, _path: &Path, _expected: ModuleKind) -> Result<Option<Arc<dyn Listener>>, LoadError> {
            Ok(None)
        }

        fn unload(&self, _path: &Path) {}
    }

    struct Counting {
        options: ListenerOptions,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Listener for Counting {
        fn options(&self) -> &ListenerOptions {
            &self.options
        }

        async fn exec(&self, _args: &[Value]) -> Result<(), CommandError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn setup() -> (ListenerHandler, Arc<Emitter>) {
        let client = Arc::new(Emitter::new(CLIENT_SOURCE));
        let handler = ListenerHandler::new(
            HandlerOptions::new(ModuleKind::Listener),
            Arc::new(NoSource),
            client.clone(),
        )
        .unwrap();
        (handler, client)
    }

    fn counting(options: ListenerOptions, hits: &Arc<AtomicUsize>) -> Arc<dyn Listener> {
        Arc::new(Counting {
            options,
            hits: Arc::clone(hits),
        })
    }

    #[tokio::test]
    async fn test_register_binds_and_remove_unbinds() {
        let (handler, client) = setup();
        let hits = Arc::new(AtomicUsize::new(0));
        handler
            .register(counting(ListenerOptions::new("ready", CLIENT_SOURCE, "ready"), &hits), None)
            .unwrap();

        client.emit("ready", vec![]).await;
        handler.remove("ready").unwrap();
        client.emit("ready", vec![]).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.listener_count("ready"), 0);
    }

    #[test]
    fn test_unknown_or_closed_source_is_rejected() {
        let (handler, _client) = setup();
        let hits = Arc::new(AtomicUsize::new(0));

        let err = handler
            .register(counting(ListenerOptions::new("a", "process", "exit"), &hits), None)
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidType { .. }));

        let closed = Arc::new(Emitter::new("closed"));
        closed.close();
        let err = handler
            .set_emitters([("closed".to_string(), closed as Arc<dyn EventSource>)])
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvalidType { ref name, .. } if name == "closed"));
        assert!(handler.emitter("closed").is_none());
        assert!(handler.is_empty());
        assert!(handler.check_consistency());
    }

    #[tokio::test]
    async fn test_named_emitters_and_rebinding() {
        let (handler, _client) = setup();
        let process = Arc::new(Emitter::new("process"));
        handler
            .set_emitters([("process".to_string(), process.clone() as Arc<dyn EventSource>)])
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        handler
            .register(
                counting(ListenerOptions::new("exit", "process", "exit").once(), &hits),
                None,
            )
            .unwrap();

        process.emit("exit", vec![]).await;
        process.emit("exit", vec![]).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        handler.add_to_emitter("exit").unwrap();
        process.emit("exit", vec![]).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!handler.remove_from_emitter("exit").unwrap());
    }
}
