//! In-process event source
//!
//! Used for the client source and for any named emitter handed to the
//! listener handler.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::traits::{EventSource, ListenerFn};

struct Binding {
    key: String,
    once: bool,
    callback: ListenerFn,
}

pub struct Emitter {
    name: String,
    bindings: Mutex<HashMap<String, Vec<Binding>>>,
    open: AtomicBool,
}

impl Emitter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn bind(&self, event: &str, key: &str, once: bool, callback: ListenerFn) {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = bindings.entry(event.to_string()).or_default();
        let binding = Binding {
            key: key.to_string(),
            once,
            callback,
        };
        match slot.iter_mut().find(|b| b.key == key) {
            Some(existing) => *existing = binding,
            None => slot.push(binding),
        }
    }

    /// Runs every callback bound to `event`, in binding order, and returns
    /// how many ran.
    pub async fn emit(&self, event: &str, args: Vec<Value>) -> usize {
        let callbacks: Vec<ListenerFn> = {
            let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = bindings.get_mut(event) else {
                return 0;
            };
            let callbacks = slot.iter().map(|b| b.callback.clone()).collect();
            slot.retain(|b| !b.once);
            callbacks
        };

        let count = callbacks.len();
        for callback in callbacks {
            callback(args.clone()).await;
        }
        count
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Drops every binding. A closed emitter rejects new listeners.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl EventSource for Emitter {
    fn on(&self, event: &str, key: &str, callback: ListenerFn) {
        self.bind(event, key, false, callback);
    }

    fn once(&self, event: &str, key: &str, callback: ListenerFn) {
        self.bind(event, key, true, callback);
    }

    fn off(&self, event: &str, key: &str) -> bool {
        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = bindings.get_mut(event) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|b| b.key != key);
        slot.len() != before
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter(hits: &Arc<AtomicUsize>) -> ListenerFn {
        let hits = Arc::clone(hits);
        Arc::new(move |_args: Vec<Value>| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_once_bindings_fire_once() {
        let emitter = Emitter::new("client");
        let hits = Arc::new(AtomicUsize::new(0));
        emitter.once("ready", "boot", counter(&hits));

        assert_eq!(emitter.emit("ready", vec![]).await, 1);
        assert_eq!(emitter.emit("ready", vec![]).await, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebinding_a_key_replaces_it() {
        let emitter = Emitter::new("client");
        let hits = Arc::new(AtomicUsize::new(0));
        emitter.on("ready", "boot", counter(&hits));
        emitter.on("ready", "boot", counter(&hits));

        assert_eq!(emitter.listener_count("ready"), 1);
        assert!(emitter.off("ready", "boot"));
        assert!(!emitter.off("ready", "boot"));
        assert_eq!(emitter.emit("ready", vec![]).await, 0);
    }

    #[test]
    fn test_close() {
        let emitter = Emitter::new("client");
        assert!(emitter.is_open());
        emitter.close();
        assert!(!emitter.is_open());
    }
}
