use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Callback bound to an event source. Receives the event arguments.
pub type ListenerFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, ()> + Send + Sync>;

/// A named event-emitting object listeners can bind to.
///
/// Bindings are keyed: binding the same key twice for one event replaces
/// the earlier callback, and `off` removes it by key.
pub trait EventSource: Send + Sync {
    fn on(&self, event: &str, key: &str, callback: ListenerFn);

    /// Like `on`, but the binding is dropped before its first invocation.
    fn once(&self, event: &str, key: &str, callback: ListenerFn);

    /// Returns whether a binding was removed.
    fn off(&self, event: &str, key: &str) -> bool;

    /// Closed sources cannot accept bindings
    fn is_open(&self) -> bool {
        true
    }
}
