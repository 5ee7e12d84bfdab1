//! Per-user, per-command cooldown buckets

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of charging one use against a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    /// The use was counted; `uses` is the count so far in this window
    Allowed { uses: u32 },
    /// The window is exhausted; nothing was counted
    Limited { remaining_ms: i64 },
}

struct Bucket {
    expires_at: i64,
    uses: u32,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

type Buckets = HashMap<String, HashMap<String, Bucket>>;

/// Cooldown state for one dispatcher.
///
/// A bucket is cleared by a background timer once its window ends. A bucket
/// whose window has passed is also treated as expired on the next check, so
/// expiry does not depend on the timer having fired.
#[derive(Default)]
pub struct CooldownManager {
    buckets: Arc<Mutex<Buckets>>,
    generation: AtomicU64,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges one use of `command_id` by `user_id` at `now_ms`.
    ///
    /// The first use in a window opens a bucket that expires `cooldown_ms`
    /// later. Once `ratelimit` uses are counted further uses are rejected
    /// with the time left in the window.
    pub fn check(&self, user_id: &str, command_id: &str, now_ms: i64, cooldown_ms: u64, ratelimit: u32) -> CooldownCheck {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let user = buckets.entry(user_id.to_string()).or_default();

        if user.get(command_id).is_some_and(|b| now_ms >= b.expires_at) {
            if let Some(timer) = user.remove(command_id).and_then(|b| b.timer) {
                timer.abort();
            }
        }

        let bucket = match user.entry(command_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let timer = self.schedule(user_id, command_id, generation, cooldown_ms);
                entry.insert(Bucket {
                    expires_at: now_ms.saturating_add(cooldown_ms as i64),
                    uses: 0,
                    generation,
                    timer,
                })
            }
        };

        if bucket.uses >= ratelimit {
            return CooldownCheck::Limited {
                remaining_ms: bucket.expires_at - now_ms,
            };
        }
        bucket.uses += 1;
        CooldownCheck::Allowed { uses: bucket.uses }
    }

    // Outside a runtime there is no timer and expiry is lazy only.
    fn schedule(&self, user_id: &str, command_id: &str, generation: u64, cooldown_ms: u64) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let buckets = Arc::downgrade(&self.buckets);
        let user_id = user_id.to_string();
        let command_id = command_id.to_string();
        Some(runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(cooldown_ms)).await;
            expire(&buckets, &user_id, &command_id, generation);
        }))
    }

    /// Uses counted in the live bucket, if there is one
    pub fn uses(&self, user_id: &str, command_id: &str) -> Option<u32> {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)?
            .get(command_id)
            .map(|b| b.uses)
    }

    /// Whether any bucket is held for `user_id`
    pub fn is_tracking(&self, user_id: &str) -> bool {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    pub fn clear(&self) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        for bucket in buckets.drain().flat_map(|(_, user)| user.into_values()) {
            if let Some(timer) = bucket.timer {
                timer.abort();
            }
        }
    }
}

impl Drop for CooldownManager {
    fn drop(&mut self) {
        self.clear();
    }
}

// A bucket superseded since the timer was armed has a newer generation and
// is left alone.
fn expire(buckets: &Weak<Mutex<Buckets>>, user_id: &str, command_id: &str, generation: u64) {
    let Some(buckets) = buckets.upgrade() else {
        return;
    };
    let mut buckets = buckets.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(user) = buckets.get_mut(user_id) else {
        return;
    };
    if user.get(command_id).is_some_and(|b| b.generation == generation) {
        user.remove(command_id);
    }
    if user.is_empty() {
        buckets.remove(user_id);
    }
}
