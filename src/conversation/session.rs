use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::UserKey;

use super::Flow;

/// In-progress flows keyed by user. Cloning shares the map.
///
/// Every method holds the lock for its whole body, so a compare and the
/// write that follows it cannot interleave with another message.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<UserKey, Flow>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_key: UserKey) -> Option<Flow> {
        let guard = self.inner.lock().await;
        guard.get(&user_key).cloned()
    }

    pub async fn set(&self, user_key: UserKey, flow: Flow) {
        let mut guard = self.inner.lock().await;
        guard.insert(user_key, flow);
    }

    /// Drop the user's flow, returning it if there was one.
    pub async fn clear(&self, user_key: UserKey) -> Option<Flow> {
        let mut guard = self.inner.lock().await;
        guard.remove(&user_key)
    }

    /// Remove and return the user's flow if `claim` accepts it.
    pub async fn take_if<F>(&self, user_key: UserKey, claim: F) -> Option<Flow>
    where
        F: FnOnce(&Flow) -> bool,
    {
        let mut guard = self.inner.lock().await;
        match guard.entry(user_key) {
            Entry::Occupied(entry) if claim(entry.get()) => Some(entry.remove()),
            _ => None,
        }
    }

    /// Swap the user's flow for `next` (or drop it on None), but only while
    /// the stored flow is still `expected`.
    pub async fn replace_if(&self, user_key: UserKey, expected: &Flow, next: Option<Flow>) -> bool {
        let mut guard = self.inner.lock().await;
        if guard.get(&user_key) != Some(expected) {
            return false;
        }
        match next {
            Some(flow) => guard.insert(user_key, flow),
            None => guard.remove(&user_key),
        };
        true
    }

    /// Put a taken flow back unless the user has started another one since.
    pub async fn restore(&self, user_key: UserKey, flow: Flow) -> bool {
        let mut guard = self.inner.lock().await;
        match guard.entry(user_key) {
            Entry::Vacant(entry) => {
                entry.insert(flow);
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}
