use std::collections::{HashMap, HashSet};
use crate::core::{Reply, Result};
use super::Transaction;

/// Callback run once every key it waits on has been published.
pub type Callback = Box<dyn FnOnce(&mut Transaction) -> Result<()> + Send>;

/// A callback and the data keys it depends on.
///
/// The empty key is always satisfied.
pub struct Waiter {
    keys: Vec<String>,
    callback: Callback,
}

impl Waiter {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub(crate) fn into_callback(self) -> Callback {
        self.callback
    }
}

/// Values produced by earlier replies and the waiters that need them.
#[derive(Default)]
pub struct DeferredData {
    data: HashMap<String, Reply>,
    waiters: Vec<Waiter>,
}

impl DeferredData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `key` available. Publishing again overwrites the value.
    pub fn publish(&mut self, key: impl Into<String>, value: Reply) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Reply> {
        self.data.get(key)
    }

    pub fn is_published(&self, key: &str) -> bool {
        key.is_empty() || self.data.contains_key(key)
    }

    pub fn register(&mut self, keys: Vec<String>, callback: Callback) {
        self.waiters.push(Waiter { keys, callback });
    }

    /// Removes and returns the earliest registered waiter whose keys are all
    /// published.
    pub fn take_ready(&mut self) -> Option<Waiter> {
        let position = self
            .waiters
            .iter()
            .position(|waiter| waiter.keys.iter().all(|key| self.is_published(key)))?;
        Some(self.waiters.remove(position))
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// Keys some waiter is still missing, deduplicated, in registration order.
    pub fn missing_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for key in self.waiters.iter().flat_map(|waiter| waiter.keys.iter()) {
            if !self.is_published(key) && seen.insert(key.as_str()) {
                missing.push(key.clone());
            }
        }
        missing
    }
}
