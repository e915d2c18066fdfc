//! In-memory token store that records every operation.

use crate::error::StoreError;
use crate::state::TokenStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get(String),
    Set(String),
    Delete(String),
}

#[derive(Default)]
struct Recorded {
    values: HashMap<String, String>,
    ops: Vec<StoreOp>,
    failing_sets: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct RecordingTokenStore {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a value without recording an operation.
    pub async fn seed(&self, key: &str, value: &str) {
        self.recorded()
            .values
            .insert(key.to_string(), value.to_string());
    }

    /// Reads a value without recording an operation.
    pub async fn value(&self, key: &str) -> Option<String> {
        self.recorded().values.get(key).cloned()
    }

    /// Makes every later `set` of `key` fail with a write error.
    pub fn fail_sets_of(&self, key: &str) {
        self.recorded().failing_sets.insert(key.to_string());
    }

    pub fn allow_sets_of(&self, key: &str) {
        self.recorded().failing_sets.remove(key);
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.recorded().ops.clone()
    }

    pub fn deletes_of(&self, key: &str) -> usize {
        self.recorded()
            .ops
            .iter()
            .filter(|op| matches!(op, StoreOp::Delete(k) if k == key))
            .count()
    }
}

#[async_trait]
impl TokenStore for RecordingTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = {
            let mut recorded = self.recorded();
            recorded.ops.push(StoreOp::Get(key.to_string()));
            recorded.values.get(key).cloned()
        };
        tokio::task::yield_now().await;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let result = {
            let mut recorded = self.recorded();
            recorded.ops.push(StoreOp::Set(key.to_string()));
            if recorded.failing_sets.contains(key) {
                Err(StoreError::Write(format!("injected failure writing {key}")))
            } else {
                recorded.values.insert(key.to_string(), value.to_string());
                Ok(())
            }
        };
        tokio::task::yield_now().await;
        result
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut recorded = self.recorded();
            recorded.ops.push(StoreOp::Delete(key.to_string()));
            recorded.values.remove(key);
        }
        tokio::task::yield_now().await;
        Ok(())
    }
}
