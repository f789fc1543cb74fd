use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::StoreError;

use super::KvStore;

/// In-memory store for tests. Every call is recorded, and writes for chosen keys can be made to
/// fail a fixed number of times (or forever) before succeeding.
#[derive(Clone, Default)]
pub struct MockStore {
    remaining_failures: Arc<Mutex<HashMap<String, usize>>>,
    fail_everything: bool,
    calls: Arc<Mutex<Vec<MockStoreCall>>>,
}

#[derive(Debug, Clone)]
pub struct MockStoreCall {
    pub key: String,
    pub payload: Vec<u8>,
    pub at: Instant,
    pub succeeded: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<MockStoreCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        match self.remaining_failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn fail_times(&mut self, key: &str, times: usize) -> Self {
        self.lock_failures().insert(key.to_owned(), times);
        self.clone()
    }

    pub fn always_fail(&mut self, key: &str) -> Self {
        self.fail_times(key, usize::MAX)
    }

    pub fn fail_everything(&mut self) -> Self {
        self.fail_everything = true;
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockStoreCall> {
        self.lock_calls().clone()
    }

    pub fn calls_for(&self, key: &str) -> Vec<MockStoreCall> {
        self.lock_calls()
            .iter()
            .filter(|c| c.key == key)
            .cloned()
            .collect()
    }

    /// Keys of every successful write, in the order they landed.
    pub fn stored_keys(&self) -> Vec<String> {
        self.lock_calls()
            .iter()
            .filter(|c| c.succeeded)
            .map(|c| c.key.clone())
            .collect()
    }
}

#[async_trait]
impl KvStore for MockStore {
    async fn set(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        let fail = self.fail_everything || {
            let mut failures = self.lock_failures();
            match failures.get_mut(key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining = remaining.saturating_sub(1);
                    true
                }
                _ => false,
            }
        };

        self.lock_calls().push(MockStoreCall {
            key: key.to_owned(),
            payload: payload.to_vec(),
            at: Instant::now(),
            succeeded: !fail,
        });

        if fail {
            Err(StoreError::UnexpectedResponse("SERVER_ERROR mock".to_string()))
        } else {
            Ok(())
        }
    }
}
