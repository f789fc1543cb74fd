use async_trait::async_trait;

use crate::error::StoreError;

mod memcache;
mod mock;

pub use memcache::MemcacheClient;
pub use mock::{MockStore, MockStoreCall};

/// A key-value store that loaders publish encoded records to.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, payload: &[u8]) -> Result<(), StoreError>;
}
