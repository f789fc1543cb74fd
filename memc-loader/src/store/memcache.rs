use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

use crate::error::StoreError;

use super::KvStore;

const MAX_KEY_LENGTH: usize = 250;

type Connection = BufStream<TcpStream>;

/// Minimal memcached text protocol client, only able to `set`.
///
/// At most `max_connections` writes are in flight at once, and as many connections are kept
/// idle for reuse. A connection that saw any error is dropped rather than returned to the pool.
pub struct MemcacheClient {
    address: String,
    timeout: Duration,
    max_idle: usize,
    permits: Semaphore,
    idle: Mutex<Vec<Connection>>,
}

impl MemcacheClient {
    pub fn new(address: impl Into<String>, max_connections: usize, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            max_idle: max_connections,
            permits: Semaphore::new(max_connections),
            idle: Mutex::new(Vec::with_capacity(max_connections)),
        }
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
        match self.idle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        let reused = self.lock_idle().pop();
        if let Some(conn) = reused {
            return Ok(conn);
        }
        debug!("opening connection to {}", self.address);
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(BufStream::new(stream))
    }

    async fn write_set(conn: &mut Connection, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        let header = format!("set {} 0 0 {}\r\n", key, payload.len());
        conn.write_all(header.as_bytes()).await?;
        conn.write_all(payload).await?;
        conn.write_all(b"\r\n").await?;
        conn.flush().await?;

        let mut reply = String::new();
        if conn.read_line(&mut reply).await? == 0 {
            return Err(StoreError::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        match reply.trim_end() {
            "STORED" => Ok(()),
            other => Err(StoreError::UnexpectedResponse(other.to_string())),
        }
    }
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LENGTH
        || key.bytes().any(|b| b <= b' ' || b == 0x7f)
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl KvStore for MemcacheClient {
    async fn set(&self, key: &str, payload: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let _permit = self.permits.acquire().await.map_err(|_| StoreError::Closed)?;

        let attempt = async {
            let mut conn = self.connection().await?;
            Self::write_set(&mut conn, key, payload).await?;
            Ok::<_, StoreError>(conn)
        };
        match timeout(self.timeout, attempt).await {
            Ok(Ok(conn)) => {
                self.release(conn);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}
