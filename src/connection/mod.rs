pub mod config;
pub mod pool;

use crate::core::{Command, Reply, Result};
use async_trait::async_trait;

/// A connection to the store.
///
/// Used strictly sequentially by one transaction at a time. Implementations
/// frame `exec` batches with MULTI/EXEC so the whole batch is applied in one
/// round trip.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection id assigned by the pool.
    fn id(&self) -> u64;

    /// Whether the connection can still be used.
    fn is_active(&self) -> bool;

    /// Submit `commands` as one MULTI/EXEC round trip, one reply per command
    /// in submission order. Per-command failures come back as
    /// [`Reply::Error`]; transport failures as `Err`.
    async fn exec(&mut self, commands: &[Command]) -> Result<Vec<Reply>>;

    /// Single command outside of any batch.
    async fn query(&mut self, command: &Command) -> Result<Reply>;

    /// Abandon an in-flight MULTI block.
    async fn discard(&mut self) -> Result<()>;

    /// Close the connection. Further calls fail.
    async fn close(&mut self) -> Result<()>;
}

/// Opens new connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, id: u64) -> Result<Box<dyn Connection>>;
}
