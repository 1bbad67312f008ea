// ============================================================================
// relkv Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod query;
pub mod schema;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{Command, DataType, DbError, Reply, Result, Value};
pub use query::Query;
pub use schema::{IndexKind, Model, ModelSchema, RecordRef, Registry, SchemaBuilder, Shared, shared};
pub use storage::MemoryStore;
pub use transaction::{ExecState, Transaction, TransactionId};

// Re-export connection API
pub use connection::{
    Connection, Connector,
    config::ConnectionConfig,
    pool::{ConnectionPool, PoolGuard, PoolStats},
};

use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Store client with connection pooling and a model registry
///
/// Every call runs in its own [`Transaction`]; use [`Client::transaction`]
/// to batch several operations into one execution.
///
/// # Examples
///
/// ```ignore
/// let registry = Registry::new().with::<Person>()?;
/// let client = Client::in_memory(registry).await?;
///
/// let person = shared(Person { name: "Ann".into(), ..Person::default() });
/// client.save(&person).await?;
///
/// let id = person.read()?.id.clone();
/// let found = client.find_by_id::<Person>(&id).await?;
/// ```
pub struct Client {
    pool: ConnectionPool,
    registry: Arc<Registry>,
}

impl Client {
    /// Connect through `connector` with custom configuration
    pub async fn connect(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        registry: Registry,
    ) -> Result<Self> {
        let pool = ConnectionPool::new(config, connector).await?;
        tracing::debug!(url = %pool.config().to_url(), models = ?registry.names(), "client connected");
        Ok(Self {
            pool,
            registry: Arc::new(registry),
        })
    }

    /// Client backed by a fresh [`MemoryStore`]
    pub async fn in_memory(registry: Registry) -> Result<Self> {
        Self::connect(
            ConnectionConfig::default(),
            Arc::new(MemoryStore::new()),
            registry,
        )
        .await
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Start a transaction on a pooled connection
    pub async fn transaction(&self) -> Result<Transaction> {
        let connection = self.pool.get_connection().await?;
        Ok(Transaction::new(connection, Arc::clone(&self.registry)))
    }

    /// Save `record`, assigning it an id if it has none
    pub async fn save<M: Model>(&self, record: &Shared<M>) -> Result<()> {
        let mut tx = self.transaction().await?;
        tx.save(record)?;
        tx.exec().await
    }

    /// Load the record of type `M` with `id`, following its relationships
    pub async fn find_by_id<M: Model>(&self, id: &str) -> Result<Shared<M>> {
        let mut model = M::default();
        model.set_id(id.to_string());
        let record = shared(model);
        self.scan_by_id(id, &record).await?;
        Ok(record)
    }

    /// Load the record with `id` into an existing `record`
    pub async fn scan_by_id<M: Model>(&self, id: &str, record: &Shared<M>) -> Result<()> {
        record.write()?.set_id(id.to_string());
        let mut tx = self.transaction().await?;
        tx.find(record)?;
        tx.exec().await
    }

    /// Load a record knowing only its model name
    pub async fn find_by_name(&self, name: &str, id: &str) -> Result<RecordRef> {
        let mut tx = self.transaction().await?;
        let record = tx.find_by_name(name, id)?;
        tx.exec().await?;
        Ok(record)
    }

    pub async fn delete<M: Model>(&self, record: &Shared<M>) -> Result<()> {
        let mut tx = self.transaction().await?;
        tx.delete(record)?;
        tx.exec().await
    }

    /// Delete by model name and id; a missing record is not an error
    pub async fn delete_by_id(&self, name: &str, id: &str) -> Result<()> {
        let mut tx = self.transaction().await?;
        tx.delete_by_id(name, id)?;
        tx.exec().await
    }

    /// Start a query over every record of `M`
    pub fn query<M: Model>(&self) -> Query<'_, M> {
        Query::new(self)
    }

    /// Send one command outside of any batch
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        let mut guard = self.pool.get_connection().await?;
        let reply = guard.connection()?.query(&command).await;
        guard.close().await?;
        reply?.check()
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        self.pool.stats().await
    }
}
