use super::{Connection, Connector, config::ConnectionConfig};
use crate::core::{DbError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Connection pool
///
/// Hands out store connections and takes them back when the guard is
/// released. Sizing and timeouts come from [`ConnectionConfig`].
pub struct ConnectionPool {
    /// Pool configuration
    config: ConnectionConfig,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Total number of connections created and not yet dropped
    total_connections: Arc<AtomicUsize>,
    /// Opens new connections
    connector: Arc<dyn Connector>,
    /// Next connection ID
    next_id: AtomicU64,
}

/// A connection from the pool
struct PooledConnection {
    connection: Box<dyn Connection>,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Box<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        if let Some(lifetime) = max_lifetime {
            self.created_at.elapsed() > lifetime
        } else {
            false
        }
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        if let Some(timeout) = idle_timeout {
            self.last_used.elapsed() > timeout
        } else {
            false
        }
    }
}

impl ConnectionPool {
    /// Create a new connection pool
    pub async fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate().map_err(DbError::ConfigError)?;

        let pool = Self {
            config,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            connector,
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            // Try to get an available connection
            if let Some(pooled) = self.try_get_available().await {
                return Ok(self.guard(pooled.connection));
            }

            // Try to create a new connection if under limit
            if let Some(conn) = self.try_create_connection().await? {
                return Ok(self.guard(conn));
            }

            // Check timeout
            if start.elapsed() > self.config.connect_timeout {
                return Err(DbError::ExecutionError(
                    "Connection pool timeout: no connections available".into(),
                ));
            }

            // Wait a bit before retrying
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, connection: Box<dyn Connection>) -> PoolGuard {
        tracing::trace!(connection = connection.id(), "connection acquired");
        PoolGuard {
            connection: Some(connection),
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
        }
    }

    /// Try to get an available connection from the pool
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let mut kept = VecDeque::with_capacity(available.len());
        let mut removed = 0usize;
        while let Some(pooled) = available.pop_front() {
            if pooled.is_expired(self.config.max_lifetime)
                || pooled.is_idle_too_long(self.config.idle_timeout)
                || !pooled.connection.is_active()
            {
                removed += 1;
            } else {
                kept.push_back(pooled);
            }
        }
        *available = kept;

        if removed > 0 {
            tracing::debug!(removed, "evicted stale pooled connections");
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
        }

        available.pop_front()
    }

    /// Try to create a new connection if under limit
    async fn try_create_connection(&self) -> Result<Option<Box<dyn Connection>>> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            });
        if reserved.is_err() {
            return Ok(None);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match self.connector.connect(id).await {
            Ok(connection) => Ok(Some(connection)),
            Err(err) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) -> Result<()> {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let connection = self.connector.connect(id).await?;
            available.push_back(PooledConnection::new(connection));

            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when closed or dropped
pub struct PoolGuard {
    connection: Option<Box<dyn Connection>>,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&mut self) -> Result<&mut dyn Connection> {
        match self.connection.as_mut() {
            Some(connection) => Ok(connection.as_mut()),
            None => Err(DbError::ExecutionError(
                "Connection already returned to pool".into(),
            )),
        }
    }

    /// Whether the guard still holds its connection.
    pub fn is_held(&self) -> bool {
        self.connection.is_some()
    }

    /// Explicitly return the connection to the pool.
    pub async fn close(mut self) -> Result<()> {
        self.release().await
    }

    pub(crate) async fn release(&mut self) -> Result<()> {
        if let Some(connection) = self.connection.take() {
            if !connection.is_active() {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                return Ok(());
            }
            tracing::trace!(connection = connection.id(), "connection released");
            let mut pool = self.pool.lock().await;
            pool.push_back(PooledConnection::new(connection));
        }
        Ok(())
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            // close() was not called; return it if the pool lock is free
            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push_back(PooledConnection::new(connection));
            } else {
                tracing::warn!(
                    connection = connection.id(),
                    "PoolGuard dropped while the pool lock was busy; connection dropped. Use close().await"
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn connector() -> Arc<dyn Connector> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_pool_creation() {
        let config = ConnectionConfig::default()
            .min_connections(2)
            .max_connections(5);

        let pool = ConnectionPool::new(config, connector()).await.unwrap();
        let stats = pool.stats().await;

        assert_eq!(stats.total_connections, 2); // min_connections
        assert_eq!(stats.available_connections, 2);
    }

    #[tokio::test]
    async fn test_get_connection() {
        let config = ConnectionConfig::default().max_connections(5);

        let pool = ConnectionPool::new(config, connector()).await.unwrap();
        let mut conn = pool.get_connection().await.unwrap();

        assert!(conn.is_held());
        assert!(conn.connection().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_released_guard_gives_up_its_connection() {
        let config = ConnectionConfig::default().min_connections(0);
        let pool = ConnectionPool::new(config, connector()).await.unwrap();

        let mut guard = pool.get_connection().await.unwrap();
        guard.release().await.unwrap();

        assert!(!guard.is_held());
        assert!(matches!(guard.connection(), Err(DbError::ExecutionError(_))));
        assert_eq!(pool.stats().await.available_connections, 1);
    }

    #[tokio::test]
    async fn test_connection_return_to_pool() {
        let config = ConnectionConfig::default()
            .min_connections(1)
            .max_connections(5);

        let pool = ConnectionPool::new(config, connector()).await.unwrap();

        let conn = pool.get_connection().await.unwrap();
        let stats = pool.stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.available_connections, 0);

        conn.close().await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.available_connections, 1);
        assert_eq!(stats.total_connections, 1);
    }

    #[tokio::test]
    async fn test_drop_returns_connection() {
        let config = ConnectionConfig::default().min_connections(0);
        let pool = ConnectionPool::new(config, connector()).await.unwrap();

        {
            let _conn = pool.get_connection().await.unwrap();
        }

        let stats = pool.stats().await;
        assert_eq!(stats.available_connections, 1);
    }

    #[tokio::test]
    async fn test_max_connections_limit() {
        let config = ConnectionConfig::default()
            .max_connections(2)
            .connect_timeout(Duration::from_millis(100));

        let pool = ConnectionPool::new(config, connector()).await.unwrap();

        let _conn1 = pool.get_connection().await.unwrap();
        let _conn2 = pool.get_connection().await.unwrap();

        // Third connection should timeout
        let result = pool.get_connection().await;
        assert!(matches!(result, Err(DbError::ExecutionError(_))));
    }

    #[tokio::test]
    async fn test_closed_connections_are_not_reused() {
        let config = ConnectionConfig::default().min_connections(0);
        let pool = ConnectionPool::new(config, connector()).await.unwrap();

        let mut guard = pool.get_connection().await.unwrap();
        guard.connection().unwrap().close().await.unwrap();
        guard.close().await.unwrap();

        let stats = pool.stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.available_connections, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = ConnectionConfig::default().max_connections(0);
        assert!(matches!(
            ConnectionPool::new(config, connector()).await,
            Err(DbError::ConfigError(_))
        ));
    }
}
