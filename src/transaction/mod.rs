// ============================================================================
// Transaction Execution Engine
// ============================================================================
//
// A transaction owns one pooled connection and collects store commands into
// a batch. `exec()` sends the batch as one MULTI/EXEC round trip, hands each
// reply to its handler, then runs the waiters whose data has been published.
// Handlers and waiters may queue more commands, so this repeats until nothing
// is left to send.
//
// - batch:    commands paired with their reply handlers
// - deferred: data published by handlers and the waiters depending on it
// - handlers: reply reconciliation into in-memory records
// - save / find / delete: object graph traversal
//
// ============================================================================

pub mod batch;
pub mod deferred;
pub mod state;

mod delete;
mod find;
mod handlers;
mod save;

pub use batch::{CommandBatch, Handler};
pub use deferred::{Callback, DeferredData};
pub use state::{ExecState, TransactionId};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;
use crate::connection::pool::PoolGuard;
use crate::core::{Command, DbError, Reply, Result};
use crate::schema::{RecordRef, Registry};
use find::HitCounter;
pub(crate) use find::select_fields;

/// One unit of batched work against the store.
///
/// Queue saves, finds and deletes, then call [`Transaction::exec`]. Records
/// passed to `find` are populated once `exec` returns successfully.
pub struct Transaction {
    id: TransactionId,
    state: ExecState,
    connection: Option<PoolGuard>,
    registry: Arc<Registry>,
    batch: CommandBatch,
    deferred: DeferredData,
    /// Records loaded in this execution, by record key
    cache: HashMap<String, RecordRef>,
    /// Per record key, structures that may still hold data for a load
    possible_hits: HashMap<String, HitCounter>,
    /// Caller records to fill from the cached record with the same key
    aliases: Vec<(RecordRef, RecordRef)>,
}

impl Transaction {
    pub fn new(connection: PoolGuard, registry: Arc<Registry>) -> Self {
        let id = TransactionId::new();
        tracing::trace!(transaction = %id, "transaction started");
        Self {
            id,
            state: ExecState::Pending,
            connection: Some(connection),
            registry,
            batch: CommandBatch::new(),
            deferred: DeferredData::new(),
            cache: HashMap::new(),
            possible_hits: HashMap::new(),
            aliases: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Commands queued for the next flush.
    pub fn queued(&self) -> usize {
        self.batch.len()
    }

    /// Queues `command`; `handler` receives its reply.
    pub fn enqueue(&mut self, command: Command, handler: Option<Handler>) {
        tracing::trace!(transaction = %self.id, command = %command, "queued");
        self.batch.push(command, handler);
    }

    /// Makes `value` available to waiters under `key`.
    pub fn publish(&mut self, key: impl Into<String>, value: Reply) {
        self.deferred.publish(key, value);
    }

    /// Value published under `key`.
    pub fn published(&self, key: &str) -> Result<Reply> {
        self.deferred.get(key).cloned().ok_or_else(|| {
            DbError::ExecutionError(format!("no data has been published under '{}'", key))
        })
    }

    /// Runs `callback` once every key in `keys` has been published. The
    /// empty key counts as published.
    pub fn when_ready<I, K, F>(&mut self, keys: I, callback: F)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
        F: FnOnce(&mut Transaction) -> Result<()> + Send + 'static,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.deferred.register(keys, Box::new(callback));
    }

    /// Runs ready waiters in registration order until none is ready.
    pub(crate) fn resolve_pending(&mut self) -> Result<()> {
        while let Some(waiter) = self.deferred.take_ready() {
            let callback = waiter.into_callback();
            callback(self)?;
        }
        Ok(())
    }

    /// Sends the current batch and dispatches every reply to its handler.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        let (commands, handlers) = self.batch.drain();
        tracing::debug!(transaction = %self.id, commands = commands.len(), "flushing batch");

        let replies = {
            let guard = self.connection.as_mut().ok_or_else(|| {
                DbError::ExecutionError(format!("transaction {} has no connection", self.id))
            })?;
            guard.connection()?.exec(&commands).await?
        };

        if replies.len() != commands.len() {
            return Err(DbError::Protocol(format!(
                "sent {} commands but received {} replies",
                commands.len(),
                replies.len()
            )));
        }

        if let Some((command, message)) =
            commands.iter().zip(&replies).find_map(|(command, reply)| match reply {
                Reply::Error(message) => Some((command, message)),
                _ => None,
            })
        {
            return Err(DbError::Protocol(format!("{}: {}", command, message)));
        }

        for (handler, reply) in handlers.into_iter().zip(replies) {
            if let Some(handler) = handler {
                handler(self, reply)?;
            }
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<()> {
        self.state = ExecState::Resolving;
        self.resolve_pending()?;

        while !self.batch.is_empty() {
            self.state = ExecState::Flushing;
            self.flush().await?;
            self.state = ExecState::Resolving;
            self.resolve_pending()?;
        }

        if self.deferred.pending() > 0 {
            return Err(DbError::DependencyDeadlock {
                waiting: self.deferred.pending(),
                pending_keys: self.deferred.missing_keys(),
            });
        }

        for (target, source) in std::mem::take(&mut self.aliases) {
            target.copy_from(&source)?;
        }
        Ok(())
    }

    /// Executes everything queued and releases the connection.
    ///
    /// On failure the connection's batch is discarded before the error is
    /// returned. Writes from earlier flushes are not rolled back.
    pub async fn exec(mut self) -> Result<()> {
        let span = tracing::debug_span!("exec", transaction = %self.id);
        let result = self.run().instrument(span).await;

        match &result {
            Ok(()) => {
                self.state = ExecState::Done;
                tracing::debug!(transaction = %self.id, "transaction done");
            }
            Err(err) => {
                self.state = ExecState::Failed;
                tracing::warn!(transaction = %self.id, error = %err, "transaction failed");
                self.discard().await;
            }
        }

        let released = self.release().await;
        result.and(released)
    }

    async fn discard(&mut self) {
        if let Some(guard) = self.connection.as_mut() {
            if let Ok(connection) = guard.connection() {
                if let Err(err) = connection.discard().await {
                    tracing::warn!(transaction = %self.id, error = %err, "DISCARD failed");
                }
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        match self.connection.take() {
            Some(guard) => guard.close().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("queued", &self.batch)
            .field("waiting", &self.deferred.pending())
            .field("cached", &self.cache.len())
            .finish()
    }
}
