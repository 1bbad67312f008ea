// ============================================================================
// Execution State
// ============================================================================
//
// Lifecycle of one transaction's execution loop:
//
//   Pending ──exec──> Resolving ──batch queued──> Flushing ──replies──> Resolving
//                         │                                                │
//                         └──── batch empty, no waiters ──> Done <─────────┘
//
// Any error, including waiters left over once the batch is empty, moves the
// execution to Failed.
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier used to correlate a transaction's log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Operations are being queued; nothing has been sent
    Pending,

    /// A batch is on the wire
    Flushing,

    /// Running waiters whose data has arrived
    Resolving,

    Done,

    Failed,
}

impl ExecState {
    /// Whether operations may still be queued
    pub fn is_pending(&self) -> bool {
        matches!(self, ExecState::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecState::Done | ExecState::Failed)
    }
}

impl std::fmt::Display for ExecState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecState::Pending => write!(f, "PENDING"),
            ExecState::Flushing => write!(f, "FLUSHING"),
            ExecState::Resolving => write!(f, "RESOLVING"),
            ExecState::Done => write!(f, "DONE"),
            ExecState::Failed => write!(f, "FAILED"),
        }
    }
}
