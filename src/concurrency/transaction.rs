use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Committed,
    Aborted,
}

/// A lightweight per-query context. The engine implements no transactional
/// semantics; this is the identity carrier the heap and executors thread
/// through their calls.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    state: TransactionState,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed),
            state: TransactionState::Growing,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn set_state(&mut self, state: TransactionState) {
        self.state = state;
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
