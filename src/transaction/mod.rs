use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{types::DbResult, Database};

mod concurrent_status;
mod wait_for_graph;

pub use concurrent_status::{ConcurrentStatus, Lock, Permission};

pub type TransactionID = u64;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A unit of work under strict two-phase locking: locks are acquired as
/// pages are touched and held until `commit` or `abort`.
#[derive(Eq, Hash, PartialEq, Clone, Copy)]
pub struct Transaction {
    // increases monotonically by 1
    id: TransactionID,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }

    pub fn commit(&self) -> DbResult {
        self.complete(true)
    }

    pub fn abort(&self) -> DbResult {
        self.complete(false)
    }

    /// On commit, flush the pages this transaction dirtied and snapshot
    /// their before-images; on abort, drop them so the next access reloads
    /// from disk. Either way, release all locks afterwards.
    fn complete(&self, commit: bool) -> DbResult {
        Database::buffer_pool().tx_complete(self, commit)?;
        Database::mut_concurrent_status().remove_relation(self);
        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}
