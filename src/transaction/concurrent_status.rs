use core::fmt;
use std::{
    collections::{HashMap, HashSet},
    thread::sleep,
    time::Instant,
};

use log::debug;

use crate::{
    error::DbError,
    page_id::PageID,
    transaction::{Transaction, TransactionID},
    types::DbResult,
    Database,
};

use super::wait_for_graph::WaitForGraph;

/// Seconds a latch request may wait before it is reported as stuck.
static TIMEOUT: u64 = 3;

#[derive(Debug, PartialEq)]
pub enum Lock {
    XLock,
    SLock,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// The lock manager: a page-granular S/X lock table with upgrade, plus the
/// wait-for graph used for deadlock detection and the per-transaction
/// dirty-page sets.
///
/// All mutating methods run under the single write lock that `Database`
/// wraps this struct in.
pub struct ConcurrentStatus {
    s_latch_map: HashMap<PageID, HashSet<TransactionID>>,
    x_latch_map: HashMap<PageID, TransactionID>,

    hold_pages: HashMap<TransactionID, HashSet<PageID>>,

    dirty_pages: HashMap<TransactionID, HashSet<PageID>>,

    wait_for_graph: WaitForGraph,
}

impl ConcurrentStatus {
    pub fn new() -> Self {
        Self {
            s_latch_map: HashMap::new(),
            x_latch_map: HashMap::new(),
            hold_pages: HashMap::new(),
            dirty_pages: HashMap::new(),
            wait_for_graph: WaitForGraph::new(),
        }
    }

    /// Request a lock on the given page. Blocks until the lock is granted,
    /// a deadlock is detected (`TransactionAborted` error), or the request
    /// times out.
    pub fn request_latch(tx: &Transaction, lock: &Lock, pid: &PageID) -> DbResult {
        debug!("request latch, tx: {:?}, lock: {:?}, pid: {:?}", tx, lock, pid);

        let start_time = Instant::now();
        while Instant::now().duration_since(start_time).as_secs() < TIMEOUT {
            // acquire the write guard on "concurrent_status"
            {
                let mut concurrent_status = Database::mut_concurrent_status();
                if concurrent_status.add_latch(tx, lock, pid) {
                    // at this point "tx" doesn't wait on any other
                    // transaction, since a transaction runs on a single
                    // thread
                    concurrent_status.wait_for_graph.remove_waiter(tx.get_id());
                    return Ok(());
                }

                // denied; record who we wait for and look for a cycle
                // before going to sleep
                concurrent_status.update_wait_for_graph(tx, lock, pid);
                if let Some(cycle) =
                    concurrent_status.wait_for_graph.find_cycle_from(tx.get_id())
                {
                    concurrent_status.wait_for_graph.remove_waiter(tx.get_id());
                    return Err(DbError::aborted(&format!(
                        "deadlock detected, tx: {:?}, lock: {:?}, pid: {:?}, cycle: {:?}",
                        tx, lock, pid, cycle
                    )));
                }
            }
            // release the write guard on "concurrent_status"

            sleep(std::time::Duration::from_millis(10));
        }

        let err = DbError::new(&format!(
            "acquire latch timeout, tx: {:?}, lock: {:?}, pid: {:?}, status: {:?}",
            tx,
            lock,
            pid,
            Database::concurrent_status(),
        ));
        err.show_backtrace();
        Err(err)
    }

    /// Try to add a lock to the given page. Idempotent.
    ///
    /// Grant rules:
    /// - no holder: grant
    /// - the only holder is `tx` itself: grant (an upgrade consumes the
    ///   shared entry, a downgrade is subsumed by the exclusive latch)
    /// - another transaction holds X: deny
    /// - only S holders: grant S; grant X only to the sole S holder
    ///
    /// Returns whether the lock was added.
    fn add_latch(&mut self, tx: &Transaction, lock: &Lock, pid: &PageID) -> bool {
        if let Some(x_holder) = self.x_latch_map.get(pid) {
            if x_holder != &tx.get_id() {
                return false;
            }

            // tx already holds the exclusive latch, which subsumes both
            // request modes
            return true;
        }

        match lock {
            Lock::SLock => {
                self.s_latch_map
                    .entry(*pid)
                    .or_insert_with(HashSet::new)
                    .insert(tx.get_id());
            }
            Lock::XLock => {
                if let Some(s_holders) = self.s_latch_map.get(pid) {
                    if s_holders.iter().any(|t| t != &tx.get_id()) {
                        return false;
                    }

                    // upgrade: the shared entry is replaced by the
                    // exclusive one
                    self.s_latch_map.remove(pid);
                }

                self.x_latch_map.insert(*pid, tx.get_id());
            }
        }

        self.hold_pages
            .entry(tx.get_id())
            .or_insert_with(HashSet::new)
            .insert(*pid);

        debug!("latch acquired, tx: {:?}, lock: {:?}, pid: {:?}", tx, lock, pid);
        true
    }

    /// Record the holders `tx` is now blocked on.
    fn update_wait_for_graph(&mut self, tx: &Transaction, lock: &Lock, pid: &PageID) {
        // rebuild this waiter's edges from the current holders
        self.wait_for_graph.remove_waiter(tx.get_id());

        // everybody waits for the exclusive holder
        if let Some(x_holder) = self.x_latch_map.get(pid) {
            self.wait_for_graph.add_edge(tx.get_id(), *x_holder);
        }

        // only an exclusive request waits for the shared holders
        if lock == &Lock::XLock {
            if let Some(s_holders) = self.s_latch_map.get(pid) {
                for s_holder in s_holders {
                    self.wait_for_graph.add_edge(tx.get_id(), *s_holder);
                }
            }
        }
    }

    /// Release one lock unconditionally. Used by the heap file to back out
    /// of a probed page that turned out to be full.
    pub fn release_latch(&mut self, tx: &Transaction, pid: &PageID) {
        if let Some(s_holders) = self.s_latch_map.get_mut(pid) {
            s_holders.remove(&tx.get_id());
            if s_holders.is_empty() {
                self.s_latch_map.remove(pid);
            }
        }

        if self.x_latch_map.get(pid) == Some(&tx.get_id()) {
            self.x_latch_map.remove(pid);
        }

        if let Some(pages) = self.hold_pages.get_mut(&tx.get_id()) {
            pages.remove(pid);
        }
    }

    /// Remove every trace of the transaction: locks, dirty set, wait-for
    /// edges.
    pub fn remove_relation(&mut self, tx: &Transaction) {
        if let Some(pages) = self.hold_pages.remove(&tx.get_id()) {
            for pid in pages {
                if let Some(s_holders) = self.s_latch_map.get_mut(&pid) {
                    s_holders.remove(&tx.get_id());
                    if s_holders.is_empty() {
                        self.s_latch_map.remove(&pid);
                    }
                }
                if self.x_latch_map.get(&pid) == Some(&tx.get_id()) {
                    self.x_latch_map.remove(&pid);
                }
            }
        }

        self.dirty_pages.remove(&tx.get_id());
        self.wait_for_graph.remove_transaction(tx.get_id());
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &PageID) -> bool {
        self.hold_pages
            .get(&tx.get_id())
            .map_or(false, |pages| pages.contains(pid))
    }

    pub fn hold_pages(&self, tx: &Transaction) -> HashSet<PageID> {
        self.hold_pages
            .get(&tx.get_id())
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_dirty_page(&mut self, tx: &Transaction, pid: &PageID) {
        self.dirty_pages
            .entry(tx.get_id())
            .or_insert_with(HashSet::new)
            .insert(*pid);
    }

    pub fn get_dirty_pages(&self, tx: &Transaction) -> HashSet<PageID> {
        self.dirty_pages
            .get(&tx.get_id())
            .cloned()
            .unwrap_or_default()
    }

    /// The transaction that dirtied the page, `None` for a clean page.
    pub fn dirty_page_tx(&self, pid: &PageID) -> Option<TransactionID> {
        for (tid, pages) in self.dirty_pages.iter() {
            if pages.contains(pid) {
                return Some(*tid);
            }
        }
        None
    }

    pub fn is_dirty(&self, pid: &PageID) -> bool {
        self.dirty_page_tx(pid).is_some()
    }

    pub fn clear(&mut self) {
        self.s_latch_map.clear();
        self.x_latch_map.clear();
        self.hold_pages.clear();
        self.dirty_pages.clear();
        self.wait_for_graph = WaitForGraph::new();
    }
}

impl fmt::Display for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\n".to_string();

        depiction.push_str("s_latch_map: {");
        for (pid, holders) in self.s_latch_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> {:?},", pid.get_short_repr(), holders));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("x_latch_map: {");
        for (pid, holder) in self.x_latch_map.iter() {
            depiction.push_str(&format!("\n\t{:?} -> tx_{},", pid.get_short_repr(), holder));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("hold_pages: {");
        for (tid, pages) in self.hold_pages.iter() {
            let pages: Vec<String> = pages.iter().map(|p| p.get_short_repr()).collect();
            depiction.push_str(&format!("\n\ttx_{} -> {:?},", tid, pages));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("dirty_pages: {");
        for (tid, pages) in self.dirty_pages.iter() {
            let pages: Vec<String> = pages.iter().map(|p| p.get_short_repr()).collect();
            depiction.push_str(&format!("\n\ttx_{} -> {:?},", tid, pages));
        }
        depiction.push_str("\n}\n");

        write!(f, "{}", depiction)
    }
}

impl fmt::Debug for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_id::PageCategory;

    fn pid(i: u32) -> PageID {
        PageID::new(PageCategory::Leaf, 1, i)
    }

    #[test]
    fn test_shared_latches_coexist() {
        let mut status = ConcurrentStatus::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        assert!(status.add_latch(&t1, &Lock::SLock, &pid(1)));
        assert!(status.add_latch(&t2, &Lock::SLock, &pid(1)));

        // neither can upgrade while the other reads
        assert!(!status.add_latch(&t1, &Lock::XLock, &pid(1)));
        assert!(!status.add_latch(&t2, &Lock::XLock, &pid(1)));
    }

    #[test]
    fn test_upgrade_sole_holder() {
        let mut status = ConcurrentStatus::new();
        let t1 = Transaction::new();

        assert!(status.add_latch(&t1, &Lock::SLock, &pid(1)));
        assert!(status.add_latch(&t1, &Lock::XLock, &pid(1)));

        // the shared entry was consumed by the upgrade
        assert!(status.s_latch_map.get(&pid(1)).is_none());
        assert_eq!(status.x_latch_map.get(&pid(1)), Some(&t1.get_id()));
    }

    #[test]
    fn test_exclusive_blocks_everyone_else() {
        let mut status = ConcurrentStatus::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        assert!(status.add_latch(&t1, &Lock::XLock, &pid(1)));
        assert!(!status.add_latch(&t2, &Lock::SLock, &pid(1)));
        assert!(!status.add_latch(&t2, &Lock::XLock, &pid(1)));

        // the holder itself may re-request in either mode
        assert!(status.add_latch(&t1, &Lock::XLock, &pid(1)));
        assert!(status.add_latch(&t1, &Lock::SLock, &pid(1)));
    }

    #[test]
    fn test_release_unblocks() {
        let mut status = ConcurrentStatus::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        assert!(status.add_latch(&t1, &Lock::XLock, &pid(1)));
        status.release_latch(&t1, &pid(1));
        assert!(status.add_latch(&t2, &Lock::XLock, &pid(1)));
    }

    #[test]
    fn test_remove_relation_releases_all() {
        let mut status = ConcurrentStatus::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        assert!(status.add_latch(&t1, &Lock::XLock, &pid(1)));
        assert!(status.add_latch(&t1, &Lock::SLock, &pid(2)));
        status.remove_relation(&t1);

        assert!(status.add_latch(&t2, &Lock::XLock, &pid(1)));
        assert!(status.add_latch(&t2, &Lock::XLock, &pid(2)));
    }
}
