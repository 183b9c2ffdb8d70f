use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePage,
        BTreeRootPointerPage,
    },
    catalog::Table,
    error::DbError,
    heap::HeapPage,
    page_id::{PageCategory, PageID},
    transaction::{ConcurrentStatus, Permission, Transaction},
    types::{ConcurrentHashMap, DbResult, Pod, ResultPod},
    utils::HandyRwLock,
    Database,
};

pub const DEFAULT_PAGE_SIZE: usize = 4096;
static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Default number of pages the pool may cache.
pub const DEFAULT_PAGES: usize = 50;

/// The page arena: the single in-memory image of every page, keyed by
/// page id, behind the lock manager.
///
/// `get_*_page` acquires the requested lock first (blocking until grant or
/// deadlock), then returns the cached page, loading it from the owning
/// file on a miss. The pool is bounded: loading into a full pool evicts a
/// clean page, and fails if every cached page is dirty (no-steal).
pub struct BufferPool {
    root_pointer_buffer: ConcurrentHashMap<PageID, Pod<BTreeRootPointerPage>>,
    header_buffer: ConcurrentHashMap<PageID, Pod<BTreeHeaderPage>>,
    internal_buffer: ConcurrentHashMap<PageID, Pod<BTreeInternalPage>>,
    leaf_buffer: ConcurrentHashMap<PageID, Pod<BTreeLeafPage>>,
    heap_buffer: ConcurrentHashMap<PageID, Pod<HeapPage>>,

    capacity: AtomicUsize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            root_pointer_buffer: ConcurrentHashMap::new(),
            header_buffer: ConcurrentHashMap::new(),
            internal_buffer: ConcurrentHashMap::new(),
            leaf_buffer: ConcurrentHashMap::new(),
            heap_buffer: ConcurrentHashMap::new(),
            capacity: AtomicUsize::new(DEFAULT_PAGES),
        }
    }

    pub fn set_page_size(page_size: usize) {
        PAGE_SIZE.store(page_size, Ordering::Relaxed);
    }

    pub fn get_page_size() -> usize {
        PAGE_SIZE.load(Ordering::Relaxed)
    }

    pub fn set_capacity(&self, pages: usize) {
        self.capacity.store(pages, Ordering::Relaxed);
    }

    pub fn get_capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    pub fn cached_pages_count(&self) -> usize {
        self.root_pointer_buffer.len()
            + self.header_buffer.len()
            + self.internal_buffer.len()
            + self.leaf_buffer.len()
            + self.heap_buffer.len()
    }

    pub fn clear(&self) {
        self.root_pointer_buffer.clear();
        self.header_buffer.clear();
        self.internal_buffer.clear();
        self.leaf_buffer.clear();
        self.heap_buffer.clear();
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageID,
    ) -> ResultPod<BTreeRootPointerPage> {
        ConcurrentStatus::request_latch(tx, &perm.to_lock(), pid)?;
        self.prepare_slot_for(pid)?;
        self.root_pointer_buffer
            .get_or_insert(pid, |pid| self.load_btree_page(pid))
    }

    pub fn get_header_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageID,
    ) -> ResultPod<BTreeHeaderPage> {
        ConcurrentStatus::request_latch(tx, &perm.to_lock(), pid)?;
        self.prepare_slot_for(pid)?;
        self.header_buffer
            .get_or_insert(pid, |pid| self.load_btree_page(pid))
    }

    pub fn get_internal_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageID,
    ) -> ResultPod<BTreeInternalPage> {
        ConcurrentStatus::request_latch(tx, &perm.to_lock(), pid)?;
        self.prepare_slot_for(pid)?;
        self.internal_buffer
            .get_or_insert(pid, |pid| self.load_btree_page(pid))
    }

    pub fn get_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageID,
    ) -> ResultPod<BTreeLeafPage> {
        ConcurrentStatus::request_latch(tx, &perm.to_lock(), pid)?;
        self.prepare_slot_for(pid)?;
        self.leaf_buffer
            .get_or_insert(pid, |pid| self.load_btree_page(pid))
    }

    pub fn get_heap_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &PageID,
    ) -> ResultPod<HeapPage> {
        ConcurrentStatus::request_latch(tx, &perm.to_lock(), pid)?;
        self.prepare_slot_for(pid)?;
        self.heap_buffer.get_or_insert(pid, |pid| {
            let table = Self::get_heap_table(pid)?;
            let page = table.read_page(pid)?;
            Ok(std::sync::Arc::new(std::sync::RwLock::new(page)))
        })
    }

    /// Load a B+ tree page from its backing file.
    fn load_btree_page<PAGE: BTreePage>(&self, pid: &PageID) -> ResultPod<PAGE> {
        let table = Self::get_btree_table(pid)?;
        let bytes = table.read_page_data(pid)?;
        let page = PAGE::new(pid, &bytes, &table.get_schema(), table.key_field);
        debug!("page loaded from disk, pid: {:?}", pid);
        Ok(std::sync::Arc::new(std::sync::RwLock::new(page)))
    }

    fn get_btree_table(
        pid: &PageID,
    ) -> Result<std::sync::Arc<crate::btree::table::BTreeTable>, DbError> {
        match Database::catalog().get_table(&pid.get_table_id()) {
            Some(Table::BTree(table)) => Ok(table),
            Some(Table::Heap(_)) => Err(DbError::invalid_argument(&format!(
                "page {:?} does not belong to a B+ tree file",
                pid
            ))),
            None => Err(DbError::new(&format!(
                "table {} not found in the catalog",
                pid.get_table_id()
            ))),
        }
    }

    fn get_heap_table(
        pid: &PageID,
    ) -> Result<std::sync::Arc<crate::heap::HeapTable>, DbError> {
        match Database::catalog().get_table(&pid.get_table_id()) {
            Some(Table::Heap(table)) => Ok(table),
            Some(Table::BTree(_)) => Err(DbError::invalid_argument(&format!(
                "page {:?} does not belong to a heap file",
                pid
            ))),
            None => Err(DbError::new(&format!(
                "table {} not found in the catalog",
                pid.get_table_id()
            ))),
        }
    }

    /// Make room for one page if `pid` is not cached yet. Eviction only
    /// considers clean pages; a pool full of dirty pages is an error
    /// (no-steal).
    fn prepare_slot_for(&self, pid: &PageID) -> DbResult {
        if self.contains(pid) {
            return Ok(());
        }

        while self.cached_pages_count() >= self.get_capacity() {
            self.evict_page()?;
        }
        Ok(())
    }

    fn contains(&self, pid: &PageID) -> bool {
        match pid.category {
            PageCategory::RootPointer => self.root_pointer_buffer.contains_key(pid),
            PageCategory::Header => self.header_buffer.contains_key(pid),
            PageCategory::Internal => self.internal_buffer.contains_key(pid),
            PageCategory::Leaf => self.leaf_buffer.contains_key(pid),
            PageCategory::Heap => self.heap_buffer.contains_key(pid),
        }
    }

    /// Evict one clean page. Eviction drops the cached image only; lock
    /// state is untouched.
    fn evict_page(&self) -> DbResult {
        let candidates = self.all_keys();
        for pid in &candidates {
            if !Database::concurrent_status().is_dirty(pid) {
                debug!("evicting page {:?}", pid);
                self.discard_page(pid);
                return Ok(());
            }
        }

        Err(DbError::new(&format!(
            "cannot evict: all {} cached pages are dirty",
            candidates.len()
        )))
    }

    /// Remove the page from the pool without writing it back. Used on
    /// abort, and by the B+ tree file when a page is released to the free
    /// list.
    pub fn discard_page(&self, pid: &PageID) {
        match pid.category {
            PageCategory::RootPointer => {
                self.root_pointer_buffer.remove(pid);
            }
            PageCategory::Header => {
                self.header_buffer.remove(pid);
            }
            PageCategory::Internal => {
                self.internal_buffer.remove(pid);
            }
            PageCategory::Leaf => {
                self.leaf_buffer.remove(pid);
            }
            PageCategory::Heap => {
                self.heap_buffer.remove(pid);
            }
        }
    }

    /// Write the content of a specific page to disk.
    fn flush_page(&self, pid: &PageID) -> DbResult {
        let data = match pid.category {
            PageCategory::RootPointer => self
                .root_pointer_buffer
                .get(pid)
                .map(|p| p.rl().get_page_data()),
            PageCategory::Header => self.header_buffer.get(pid).map(|p| p.rl().get_page_data()),
            PageCategory::Internal => {
                self.internal_buffer.get(pid).map(|p| p.rl().get_page_data())
            }
            PageCategory::Leaf => self.leaf_buffer.get(pid).map(|p| p.rl().get_page_data()),
            PageCategory::Heap => self.heap_buffer.get(pid).map(|p| p.rl().get_page_data()),
        };

        let data = match data {
            Some(data) => data,
            // not cached (e.g. already evicted clean), nothing to write
            None => return Ok(()),
        };

        debug!(
            "flushing page {:?}, image: {}...",
            pid,
            hex::encode(&data[..data.len().min(16)])
        );

        match Database::catalog().get_table(&pid.get_table_id()) {
            Some(Table::Heap(table)) => table.write_page_data(pid, &data),
            Some(Table::BTree(table)) => table.write_page_data(pid, &data),
            None => Err(DbError::new(&format!(
                "table {} not found in the catalog",
                pid.get_table_id()
            ))),
        }
    }

    /// Write every page the transaction dirtied to disk.
    pub fn flush_pages(&self, tx: &Transaction) -> DbResult {
        for pid in Database::concurrent_status().get_dirty_pages(tx) {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Flush every cached page.
    ///
    /// NB: this writes uncommitted data to disk and therefore breaks the
    /// no-steal policy; it exists for shutdown and test scaffolding.
    pub fn flush_all_pages(&self) -> DbResult {
        for pid in self.all_keys() {
            self.flush_page(&pid)?;
        }
        Ok(())
    }

    /// Transaction boundary: on commit, flush the transaction's dirty
    /// pages and snapshot their before-images; on abort, drop them so the
    /// next access reloads the last committed image from disk.
    pub fn tx_complete(&self, tx: &Transaction, commit: bool) -> DbResult {
        let dirty_pages = Database::concurrent_status().get_dirty_pages(tx);

        if !commit {
            for pid in dirty_pages {
                self.discard_page(&pid);
            }
            return Ok(());
        }

        for pid in &dirty_pages {
            self.flush_page(pid)?;
            self.set_before_image(pid);
        }
        Ok(())
    }

    fn set_before_image(&self, pid: &PageID) {
        match pid.category {
            PageCategory::RootPointer => {
                if let Some(p) = self.root_pointer_buffer.get(pid) {
                    p.wl().set_before_image();
                }
            }
            PageCategory::Header => {
                if let Some(p) = self.header_buffer.get(pid) {
                    p.wl().set_before_image();
                }
            }
            PageCategory::Internal => {
                if let Some(p) = self.internal_buffer.get(pid) {
                    p.wl().set_before_image();
                }
            }
            PageCategory::Leaf => {
                if let Some(p) = self.leaf_buffer.get(pid) {
                    p.wl().set_before_image();
                }
            }
            PageCategory::Heap => {
                if let Some(p) = self.heap_buffer.get(pid) {
                    p.wl().set_before_image();
                }
            }
        }
    }

    /// Add the tuple to the named table on behalf of the transaction,
    /// dispatching to the owning file. The file marks every page it
    /// touches dirty with the transaction.
    pub fn insert_tuple(
        &self,
        tx: &Transaction,
        table_id: u32,
        tuple: &crate::storage::tuple::Tuple,
    ) -> DbResult {
        let table = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::new(&format!("table {} not found", table_id)))?;
        match table {
            Table::Heap(t) => t.insert_tuple(tx, tuple),
            Table::BTree(t) => t.insert_tuple(tx, tuple),
        }
    }

    /// Remove the tuple from its owning table, located via its record id.
    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &crate::storage::tuple::WrappedTuple,
    ) -> DbResult {
        let pid = tuple.get_pid();
        let table = Database::catalog()
            .get_table(&pid.get_table_id())
            .ok_or_else(|| DbError::new(&format!("table {} not found", pid.get_table_id())))?;
        match table {
            Table::Heap(t) => t.delete_tuple(tx, tuple),
            Table::BTree(t) => t.delete_tuple(tx, tuple),
        }
    }

    fn all_keys(&self) -> Vec<PageID> {
        let mut keys = self.root_pointer_buffer.keys();
        keys.append(&mut self.header_buffer.keys());
        keys.append(&mut self.internal_buffer.keys());
        keys.append(&mut self.leaf_buffer.keys());
        keys.append(&mut self.heap_buffer.keys());
        keys
    }
}
