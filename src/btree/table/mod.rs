use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use log::debug;

use crate::{
    btree::page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeInternalPageIterator, BTreeLeafPage,
        BTreeLeafPageIterator, BTreePage, BTreeRootPointerPage, Entry,
        ROOT_POINTER_PAGE_SIZE,
    },
    error::DbError,
    page_id::{PageCategory, PageID},
    storage::{
        schema::Schema,
        tuple::{Cell, WrappedTuple},
    },
    transaction::{Permission, Transaction},
    types::{DbResult, ResultPod},
    utils::{lock_state, table_id_from_path, HandyRwLock},
    BufferPool, Database,
};

mod delete;
mod insert;
mod iter;

pub use iter::{BTreeTableIterator, BTreeTableReverseSearchIterator, BTreeTableSearchIterator};

/// Where `find_leaf_page` should land.
pub enum SearchFor {
    Key(Cell),
    LeftMost,
    RightMost,
}

/// A B+ tree file keyed on one field: a root pointer block followed by
/// leaf, internal and header pages. Tuples are kept in key order across
/// the leaf chain.
pub struct BTreeTable {
    file_path: String,

    /// the field the index is keyed on
    pub key_field: usize,

    schema: Schema,

    file: Mutex<File>,

    table_id: u32,

    /// The highest data-page index handed out so far. Page indexes start
    /// at 1; the root pointer block is index 0.
    page_index: AtomicU32,
}

impl fmt::Display for BTreeTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<BTreeTable, file: {}, id: {}>", self.file_path, self.table_id)
    }
}

impl BTreeTable {
    pub fn new<P: AsRef<Path>>(
        file_path: P,
        key_field: usize,
        schema: &Schema,
    ) -> Result<Self, DbError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&file_path)?;

        let table_id = table_id_from_path(file_path.as_ref());

        let table = Self {
            file_path: file_path.as_ref().display().to_string(),
            key_field,
            schema: schema.clone(),
            file: Mutex::new(file),
            table_id,
            page_index: AtomicU32::new(0),
        };

        table.file_init()?;
        table.page_index
            .store(table.pages_count() as u32, Ordering::Relaxed);

        Ok(table)
    }

    /// A fresh file gets a root pointer block pointing at leaf page 1,
    /// plus that empty leaf, so the tree always has a root.
    fn file_init(&self) -> DbResult {
        let len = self.get_file().metadata()?.len() as usize;
        if len == 0 {
            let mut file = self.get_file();
            file.write_all(&BTreeRootPointerPage::empty_page_data(self.table_id))?;

            let leaf_pid = PageID::new(PageCategory::Leaf, self.table_id, 1);
            let leaf = BTreeLeafPage::new_empty_page(&leaf_pid, &self.schema, self.key_field);
            file.write_all(&leaf.get_page_data())?;
            file.flush()?;
            return Ok(());
        }

        // the on-disk invariant: root pointer block plus an exact number
        // of pages
        if (len - ROOT_POINTER_PAGE_SIZE) % BufferPool::get_page_size() != 0 {
            return Err(DbError::new(&format!(
                "b+ tree file {} is not page aligned, len: {}",
                self.file_path, len
            )));
        }
        Ok(())
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_schema(&self) -> Schema {
        self.schema.clone()
    }

    fn get_file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap()
    }

    /// The count of data pages in this file (the root pointer block is
    /// not included).
    pub fn pages_count(&self) -> usize {
        let len = self.get_file().metadata().map(|m| m.len()).unwrap_or(0) as usize;
        (len - ROOT_POINTER_PAGE_SIZE) / BufferPool::get_page_size()
    }

    fn page_offset(pid: &PageID) -> u64 {
        match pid.category {
            PageCategory::RootPointer => 0,
            _ => {
                (ROOT_POINTER_PAGE_SIZE
                    + (pid.page_index as usize - 1) * BufferPool::get_page_size())
                    as u64
            }
        }
    }

    /// Read the raw block of the page.
    pub fn read_page_data(&self, pid: &PageID) -> Result<Vec<u8>, DbError> {
        let size = match pid.category {
            PageCategory::RootPointer => ROOT_POINTER_PAGE_SIZE,
            _ => BufferPool::get_page_size(),
        };

        let mut file = self.get_file();
        file.seek(SeekFrom::Start(Self::page_offset(pid)))?;
        let mut buf = vec![0; size];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_page_data(&self, pid: &PageID, data: &[u8]) -> DbResult {
        let mut file = self.get_file();
        file.seek(SeekFrom::Start(Self::page_offset(pid)))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Write a freshly initialized block for the page, growing the file
    /// when the page sits past the current end.
    pub fn write_empty_page_to_disk(&self, pid: &PageID) -> DbResult {
        let data = match pid.category {
            PageCategory::Leaf => {
                BTreeLeafPage::new_empty_page(pid, &self.schema, self.key_field).get_page_data()
            }
            PageCategory::Internal => {
                BTreeInternalPage::new_empty_page(pid, &self.schema, self.key_field)
                    .get_page_data()
            }
            PageCategory::Header => BTreeHeaderPage::new_empty_page(pid).get_page_data(),
            _ => {
                return Err(DbError::invalid_argument(&format!(
                    "cannot write an empty page of category {:?}",
                    pid.category
                )))
            }
        };
        self.write_page_data(pid, &data)
    }

    pub(crate) fn set_dirty(&self, tx: &Transaction, pid: &PageID) {
        Database::mut_concurrent_status().set_dirty_page(tx, pid);
    }

    pub fn get_root_ptr_pid(&self) -> PageID {
        PageID::new(PageCategory::RootPointer, self.table_id, 0)
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> ResultPod<BTreeRootPointerPage> {
        Database::buffer_pool().get_root_ptr_page(tx, perm, &self.get_root_ptr_pid())
    }

    /// The pid of the root page (a leaf or an internal page).
    pub fn get_root_pid(&self, tx: &Transaction) -> Result<PageID, DbError> {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadOnly)?;
        let root_pid = root_ptr_rc.rl().get_root_pid();
        Ok(root_pid)
    }

    pub fn set_root_pid(&self, tx: &Transaction, root_pid: &PageID) -> DbResult {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;
        root_ptr_rc.wl().set_root_pid(root_pid);
        self.set_dirty(tx, &self.get_root_ptr_pid());
        Ok(())
    }

    /// Recursively find and lock the leaf page corresponding to the
    /// search target. Internal nodes along the path are locked READ_ONLY;
    /// only the leaf is locked with `perm`.
    ///
    /// For a key search this lands on the left-most leaf possibly
    /// containing the key.
    pub(crate) fn find_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: PageID,
        search: &SearchFor,
    ) -> ResultPod<BTreeLeafPage> {
        match pid.category {
            PageCategory::Leaf => Database::buffer_pool().get_leaf_page(tx, perm, &pid),
            PageCategory::Internal => {
                let page_rc =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, &pid)?;

                let child_pid;
                // borrow of page_rc starts here
                {
                    let page = page_rc.rl();
                    let mut last_entry: Option<Entry> = None;
                    let mut found: Option<PageID> = None;

                    for e in BTreeInternalPageIterator::new(&page) {
                        match search {
                            SearchFor::Key(key) => {
                                if &e.get_key() >= key {
                                    found = Some(e.get_left_child());
                                    break;
                                }
                            }
                            SearchFor::LeftMost => {
                                found = Some(e.get_left_child());
                                break;
                            }
                            SearchFor::RightMost => {
                                // keep going, the last entry wins
                            }
                        }
                        last_entry = Some(e);
                    }

                    child_pid = match found {
                        Some(pid) => pid,
                        // past the last entry: descend its right child
                        None => match last_entry {
                            Some(e) => e.get_right_child(),
                            None => {
                                return Err(DbError::new(&format!(
                                    "internal page {:?} has no entries",
                                    pid
                                )))
                            }
                        },
                    };
                }
                // borrow of page_rc ends here

                self.find_leaf_page(tx, perm, child_pid, search)
            }
            _ => Err(DbError::invalid_argument(&format!(
                "cannot search a {:?} page for a leaf",
                pid.category
            ))),
        }
    }

    /// Mirror of `find_leaf_page` for reverse iteration: descend the
    /// rightmost child whose key is <= the search key.
    pub(crate) fn find_leaf_page_reverse(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: PageID,
        key: &Cell,
    ) -> ResultPod<BTreeLeafPage> {
        match pid.category {
            PageCategory::Leaf => Database::buffer_pool().get_leaf_page(tx, perm, &pid),
            PageCategory::Internal => {
                let page_rc =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, &pid)?;

                let child_pid;
                // borrow of page_rc starts here
                {
                    let page = page_rc.rl();
                    let mut found: Option<PageID> = None;
                    let mut first_entry: Option<Entry> = None;

                    for e in BTreeInternalPageIterator::new(&page).rev() {
                        if &e.get_key() <= key {
                            found = Some(e.get_right_child());
                            break;
                        }
                        first_entry = Some(e);
                    }

                    child_pid = match found {
                        Some(pid) => pid,
                        // every key is larger: descend the leftmost child
                        None => match first_entry {
                            Some(e) => e.get_left_child(),
                            None => {
                                return Err(DbError::new(&format!(
                                    "internal page {:?} has no entries",
                                    pid
                                )))
                            }
                        },
                    };
                }
                // borrow of page_rc ends here

                self.find_leaf_page_reverse(tx, perm, child_pid, key)
            }
            _ => Err(DbError::invalid_argument(&format!(
                "cannot search a {:?} page for a leaf",
                pid.category
            ))),
        }
    }

    /// Point a child page's parent pointer at the given parent.
    pub(crate) fn set_parent(
        &self,
        tx: &Transaction,
        child_pid: &PageID,
        parent_pid: &PageID,
    ) -> DbResult {
        match child_pid.category {
            PageCategory::Leaf => {
                let child_rc =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, child_pid)?;
                child_rc.wl().set_parent_pid(parent_pid);
            }
            PageCategory::Internal => {
                let child_rc = Database::buffer_pool().get_internal_page(
                    tx,
                    Permission::ReadWrite,
                    child_pid,
                )?;
                child_rc.wl().set_parent_pid(parent_pid);
            }
            _ => {
                return Err(DbError::invalid_argument(&format!(
                    "cannot reparent a {:?} page",
                    child_pid.category
                )))
            }
        }
        self.set_dirty(tx, child_pid);
        Ok(())
    }

    pub fn get_first_page(&self, tx: &Transaction, perm: Permission) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::LeftMost)
    }

    pub fn get_last_page(&self, tx: &Transaction, perm: Permission) -> ResultPod<BTreeLeafPage> {
        let root_pid = self.get_root_pid(tx)?;
        self.find_leaf_page(tx, perm, root_pid, &SearchFor::RightMost)
    }

    /// The last tuple under the given subtree.
    pub fn get_last_tuple(
        &self,
        tx: &Transaction,
        pid: &PageID,
    ) -> Result<Option<WrappedTuple>, DbError> {
        match pid.category {
            PageCategory::Internal => {
                let page_rc =
                    Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, pid)?;

                let child_pid;
                // borrow of page_rc starts here
                {
                    let page = page_rc.rl();
                    child_pid = page.get_last_child_pid();
                }
                // borrow of page_rc ends here

                self.get_last_tuple(tx, &child_pid)
            }
            PageCategory::Leaf => {
                let page_rc =
                    Database::buffer_pool().get_leaf_page(tx, Permission::ReadOnly, pid)?;
                let page = page_rc.rl();
                Ok(BTreeLeafPageIterator::new(&page).next_back())
            }
            _ => Err(DbError::invalid_argument(&format!(
                "no tuples under a {:?} page",
                pid.category
            ))),
        }
    }

    /// The total number of live tuples. Test scaffolding.
    pub fn tuples_count(self: &Arc<Self>) -> usize {
        let tx = Transaction::new();
        let count = self.iterator(&tx).count();
        tx.commit().unwrap();
        count
    }

    pub fn iterator(self: &Arc<Self>, tx: &Transaction) -> BTreeTableIterator {
        BTreeTableIterator::new(tx, self)
    }

    pub fn set_page_index(&self, i: u32) {
        self.page_index.store(i, Ordering::Relaxed);
    }
}

/// page allocation
impl BTreeTable {
    /// Find a free page number: first from the header-page free list,
    /// otherwise by growing the file. A reused slot is re-marked as used.
    pub fn get_empty_page_index(&self, tx: &Transaction) -> Result<u32, DbError> {
        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadOnly)?;
        let mut header_pid_opt = root_ptr_rc.rl().get_header_pid();

        let mut offset: usize = 0;
        while let Some(header_pid) = header_pid_opt {
            let header_rc =
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?;

            let slot = header_rc.rl().get_empty_slot();
            if let Some(slot) = slot {
                header_rc.wl().mark_slot_status(slot, true);
                self.set_dirty(tx, &header_pid);
                debug!("page index {} reused from the free list", offset + slot);
                return Ok((offset + slot) as u32);
            }

            header_pid_opt = header_rc.rl().get_next_pid();
            offset += BTreeHeaderPage::get_slots_cap();
        }

        Ok(self.page_index.fetch_add(1, Ordering::Relaxed) + 1)
    }

    // a reused page number may still be cached under its previous shape
    fn discard_stale_copies(&self, page_index: u32) {
        for category in [PageCategory::Leaf, PageCategory::Internal, PageCategory::Header].iter() {
            Database::buffer_pool()
                .discard_page(&PageID::new(*category, self.table_id, page_index));
        }
    }

    pub(crate) fn get_empty_leaf_page(&self, tx: &Transaction) -> ResultPod<BTreeLeafPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageID::new(PageCategory::Leaf, self.table_id, page_index);

        self.discard_stale_copies(page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_leaf_page(tx, Permission::ReadWrite, &pid)?;
        self.set_dirty(tx, &pid);
        Ok(page_rc)
    }

    pub(crate) fn get_empty_internal_page(
        &self,
        tx: &Transaction,
    ) -> ResultPod<BTreeInternalPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageID::new(PageCategory::Internal, self.table_id, page_index);

        self.discard_stale_copies(page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_internal_page(tx, Permission::ReadWrite, &pid)?;
        self.set_dirty(tx, &pid);
        Ok(page_rc)
    }

    pub(crate) fn get_empty_header_page(&self, tx: &Transaction) -> ResultPod<BTreeHeaderPage> {
        let page_index = self.get_empty_page_index(tx)?;
        let pid = PageID::new(PageCategory::Header, self.table_id, page_index);

        self.discard_stale_copies(page_index);
        self.write_empty_page_to_disk(&pid)?;

        let page_rc = Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &pid)?;
        self.set_dirty(tx, &pid);
        Ok(page_rc)
    }

    /// Release a page to the free list: drop it from the buffer pool and
    /// clear its bit in the covering header page. Header pages are
    /// created lazily and chained as needed.
    pub(crate) fn set_empty_page(&self, tx: &Transaction, pid: &PageID) -> DbResult {
        Database::buffer_pool().discard_page(pid);

        let slots_per_header = BTreeHeaderPage::get_slots_cap();
        let target_chain_pos = pid.page_index as usize / slots_per_header;
        let slot = pid.page_index as usize % slots_per_header;

        let root_ptr_rc = self.get_root_ptr_page(tx, Permission::ReadWrite)?;

        let mut header_rc = match root_ptr_rc.rl().get_header_pid() {
            Some(header_pid) => {
                Database::buffer_pool().get_header_page(tx, Permission::ReadWrite, &header_pid)?
            }
            None => {
                // no header pages yet; create the first one and hook it
                // into the root pointer
                let header_rc = self.get_empty_header_page(tx)?;
                let header_pid = header_rc.rl().get_pid();
                root_ptr_rc.wl().set_header_pid(&header_pid);
                self.set_dirty(tx, &self.get_root_ptr_pid());
                header_rc
            }
        };

        // walk (and extend) the chain up to the covering header page
        for _ in 0..target_chain_pos {
            let next_pid = header_rc.rl().get_next_pid();
            let next_rc = match next_pid {
                Some(next_pid) => Database::buffer_pool().get_header_page(
                    tx,
                    Permission::ReadWrite,
                    &next_pid,
                )?,
                None => {
                    let next_rc = self.get_empty_header_page(tx)?;
                    let here = header_rc.rl().get_pid();
                    let there = next_rc.rl().get_pid();
                    next_rc.wl().set_prev_pid(Some(&here));
                    header_rc.wl().set_next_pid(Some(&there));
                    self.set_dirty(tx, &here);
                    self.set_dirty(tx, &there);
                    next_rc
                }
            };
            header_rc = next_rc;
        }

        let header_pid = header_rc.rl().get_pid();
        header_rc.wl().mark_slot_status(slot, false);
        self.set_dirty(tx, &header_pid);

        debug!("page {:?} released to the free list", pid);
        Ok(())
    }
}

/// debug and integrity checking
impl BTreeTable {
    /// Log the tree structure at debug level.
    ///
    /// `max_level` bounds the depth of the dump; -1 prints everything.
    pub fn draw_tree(&self, max_level: i32) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }

        let tx = Transaction::new();

        let mut depiction = String::new();
        depiction.push_str("\n\n----- PRINT TREE STRUCTURE START -----\n\n");
        depiction.push_str(&format!("root pointer: {}\n", self.get_root_ptr_pid()));

        match self.get_root_pid(&tx) {
            Ok(root_pid) => {
                depiction.push_str(&self.draw_subtree(&tx, &root_pid, 0, max_level));
            }
            Err(e) => depiction.push_str(&format!("cannot read root pid: {}\n", e)),
        }

        depiction.push_str("\n----- PRINT TREE STRUCTURE END   -----\n\n");
        debug!("{}", depiction);

        let _ = tx.commit();
    }

    fn draw_subtree(
        &self,
        tx: &Transaction,
        pid: &PageID,
        level: usize,
        max_level: i32,
    ) -> String {
        match pid.category {
            PageCategory::Internal => self.draw_internal_node(tx, pid, level, max_level),
            PageCategory::Leaf => self.draw_leaf_node(tx, pid, level),
            _ => format!("unexpected page in tree: {:?}\n", pid),
        }
    }

    fn draw_leaf_node(&self, tx: &Transaction, pid: &PageID, level: usize) -> String {
        let mut depiction = String::new();

        let prefix = "   ".repeat(level);
        let page_rc = match Database::buffer_pool().get_leaf_page(tx, Permission::ReadOnly, pid) {
            Ok(rc) => rc,
            Err(e) => return format!("{} cannot read leaf {:?}: {}\n", prefix, pid, e),
        };
        let lock_state = lock_state(page_rc.clone());

        let page = page_rc.rl();
        depiction.push_str(&format!(
            "{} leaf: {} ({}/{} tuples) (left: {:?}, right: {:?}) (lock: {})\n",
            prefix,
            page.get_pid(),
            page.tuples_count(),
            page.get_slots_count(),
            page.get_left_pid(),
            page.get_right_pid(),
            lock_state,
        ));

        let mut it = BTreeLeafPageIterator::new(&page);
        let prefix = "   ".repeat(level + 1);
        if let Some(first) = it.next() {
            depiction.push_str(&format!("{} first tuple: {}\n", prefix, first));
        }
        if let Some(last) = it.next_back() {
            depiction.push_str(&format!("{} last tuple:  {}\n", prefix, last));
        }

        depiction
    }

    fn draw_internal_node(
        &self,
        tx: &Transaction,
        pid: &PageID,
        level: usize,
        max_level: i32,
    ) -> String {
        let mut depiction = String::new();

        let prefix = "   ".repeat(level);
        let page_rc =
            match Database::buffer_pool().get_internal_page(tx, Permission::ReadOnly, pid) {
                Ok(rc) => rc,
                Err(e) => return format!("{} cannot read internal {:?}: {}\n", prefix, pid, e),
            };
        let lock_state = lock_state(page_rc.clone());

        // borrow of page_rc starts here
        {
            let page = page_rc.rl();
            depiction.push_str(&format!(
                "{} internal: {} ({}/{} entries) (lock: {})\n",
                prefix,
                pid,
                page.entries_count(),
                page.get_max_capacity(),
                lock_state,
            ));
            if max_level != -1 && level as i32 == max_level {
                return depiction;
            }

            for (i, entry) in BTreeInternalPageIterator::new(&page).enumerate() {
                if i == 0 {
                    depiction.push_str(&self.draw_subtree(
                        tx,
                        &entry.get_left_child(),
                        level + 1,
                        max_level,
                    ));
                }
                depiction.push_str(&format!(
                    "{} key: {:?}\n",
                    "   ".repeat(level + 1),
                    entry.get_key()
                ));
                depiction.push_str(&self.draw_subtree(
                    tx,
                    &entry.get_right_child(),
                    level + 1,
                    max_level,
                ));
            }
        }
        // borrow of page_rc ends here

        depiction
    }

    /// Check the integrity of the whole tree, panicking on the first
    /// violation found:
    /// - parent pointers
    /// - sibling pointers
    /// - key ordering and range bounds
    /// - occupancy invariants (if enabled)
    pub fn check_integrity(&self, check_occupancy: bool) {
        let tx = Transaction::new();

        let root_ptr_rc = self.get_root_ptr_page(&tx, Permission::ReadOnly).unwrap();
        let root_pid = root_ptr_rc.rl().get_root_pid();
        let root_ptr_pid = self.get_root_ptr_pid();

        let root_summary =
            self.check_sub_tree(&tx, &root_pid, &root_ptr_pid, None, None, check_occupancy, 0);
        assert!(
            root_summary.left_ptr.is_none(),
            "the left-most leaf has a left sibling: {:?}",
            root_summary.left_ptr,
        );
        assert!(
            root_summary.right_ptr.is_none(),
            "the right-most leaf has a right sibling: {:?}",
            root_summary.right_ptr,
        );

        tx.commit().unwrap();
    }

    fn check_sub_tree(
        &self,
        tx: &Transaction,
        pid: &PageID,
        parent_pid: &PageID,
        mut lower_bound: Option<Cell>,
        upper_bound: Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) -> SubtreeSummary {
        match pid.category {
            PageCategory::Leaf => {
                let page_rc = Database::buffer_pool()
                    .get_leaf_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_rc.rl();
                page.check_integrity(
                    parent_pid,
                    lower_bound.as_ref(),
                    upper_bound.as_ref(),
                    check_occupancy,
                    depth,
                );

                SubtreeSummary {
                    left_ptr: page.get_left_pid(),
                    right_ptr: page.get_right_pid(),
                    left_most_pid: Some(page.get_pid()),
                    right_most_pid: Some(page.get_pid()),
                    depth,
                }
            }

            PageCategory::Internal => {
                let page_rc = Database::buffer_pool()
                    .get_internal_page(tx, Permission::ReadOnly, pid)
                    .unwrap();
                let page = page_rc.rl();
                page.check_integrity(
                    parent_pid,
                    lower_bound.as_ref(),
                    upper_bound.as_ref(),
                    check_occupancy,
                    depth,
                );

                let mut it = BTreeInternalPageIterator::new(&page);
                let current = it.next().unwrap();
                let mut accumulation = self.check_sub_tree(
                    tx,
                    &current.get_left_child(),
                    pid,
                    lower_bound.clone(),
                    Some(current.get_key()),
                    check_occupancy,
                    depth + 1,
                );

                let mut last_entry = current;
                for entry in it {
                    let current_summary = self.check_sub_tree(
                        tx,
                        &entry.get_left_child(),
                        pid,
                        lower_bound.clone(),
                        Some(entry.get_key()),
                        check_occupancy,
                        depth + 1,
                    );
                    accumulation = accumulation.check_and_merge(&current_summary);

                    lower_bound = Some(entry.get_key());
                    last_entry = entry;
                }

                let last_right_summary = self.check_sub_tree(
                    tx,
                    &last_entry.get_right_child(),
                    pid,
                    lower_bound,
                    upper_bound,
                    check_occupancy,
                    depth + 1,
                );
                accumulation.check_and_merge(&last_right_summary)
            }

            // no other page categories are allowed inside the tree
            _ => panic!("invalid page category in tree: {:?}", pid),
        }
    }
}

struct SubtreeSummary {
    /// distance towards the root
    depth: usize,

    left_ptr: Option<PageID>,
    left_most_pid: Option<PageID>,
    right_ptr: Option<PageID>,
    right_most_pid: Option<PageID>,
}

impl SubtreeSummary {
    fn check_and_merge(&self, right: &SubtreeSummary) -> SubtreeSummary {
        assert_eq!(self.depth, right.depth);
        assert_eq!(
            self.right_ptr, right.left_most_pid,
            "broken leaf chain, depth: {}, right_ptr: {:?}, left_most: {:?}",
            self.depth, self.right_ptr, right.left_most_pid,
        );
        assert_eq!(
            self.right_most_pid, right.left_ptr,
            "broken leaf chain, depth: {}, right_most: {:?}, left_ptr: {:?}",
            self.depth, self.right_most_pid, right.left_ptr,
        );

        SubtreeSummary {
            depth: self.depth,
            left_ptr: self.left_ptr,
            left_most_pid: self.left_most_pid,
            right_ptr: right.right_ptr,
            right_most_pid: right.right_most_pid,
        }
    }
}
