use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;

use crate::{
    error::DbError,
    heap::{HeapPage, HeapPageIterator},
    page_id::{PageCategory, PageID},
    storage::{
        schema::Schema,
        tuple::{Tuple, WrappedTuple},
    },
    transaction::{Permission, Transaction},
    types::DbResult,
    utils::{table_id_from_path, HandyRwLock},
    BufferPool, Database,
};

/// A heap file: an unordered sequence of fixed-size heap pages, with no
/// file header. Page i occupies bytes `[i * pageSize, (i+1) * pageSize)`.
pub struct HeapTable {
    file_path: String,

    schema: Schema,

    file: Mutex<File>,

    table_id: u32,
}

impl fmt::Display for HeapTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<HeapTable, file: {}, id: {}>", self.file_path, self.table_id)
    }
}

impl HeapTable {
    pub fn new<P: AsRef<Path>>(file_path: P, schema: &Schema) -> Result<Self, DbError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .open(&file_path)?;

        let table_id = table_id_from_path(file_path.as_ref());

        let table = Self {
            file_path: file_path.as_ref().display().to_string(),
            schema: schema.clone(),
            file: Mutex::new(file),
            table_id,
        };

        // the on-disk invariant: the file length is an exact multiple of
        // the page size
        let len = table.file_length()?;
        if len as usize % BufferPool::get_page_size() != 0 {
            return Err(DbError::new(&format!(
                "heap file {} is not page aligned, len: {}",
                table.file_path, len
            )));
        }

        Ok(table)
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

    fn file_length(&self) -> Result<u64, DbError> {
        Ok(self.get_file().metadata()?.len())
    }

    pub fn pages_count(&self) -> usize {
        let len = self.file_length().unwrap_or(0) as usize;
        len / BufferPool::get_page_size()
    }

    /// Read the raw page at `pid.page_index` and decode it.
    pub fn read_page(&self, pid: &PageID) -> Result<HeapPage, DbError> {
        let page_size = BufferPool::get_page_size();
        let start_pos = pid.page_index as usize * page_size;

        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start_pos as u64))?;
        let mut buf = vec![0; page_size];
        file.read_exact(&mut buf)?;

        debug!("heap page read from disk, pid: {:?}", pid);
        Ok(HeapPage::new(pid, &buf, &self.schema))
    }

    pub fn write_page_data(&self, pid: &PageID, data: &[u8]) -> DbResult {
        let page_size = BufferPool::get_page_size();
        let start_pos = pid.page_index as usize * page_size;

        let mut file = self.get_file();
        file.seek(SeekFrom::Start(start_pos as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Append one zero-filled page to the backing file, outside the
    /// buffer pool, and return its id. The file mutex serializes
    /// concurrent appenders.
    fn append_empty_page(&self) -> Result<PageID, DbError> {
        let page_size = BufferPool::get_page_size();

        let mut file = self.get_file();
        let len = file.metadata()?.len();
        let page_index = len as usize / page_size;

        file.seek(SeekFrom::Start(len))?;
        file.write_all(&vec![0; page_size])?;
        file.flush()?;

        Ok(PageID::new(
            PageCategory::Heap,
            self.table_id,
            page_index as u32,
        ))
    }

    /// Insert the tuple into the first page with a free slot, appending a
    /// new page when every existing page is full.
    ///
    /// A probed page that turns out to be full is unlocked again before
    /// moving on; that early release is safe because nothing on the page
    /// was touched.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> DbResult {
        for page_index in 0..self.pages_count() {
            let pid = PageID::new(PageCategory::Heap, self.table_id, page_index as u32);
            let page_rc =
                Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;

            let has_room = page_rc.rl().empty_slots_count() > 0;
            if has_room {
                page_rc.wl().insert_tuple(tuple)?;
                Database::mut_concurrent_status().set_dirty_page(tx, &pid);
                return Ok(());
            }

            Database::mut_concurrent_status().release_latch(tx, &pid);
        }

        // every page is full; grow the file and go through the buffer
        // pool for the fresh page
        let pid = self.append_empty_page()?;
        debug!("heap file grown, new page: {:?}", pid);

        let page_rc = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
        page_rc.wl().insert_tuple(tuple)?;
        Database::mut_concurrent_status().set_dirty_page(tx, &pid);
        Ok(())
    }

    /// Delete the tuple at its record id.
    pub fn delete_tuple(&self, tx: &Transaction, tuple: &WrappedTuple) -> DbResult {
        let pid = tuple.get_pid();
        if pid.category != PageCategory::Heap || pid.table_id != self.table_id {
            return Err(DbError::invalid_argument(&format!(
                "tuple {:?} does not belong to this table",
                tuple
            )));
        }

        let page_rc = Database::buffer_pool().get_heap_page(tx, Permission::ReadWrite, &pid)?;
        page_rc.wl().delete_tuple(tuple.get_slot_index())?;
        Database::mut_concurrent_status().set_dirty_page(tx, &pid);
        Ok(())
    }

    pub fn iterator(self: &Arc<Self>, tx: &Transaction) -> HeapTableIterator {
        HeapTableIterator::new(tx, Arc::clone(self))
    }

    /// The total number of live tuples. Test scaffolding.
    pub fn tuples_count(self: &Arc<Self>) -> usize {
        let tx = Transaction::new();
        let count = self.iterator(&tx).count();
        tx.commit().unwrap();
        count
    }
}

/// Page-by-page scan of the table's live tuples under READ_ONLY latches.
pub struct HeapTableIterator {
    tx: Transaction,
    table: Arc<HeapTable>,

    page_index: usize,
    page_iter: Option<HeapPageIterator>,
}

impl HeapTableIterator {
    pub fn new(tx: &Transaction, table: Arc<HeapTable>) -> Self {
        Self {
            tx: *tx,
            table,
            page_index: 0,
            page_iter: None,
        }
    }

    pub fn rewind(&mut self) {
        self.page_index = 0;
        self.page_iter = None;
    }

    fn open_page(&mut self, page_index: usize) -> Option<HeapPageIterator> {
        if page_index >= self.table.pages_count() {
            return None;
        }

        let pid = PageID::new(PageCategory::Heap, self.table.get_id(), page_index as u32);
        let page_rc = Database::buffer_pool()
            .get_heap_page(&self.tx, Permission::ReadOnly, &pid)
            .unwrap();
        Some(HeapPageIterator::new(page_rc))
    }
}

impl Iterator for HeapTableIterator {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.page_iter.is_none() {
                self.page_iter = Some(self.open_page(self.page_index)?);
            }

            if let Some(t) = self.page_iter.as_mut().and_then(|it| it.next()) {
                return Some(t);
            }

            // current page exhausted, move to the next one
            self.page_iter = None;
            self.page_index += 1;
        }
    }
}
