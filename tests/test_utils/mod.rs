use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use log::debug;
use once_cell::sync::Lazy;
use rand::Rng;
use tiny_db::{
    btree::page::{
        BTreeInternalPage, BTreeLeafPage, BTreeLeafPageIteratorRc, BTreePage, Entry,
    },
    buffer_pool::DEFAULT_PAGE_SIZE,
    catalog::Table,
    page_id::{PageCategory, PageID},
    small_int_schema,
    storage::tuple::Tuple,
    transaction::{Permission, Transaction},
    utils::{init_log, HandyRwLock},
    BTreeTable, BufferPool, Database, HeapTable, Schema,
};

/// The engine context (page size, buffer pool, lock manager) is process
/// wide, so tests in one binary take turns.
static SERIAL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestContext {
    _guard: MutexGuard<'static, ()>,
}

/// Conduct the initialization:
/// - install the log backend
/// - reset the page size and pool capacity
/// - drop cached pages and lock state
pub fn setup() -> TestContext {
    let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    init_log();
    BufferPool::set_page_size(DEFAULT_PAGE_SIZE);
    Database::reset();
    // plenty of headroom; the eviction tests shrink it themselves
    Database::buffer_pool().set_capacity(1000);

    TestContext { _guard: guard }
}

static PATH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh database file path, unique per test invocation.
pub fn unique_db_path(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "tiny_db_{}_{}_{}.db",
        prefix,
        std::process::id(),
        PATH_COUNTER.fetch_add(1, Ordering::Relaxed),
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[derive(Clone, Copy, Debug)]
pub enum TreeLayout {
    /// insert through the tree, splits happen naturally
    Naturally,
    /// construct the pages directly, spreading tuples evenly
    EvenlyDistributed,
    /// construct the pages directly, all full except the last two
    LastTwoEvenlyDistributed,
}

pub fn leaf_records_cap() -> usize {
    BTreeLeafPage::calculate_slots_count(&small_int_schema(2, ""))
}

pub fn internal_children_cap() -> usize {
    BTreeInternalPage::get_children_cap(4)
}

pub fn new_empty_btree_table(columns: usize, key_field: usize) -> Arc<BTreeTable> {
    let schema = small_int_schema(columns, "");
    let table_rc = Arc::new(
        BTreeTable::new(unique_db_path("btree"), key_field, &schema).unwrap(),
    );
    Database::mut_catalog().add_table(Table::BTree(Arc::clone(&table_rc)), "btree_table", "");
    table_rc
}

/// Create a B+ tree table holding `rows` random rows, sorted on the key
/// field before insertion.
///
/// `int_tuples` returns the inserted data when not None.
pub fn new_random_btree_table(
    columns: usize,
    rows: usize,
    int_tuples: Option<&mut Vec<Vec<i32>>>,
    key_field: usize,
    tree_layout: TreeLayout,
) -> Arc<BTreeTable> {
    let mut rng = rand::thread_rng();
    let values: Vec<i32> = (0..rows).map(|_| rng.gen_range(i32::MIN, i32::MAX)).collect();
    new_btree_table_with_values(columns, &values, int_tuples, key_field, tree_layout)
}

/// Same as `new_random_btree_table`, but with the key values 0..rows.
pub fn new_sequential_btree_table(
    columns: usize,
    rows: usize,
    key_field: usize,
    tree_layout: TreeLayout,
) -> Arc<BTreeTable> {
    let values: Vec<i32> = (0..rows as i32).collect();
    new_btree_table_with_values(columns, &values, None, key_field, tree_layout)
}

fn new_btree_table_with_values(
    columns: usize,
    values: &[i32],
    int_tuples: Option<&mut Vec<Vec<i32>>>,
    key_field: usize,
    tree_layout: TreeLayout,
) -> Arc<BTreeTable> {
    let schema = small_int_schema(columns, "");
    let table_rc = Arc::new(
        BTreeTable::new(unique_db_path("btree"), key_field, &schema).unwrap(),
    );
    Database::mut_catalog().add_table(Table::BTree(Arc::clone(&table_rc)), "btree_table", "");

    let mut tuples: Vec<Tuple> = values
        .iter()
        .map(|v| Tuple::new_int_tuple(*v, columns))
        .collect();
    tuples.sort_by(|a, b| a.get_cell(key_field).cmp(&b.get_cell(key_field)));

    if let Some(int_tuples) = int_tuples {
        for t in tuples.iter() {
            int_tuples.push(t.get_cells().iter().map(|c| c.get_int32()).collect());
        }
    }

    let write_tx = Transaction::new();
    match tree_layout {
        TreeLayout::Naturally => {
            for t in tuples.iter() {
                table_rc.insert_tuple(&write_tx, t).unwrap();
            }
        }
        TreeLayout::EvenlyDistributed | TreeLayout::LastTwoEvenlyDistributed => {
            let page_index = sequential_insert_into_table(
                &write_tx,
                &table_rc,
                &tuples,
                &schema,
                tree_layout,
            );
            table_rc.set_page_index(page_index);
        }
    }

    // direct page construction bypasses the dirty tracking, so push
    // everything to disk before the locks go away
    Database::buffer_pool().flush_all_pages().unwrap();
    write_tx.commit().unwrap();

    debug!("table construction finished, {} rows inserted", values.len());
    table_rc
}

fn sequential_insert_into_table(
    tx: &Transaction,
    table: &Arc<BTreeTable>,
    tuples: &[Tuple],
    schema: &Schema,
    tree_layout: TreeLayout,
) -> u32 {
    // stage 1: write the leaf pages
    let leaf_buckets = get_buckets(
        tuples.len(),
        BTreeLeafPage::calculate_slots_count(schema),
        tree_layout,
    );

    let mut leaves = Vec::new();
    let mut page_index: u32 = 0;
    let mut tuple_index = 0;
    for tuple_count in &leaf_buckets {
        page_index += 1;
        let pid = PageID::new(PageCategory::Leaf, table.get_id(), page_index);
        table.write_empty_page_to_disk(&pid).unwrap();

        let leaf_rc = Database::buffer_pool()
            .get_leaf_page(tx, Permission::ReadWrite, &pid)
            .unwrap();
        leaves.push(Arc::clone(&leaf_rc));

        // borrow of leaf_rc starts here
        {
            let mut leaf = leaf_rc.wl();
            for _ in 0..*tuple_count {
                if let Some(t) = tuples.get(tuple_index) {
                    leaf.insert_tuple(t).unwrap();
                }
                tuple_index += 1;
            }

            if page_index > 1 {
                leaf.set_left_pid(Some(PageID::new(
                    PageCategory::Leaf,
                    table.get_id(),
                    page_index - 1,
                )));
            }
            if (page_index as usize) < leaf_buckets.len() {
                leaf.set_right_pid(Some(PageID::new(
                    PageCategory::Leaf,
                    table.get_id(),
                    page_index + 1,
                )));
            }
        }
        // borrow of leaf_rc ends here
    }

    match leaves.len() {
        0 => return page_index,
        1 => {
            table.set_root_pid(tx, &leaves[0].rl().get_pid()).unwrap();
            return page_index;
        }
        _ => {}
    }

    // stage 2: write the internal level above the leaves
    let internal_buckets = get_buckets(leaves.len(), internal_children_cap(), tree_layout);

    let mut internals = Vec::new();
    let mut leaf_index = 0;
    for children_count in &internal_buckets {
        page_index += 1;
        let pid = PageID::new(PageCategory::Internal, table.get_id(), page_index);
        table.write_empty_page_to_disk(&pid).unwrap();

        let internal_rc = Database::buffer_pool()
            .get_internal_page(tx, Permission::ReadWrite, &pid)
            .unwrap();
        internals.push(Arc::clone(&internal_rc));

        let entries_count = children_count - 1;
        for j in 0..entries_count {
            let left_rc = Arc::clone(&leaves[leaf_index]);
            let right_rc = Arc::clone(&leaves[leaf_index + 1]);

            let key = BTreeLeafPageIteratorRc::new(Arc::clone(&right_rc))
                .next()
                .unwrap()
                .get_cell(table.key_field);

            // borrow of internal_rc starts here
            {
                let mut internal = internal_rc.wl();
                let entry = Entry::new(key, &left_rc.rl().get_pid(), &right_rc.rl().get_pid());
                internal.insert_entry(&entry).unwrap();

                left_rc.wl().set_parent_pid(&pid);
                if j == entries_count - 1 {
                    right_rc.wl().set_parent_pid(&pid);
                }
            }
            // borrow of internal_rc ends here

            leaf_index += 1;
        }

        // step over the last right child of this internal page
        leaf_index += 1;
    }

    write_internal_pages(tx, table, internals, &mut page_index);
    page_index
}

fn write_internal_pages(
    tx: &Transaction,
    table: &Arc<BTreeTable>,
    internals: Vec<Arc<std::sync::RwLock<BTreeInternalPage>>>,
    page_index: &mut u32,
) {
    if internals.len() <= 1 {
        table
            .set_root_pid(tx, &internals[0].rl().get_pid())
            .unwrap();
        return;
    }

    if internals.len() > internal_children_cap() {
        unimplemented!("test scaffolding only builds trees up to three levels");
    }

    // a single root page above the internal level
    *page_index += 1;
    let pid = PageID::new(PageCategory::Internal, table.get_id(), *page_index);
    table.write_empty_page_to_disk(&pid).unwrap();

    let root_rc = Database::buffer_pool()
        .get_internal_page(tx, Permission::ReadWrite, &pid)
        .unwrap();

    let entries_count = internals.len() - 1;
    for i in 0..entries_count {
        let left_rc = Arc::clone(&internals[i]);
        let right_rc = Arc::clone(&internals[i + 1]);

        let key = table
            .get_last_tuple(tx, &left_rc.rl().get_pid())
            .unwrap()
            .unwrap()
            .get_cell(table.key_field);

        // borrow of root_rc starts here
        {
            let mut root = root_rc.wl();
            let entry = Entry::new(key, &left_rc.rl().get_pid(), &right_rc.rl().get_pid());
            root.insert_entry(&entry).unwrap();

            left_rc.wl().set_parent_pid(&pid);
            if i == entries_count - 1 {
                right_rc.wl().set_parent_pid(&pid);
            }
        }
        // borrow of root_rc ends here
    }

    table.set_root_pid(tx, &pid).unwrap();
}

fn get_buckets(elem_count: usize, max_capacity: usize, layout: TreeLayout) -> Vec<usize> {
    if elem_count <= max_capacity {
        return vec![elem_count];
    }

    let mut bucket_count = elem_count / max_capacity;
    if elem_count % max_capacity > 0 {
        bucket_count += 1;
    }

    let mut buckets = Vec::new();
    match layout {
        TreeLayout::Naturally | TreeLayout::EvenlyDistributed => {
            let bucket_size = elem_count / bucket_count;
            let lacked = elem_count % bucket_count;
            for _ in 0..lacked {
                buckets.push(bucket_size + 1);
            }
            for _ in lacked..bucket_count {
                buckets.push(bucket_size);
            }
        }
        TreeLayout::LastTwoEvenlyDistributed => {
            let lacked = max_capacity * bucket_count - elem_count;
            for _ in 0..bucket_count.saturating_sub(2) {
                buckets.push(max_capacity);
            }

            buckets.push(max_capacity - lacked / 2);
            if lacked % 2 == 0 {
                buckets.push(max_capacity - lacked / 2);
            } else {
                buckets.push(max_capacity - lacked / 2 - 1);
            }
        }
    }

    buckets
}

/// Tuple counts of the leaf pages, left to right along the sibling
/// chain.
pub fn leaf_chain_lengths(table: &Arc<BTreeTable>) -> Vec<usize> {
    let tx = Transaction::new();
    let mut lengths = Vec::new();

    let mut page_rc = table.get_first_page(&tx, Permission::ReadOnly).unwrap();
    loop {
        let (count, right) = {
            let page = page_rc.rl();
            (page.tuples_count(), page.get_right_pid())
        };
        lengths.push(count);

        match right {
            Some(right_pid) => {
                page_rc = Database::buffer_pool()
                    .get_leaf_page(&tx, Permission::ReadOnly, &right_pid)
                    .unwrap();
            }
            None => break,
        }
    }

    tx.commit().unwrap();
    lengths
}

/// Create a heap table holding `rows` random rows.
pub fn new_random_heap_table(
    columns: usize,
    rows: usize,
    int_tuples: Option<&mut Vec<Vec<i32>>>,
) -> Arc<HeapTable> {
    let schema = small_int_schema(columns, "");
    let table_rc = Arc::new(HeapTable::new(unique_db_path("heap"), &schema).unwrap());
    Database::mut_catalog().add_table(Table::Heap(Arc::clone(&table_rc)), "heap_table", "");

    let mut rng = rand::thread_rng();
    let mut tuples = Vec::new();
    for _ in 0..rows {
        let value = rng.gen_range(i32::MIN, i32::MAX);
        tuples.push(Tuple::new_int_tuple(value, columns));
    }

    if let Some(int_tuples) = int_tuples {
        for t in tuples.iter() {
            int_tuples.push(t.get_cells().iter().map(|c| c.get_int32()).collect());
        }
    }

    let tx = Transaction::new();
    for t in tuples.iter() {
        table_rc.insert_tuple(&tx, t).unwrap();
    }
    tx.commit().unwrap();

    table_rc
}
