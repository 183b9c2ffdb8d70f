use tiny_db::{
    page_id::PageCategory, transaction::Transaction, utils::HandyRwLock, BufferPool, Database,
    Permission, Tuple,
};

mod test_utils;
use test_utils::{
    internal_children_cap, leaf_chain_lengths, leaf_records_cap, new_random_btree_table, setup,
    TreeLayout,
};

#[test]
fn test_redistribute_leaf_pages() {
    let _ctx = setup();

    // two leaf pages, evenly filled
    let table = new_random_btree_table(2, 600, None, 0, TreeLayout::EvenlyDistributed);
    table.check_integrity(true);
    assert_eq!(leaf_chain_lengths(&table), vec![300, 300]);

    // deleting from the first page brings it to minimum occupancy; one
    // more deletion triggers a steal from the sibling
    let delete_count = 300 - leaf_records_cap() / 2;
    let tx = Transaction::new();
    let victims: Vec<_> = table.iterator(&tx).take(delete_count).collect();
    for t in &victims {
        table.delete_tuple(&tx, t).unwrap();
    }
    tx.commit().unwrap();

    table.draw_tree(-1);
    table.check_integrity(true);

    // both leaves end evenly loaded and the parent key moved with the
    // first tuple of the right page
    let total = 600 - delete_count;
    assert_eq!(leaf_chain_lengths(&table), vec![total / 2, total - total / 2]);
}

#[test]
fn test_merge_leaf_pages() {
    let _ctx = setup();

    // three leaf pages, the last two about half full
    let table = new_random_btree_table(2, 1005, None, 0, TreeLayout::LastTwoEvenlyDistributed);
    table.check_integrity(true);
    assert_eq!(leaf_chain_lengths(&table).len(), 3);

    // shrinking the tail forces the last two leaves to merge; a fresh
    // iterator per deletion, since merges move tuples across pages
    for _ in 0..5 {
        let tx = Transaction::new();
        let victim = table.iterator(&tx).next_back().unwrap();
        table.delete_tuple(&tx, &victim).unwrap();
        tx.commit().unwrap();
        table.check_integrity(true);
    }

    assert_eq!(leaf_chain_lengths(&table).len(), 2);
    assert_eq!(table.tuples_count(), 1000);
}

#[test]
fn test_delete_root_page() {
    let _ctx = setup();

    // two half-full leaf pages under a one-entry root
    let table = new_random_btree_table(2, 503, None, 0, TreeLayout::LastTwoEvenlyDistributed);
    table.check_integrity(true);
    assert_eq!(3, table.pages_count());

    // deleting from the front merges the leaves and hands the root role
    // to the surviving leaf
    for _ in 0..3 {
        let tx = Transaction::new();
        let victim = table.iterator(&tx).next().unwrap();
        table.delete_tuple(&tx, &victim).unwrap();
        tx.commit().unwrap();
        table.check_integrity(true);
    }

    let tx = Transaction::new();
    let root_pid = table.get_root_pid(&tx).unwrap();
    assert_eq!(root_pid.category, PageCategory::Leaf);

    let root_rc = Database::buffer_pool()
        .get_leaf_page(&tx, Permission::ReadOnly, &root_pid)
        .unwrap();
    assert_eq!(root_rc.rl().tuples_count(), 500);
    tx.commit().unwrap();
}

#[test]
fn test_reuse_deleted_pages() {
    let _ctx = setup();

    // three leaf pages under one root
    let table = new_random_btree_table(2, 1005, None, 0, TreeLayout::LastTwoEvenlyDistributed);
    table.check_integrity(true);
    assert_eq!(4, table.pages_count());

    // delete enough tuples so one leaf page gets merged away
    for _ in 0..502 {
        let tx = Transaction::new();
        let victim = table.iterator(&tx).next().unwrap();
        table.delete_tuple(&tx, &victim).unwrap();
        tx.commit().unwrap();
    }
    table.check_integrity(true);

    // the freed leaf page went to the free list, which cost one header
    // page
    assert_eq!(5, table.pages_count());

    // splitting again must reuse the freed page instead of growing the
    // file; duplicates of one large key funnel into a single leaf and
    // force the split
    let tx = Transaction::new();
    for _ in 0..400 {
        let tuple = Tuple::new_int_tuple(i32::MAX - 1, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
    }
    tx.commit().unwrap();
    table.check_integrity(false);

    assert_eq!(5, table.pages_count());
}

#[test]
fn test_redistribute_internal_pages() {
    let _ctx = setup();

    // smaller pages keep this tree manageable
    BufferPool::set_page_size(512);

    // two packed subtrees under the root
    let rows = 2 * internal_children_cap() * leaf_records_cap();
    let table = new_random_btree_table(2, rows, None, 0, TreeLayout::LastTwoEvenlyDistributed);
    table.check_integrity(true);

    // bring the left internal page below minimum occupancy: every
    // merged-away leaf costs it one entry
    let delete_count = (internal_children_cap() / 2 + 2) * leaf_records_cap();
    for _ in 0..delete_count {
        let tx = Transaction::new();
        let victim = table.iterator(&tx).next().unwrap();
        table.delete_tuple(&tx, &victim).unwrap();
        tx.commit().unwrap();
    }

    table.draw_tree(2);
    table.check_integrity(true);
    assert_eq!(table.tuples_count(), rows - delete_count);
}

#[test]
fn test_merge_internal_pages() {
    let _ctx = setup();

    BufferPool::set_page_size(512);

    // two packed subtrees under the root
    let rows = 2 * internal_children_cap() * leaf_records_cap();
    let table = new_random_btree_table(2, rows, None, 0, TreeLayout::LastTwoEvenlyDistributed);
    table.check_integrity(true);

    // delete past the point where the two second-tier pages can merge;
    // the merged page replaces the old root
    let target = internal_children_cap() * leaf_records_cap() / 2;
    let mut remaining = rows;
    while remaining > target {
        let tx = Transaction::new();
        let victim = table.iterator(&tx).next().unwrap();
        table.delete_tuple(&tx, &victim).unwrap();
        tx.commit().unwrap();
        remaining -= 1;
    }

    table.check_integrity(true);

    // the tree is two levels again: the root's children are leaves
    let tx = Transaction::new();
    let root_pid = table.get_root_pid(&tx).unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);
    let root_rc = Database::buffer_pool()
        .get_internal_page(&tx, Permission::ReadOnly, &root_pid)
        .unwrap();
    assert_eq!(
        root_rc.rl().get_first_child_pid().category,
        PageCategory::Leaf
    );
    tx.commit().unwrap();
}
