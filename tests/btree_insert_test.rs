use tiny_db::{
    transaction::Transaction,
    utils::{ceil_div, HandyRwLock},
    BufferPool,
};

mod test_utils;
use test_utils::{
    leaf_records_cap, new_empty_btree_table, new_random_btree_table, setup, TreeLayout,
};

#[test]
fn test_insert_tuple() {
    let _ctx = setup();

    // create an empty B+ tree file keyed on the second field of a
    // 2-field tuple
    let table = new_empty_btree_table(2, 1);
    let tx = Transaction::new();

    let mut insert_value = 0;

    // fill up the first page until it splits
    for _ in 0..leaf_records_cap() {
        let tuple = tiny_db::Tuple::new_int_tuple(insert_value, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
        insert_value += 1;
        assert_eq!(1, table.pages_count());
    }

    // the next half page of tuples lives on page 2 since they are
    // greater than all existing tuples in the file
    for _ in 0..leaf_records_cap() / 2 + 1 {
        let tuple = tiny_db::Tuple::new_int_tuple(insert_value, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
        insert_value += 1;

        // 1 internal page + 2 leaf pages
        assert_eq!(3, table.pages_count());
    }

    // one more insert makes the second leaf page split
    let tuple = tiny_db::Tuple::new_int_tuple(insert_value, 2);
    table.insert_tuple(&tx, &tuple).unwrap();

    // 1 internal page + 3 leaf pages
    assert_eq!(4, table.pages_count());

    // the records must come back sorted on the key field
    let mut previous = None;
    let mut count = 0;
    for tuple in table.iterator(&tx) {
        let key = tuple.get_cell(1);
        if let Some(previous) = &previous {
            assert!(previous <= &key);
        }
        previous = Some(key);
        count += 1;
    }
    assert_eq!(count, insert_value as usize + 1);

    tx.commit().unwrap();
    table.check_integrity(true);
}

#[test]
fn test_insert_duplicate_tuples() {
    let _ctx = setup();

    let table = new_empty_btree_table(2, 0);
    let tx = Transaction::new();

    // a couple of pages of identical keys must not break navigation
    let repeat = leaf_records_cap() * 2 + 10;
    for _ in 0..repeat {
        let tuple = tiny_db::Tuple::new_int_tuple(42, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
    }

    assert_eq!(table.iterator(&tx).count(), repeat);
    tx.commit().unwrap();
    table.check_integrity(false);
}

#[test]
fn test_split_propagates_to_new_root() {
    let _ctx = setup();

    // small pages force a three-level tree out of a modest row count
    BufferPool::set_page_size(512);

    let rows = 4000;
    let table = new_empty_btree_table(2, 0);
    let tx = Transaction::new();
    for value in 0..rows {
        let tuple = tiny_db::Tuple::new_int_tuple(value, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
    }

    // the root must be an internal page whose children are internal
    // pages themselves
    let root_pid = table.get_root_pid(&tx).unwrap();
    assert_eq!(root_pid.category, tiny_db::page_id::PageCategory::Internal);
    let root_rc = tiny_db::Database::buffer_pool()
        .get_internal_page(&tx, tiny_db::Permission::ReadOnly, &root_pid)
        .unwrap();
    assert_eq!(
        root_rc.rl().get_first_child_pid().category,
        tiny_db::page_id::PageCategory::Internal
    );

    // iteration yields 0..rows in order
    let mut expected = 0;
    for tuple in table.iterator(&tx) {
        assert_eq!(tuple.get_cell(0).get_int32(), expected);
        expected += 1;
    }
    assert_eq!(expected, rows);

    tx.commit().unwrap();
    table.check_integrity(true);
}

#[test]
fn test_insert_into_random_table() {
    let _ctx = setup();

    let mut rows: Vec<Vec<i32>> = Vec::new();
    let table = new_random_btree_table(2, 1000, Some(&mut rows), 0, TreeLayout::Naturally);

    table.check_integrity(true);
    assert_eq!(table.tuples_count(), 1000);

    // half a page of new inserts keeps the tree consistent
    let tx = Transaction::new();
    for value in 0..ceil_div(leaf_records_cap(), 2) {
        let tuple = tiny_db::Tuple::new_int_tuple(value as i32, 2);
        table.insert_tuple(&tx, &tuple).unwrap();
    }
    tx.commit().unwrap();

    table.check_integrity(true);
    assert_eq!(
        table.tuples_count(),
        1000 + ceil_div(leaf_records_cap(), 2)
    );
}
