use std::{
    sync::{Arc, Barrier},
    thread,
};

use log::debug;
use rand::Rng;
use tiny_db::{
    btree::table::BTreeTableSearchIterator,
    page_id::{PageCategory, PageID},
    transaction::Transaction,
    BTreeTable, Cell, Database, Op, Permission, Predicate, Tuple,
};

mod test_utils;
use test_utils::{new_random_btree_table, new_random_heap_table, setup, TreeLayout};

/// Insert one random tuple, retrying when the transaction is picked as a
/// deadlock victim.
fn inserter(table: &Arc<BTreeTable>, s: &crossbeam::channel::Sender<i32>) {
    let value = rand::thread_rng().gen_range(i32::MIN, i32::MAX);
    let tuple = Tuple::new_int_tuple(value, 2);

    loop {
        let tx = Transaction::new();
        match table.insert_tuple(&tx, &tuple) {
            Ok(()) => {
                tx.commit().unwrap();
                break;
            }
            Err(e) => {
                debug!("insert aborted, retrying: {}", e);
                tx.abort().unwrap();
            }
        }
    }

    s.send(value).unwrap();
}

/// Delete one previously inserted tuple, found through the index.
fn deleter(table: &Arc<BTreeTable>, r: &crossbeam::channel::Receiver<i32>) {
    let value = r.recv().unwrap();
    let predicate = Predicate::new(0, Op::Equals, &Cell::Int32(value));

    loop {
        let tx = Transaction::new();
        let result = (|| {
            let mut it = BTreeTableSearchIterator::new(&tx, table, &predicate);
            match it.next() {
                Some(tuple) => table.delete_tuple(&tx, &tuple),
                // a duplicate of this value was already removed
                None => Ok(()),
            }
        })();

        match result {
            Ok(()) => {
                tx.commit().unwrap();
                break;
            }
            Err(e) => {
                debug!("delete aborted, retrying: {}", e);
                tx.abort().unwrap();
            }
        }
    }
}

#[test]
fn test_concurrent_inserts() {
    let _ctx = setup();

    let row_count = 1000;
    let table = new_random_btree_table(2, row_count, None, 0, TreeLayout::EvenlyDistributed);
    table.check_integrity(true);

    let (sender, receiver) = crossbeam::channel::unbounded();

    let mut handles = vec![];
    for _ in 0..50 {
        let local_table = Arc::clone(&table);
        let local_sender = sender.clone();
        handles.push(thread::spawn(move || inserter(&local_table, &local_sender)));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(receiver.len(), 50);
    assert_eq!(table.tuples_count(), row_count + 50);
    table.check_integrity(true);
}

#[test]
fn test_concurrent_inserts_and_deletes() {
    let _ctx = setup();

    let row_count = 1000;
    let table = new_random_btree_table(2, row_count, None, 0, TreeLayout::EvenlyDistributed);

    let (sender, receiver) = crossbeam::channel::unbounded();

    // a wave of inserts, then a wave of deletes draining the channel
    let mut handles = vec![];
    for _ in 0..30 {
        let local_table = Arc::clone(&table);
        let local_sender = sender.clone();
        handles.push(thread::spawn(move || inserter(&local_table, &local_sender)));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut handles = vec![];
    for _ in 0..30 {
        let local_table = Arc::clone(&table);
        let local_receiver = receiver.clone();
        handles.push(thread::spawn(move || deleter(&local_table, &local_receiver)));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.tuples_count(), row_count);
    table.check_integrity(true);
}

/// A transaction holding a shared latch alone on a page upgrades it in
/// place.
#[test]
fn test_lock_upgrade() {
    let _ctx = setup();

    let table = new_random_heap_table(2, 1000, None);
    let pid = PageID::new(PageCategory::Heap, table.get_id(), 0);

    let tx = Transaction::new();
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadOnly, &pid)
        .unwrap();
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadWrite, &pid)
        .unwrap();
    tx.commit().unwrap();
}

/// Two transactions taking two pages in opposite order: one becomes the
/// deadlock victim, the other finishes once the victim's locks are gone.
#[test]
fn test_deadlock_detection() {
    let _ctx = setup();

    let table = new_random_heap_table(2, 1000, None);
    let table_id = table.get_id();
    assert!(table.pages_count() >= 2);

    let barrier = Arc::new(Barrier::new(2));

    let mut handles = vec![];
    for (first, second) in [(0u32, 1u32), (1u32, 0u32)].iter() {
        let barrier = Arc::clone(&barrier);
        let first = *first;
        let second = *second;

        handles.push(thread::spawn(move || {
            let tx = Transaction::new();
            let first_pid = PageID::new(PageCategory::Heap, table_id, first);
            let second_pid = PageID::new(PageCategory::Heap, table_id, second);

            Database::buffer_pool()
                .get_heap_page(&tx, Permission::ReadWrite, &first_pid)
                .unwrap();

            // both threads hold their first page before crossing over
            barrier.wait();

            match Database::buffer_pool().get_heap_page(&tx, Permission::ReadWrite, &second_pid)
            {
                Ok(_) => {
                    tx.commit().unwrap();
                    false
                }
                Err(e) => {
                    assert!(e.is_aborted(), "unexpected error kind: {}", e);
                    tx.abort().unwrap();
                    true
                }
            }
        }));
    }

    let aborted: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let abort_count = aborted.iter().filter(|a| **a).count();

    // exactly one of the two requests is the victim
    assert_eq!(abort_count, 1, "aborted: {:?}", aborted);
}
