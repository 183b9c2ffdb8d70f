use tiny_db::{
    page_id::{PageCategory, PageID},
    transaction::Transaction,
    Database, Permission,
};

mod test_utils;
use test_utils::{new_random_heap_table, setup};

#[test]
fn test_pool_caches_pages() {
    let _ctx = setup();

    let table = new_random_heap_table(2, 2000, None);
    Database::buffer_pool().clear();

    let tx = Transaction::new();
    assert_eq!(table.iterator(&tx).count(), 2000);
    let cached_after_first_scan = Database::buffer_pool().cached_pages_count();
    assert!(cached_after_first_scan > 0);

    // a second scan is served from the cache
    assert_eq!(table.iterator(&tx).count(), 2000);
    assert_eq!(
        Database::buffer_pool().cached_pages_count(),
        cached_after_first_scan
    );

    tx.commit().unwrap();
}

#[test]
fn test_eviction_keeps_pool_bounded() {
    let _ctx = setup();

    // ~2000 rows over 4 pages
    let table = new_random_heap_table(2, 2000, None);
    Database::buffer_pool().clear();
    Database::buffer_pool().set_capacity(2);

    // a read-only scan touches every page, evicting clean ones along
    // the way
    let tx = Transaction::new();
    assert_eq!(table.iterator(&tx).count(), 2000);
    assert!(Database::buffer_pool().cached_pages_count() <= 2);
    tx.commit().unwrap();
}

#[test]
fn test_no_steal_refuses_to_evict_dirty_pages() {
    let _ctx = setup();

    let table = new_random_heap_table(2, 2000, None);
    let pages = table.pages_count();
    assert!(pages >= 4);

    Database::buffer_pool().clear();
    Database::buffer_pool().set_capacity(2);

    // dirty two pages under one transaction; the pool is now full of
    // unevictable pages
    let tx = Transaction::new();
    for i in 0..2 {
        let pid = PageID::new(PageCategory::Heap, table.get_id(), i);
        Database::buffer_pool()
            .get_heap_page(&tx, Permission::ReadWrite, &pid)
            .unwrap();
        Database::mut_concurrent_status().set_dirty_page(&tx, &pid);
    }

    // loading a third page has nothing clean to evict
    let pid = PageID::new(PageCategory::Heap, table.get_id(), 2);
    let result = Database::buffer_pool().get_heap_page(&tx, Permission::ReadWrite, &pid);
    assert!(result.is_err());

    // aborting releases the dirty pages, after which the load succeeds
    tx.abort().unwrap();
    let tx = Transaction::new();
    Database::buffer_pool()
        .get_heap_page(&tx, Permission::ReadWrite, &pid)
        .unwrap();
    tx.commit().unwrap();
}
