use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::{
    buffer_pool::BufferPool, catalog::Catalog, transaction::ConcurrentStatus,
    utils::HandyRwLock,
};

static DATABASE: Lazy<Database> = Lazy::new(Database::new);

/// The process-wide engine context: catalog, buffer pool and lock
/// manager.
///
/// The buffer pool is internally concurrent and is handed out as a plain
/// reference; the catalog and the lock manager serialize behind RwLocks,
/// reached through the typed accessors below.
pub struct Database {
    catalog: RwLock<Catalog>,
    buffer_pool: BufferPool,
    concurrent_status: RwLock<ConcurrentStatus>,
}

impl Database {
    fn new() -> Self {
        Self {
            catalog: RwLock::new(Catalog::new()),
            buffer_pool: BufferPool::new(),
            concurrent_status: RwLock::new(ConcurrentStatus::new()),
        }
    }

    pub fn global() -> &'static Self {
        &DATABASE
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }

    pub fn buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn concurrent_status() -> RwLockReadGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.rl()
    }

    pub fn mut_concurrent_status() -> RwLockWriteGuard<'static, ConcurrentStatus> {
        Self::global().concurrent_status.wl()
    }

    /// Drop all cached and lock state. Test scaffolding.
    pub fn reset() {
        Self::buffer_pool().clear();
        Self::mut_concurrent_status().clear();
    }
}
