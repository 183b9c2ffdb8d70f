pub mod btree;
pub mod buffer_pool;
pub mod catalog;
pub mod database;
pub mod error;
pub mod heap;
pub mod io;
pub mod operator;
pub mod page_id;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;

pub use btree::table::{
    BTreeTable, BTreeTableIterator, BTreeTableReverseSearchIterator, BTreeTableSearchIterator,
};
pub use buffer_pool::BufferPool;
pub use catalog::{Catalog, Table};
pub use database::Database;
pub use error::{DbError, DbErrorKind};
pub use heap::{HeapTable, HeapTableIterator};
pub use operator::{Op, OpIterator, Predicate};
pub use storage::schema::{small_int_schema, Schema};
pub use storage::tuple::{Cell, Tuple, WrappedTuple};
pub use transaction::{Permission, Transaction};
