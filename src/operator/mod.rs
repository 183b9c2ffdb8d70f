use crate::{error::DbError, storage::schema::Schema, storage::tuple::WrappedTuple, types::DbResult};

mod aggregate;
mod delete;
mod filter;
mod index_scan;
mod insert;
mod join;
mod order_by;
mod predicate;
mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp, IntegerAggregator, StringAggregator};
pub use delete::Delete;
pub use filter::Filter;
pub use index_scan::{IndexScan, ScanDirection};
pub use insert::Insert;
pub use join::{Join, JoinPredicate};
pub use order_by::OrderBy;
pub use predicate::{Op, Predicate};
pub use seq_scan::SeqScan;

/// The pull capability every operator implements. `has_next`/`next` is
/// lazy pull; `rewind` restarts the stream; opening an operator opens its
/// children and closing closes them.
pub trait OpIterator {
    fn open(&mut self) -> DbResult;

    fn close(&mut self) -> DbResult;

    fn rewind(&mut self) -> DbResult;

    fn has_next(&mut self) -> Result<bool, DbError>;

    fn next(&mut self) -> Result<WrappedTuple, DbError>;

    fn get_schema(&self) -> &Schema;
}

pub(crate) fn not_open_error() -> DbError {
    DbError::invalid_argument("operator is not open")
}

pub(crate) fn exhausted_error() -> DbError {
    DbError::new("no more tuples")
}
