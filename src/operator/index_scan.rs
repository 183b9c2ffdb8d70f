use std::sync::Arc;

use crate::{
    btree::table::{BTreeTableReverseSearchIterator, BTreeTableSearchIterator},
    error::DbError,
    operator::{exhausted_error, not_open_error, OpIterator, Predicate},
    storage::{schema::Schema, tuple::WrappedTuple},
    transaction::Transaction,
    types::DbResult,
    BTreeTable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

enum SearchIter {
    Forward(BTreeTableSearchIterator),
    Reverse(BTreeTableReverseSearchIterator),
}

impl SearchIter {
    fn next(&mut self) -> Option<WrappedTuple> {
        match self {
            SearchIter::Forward(it) => it.next(),
            SearchIter::Reverse(it) => it.next(),
        }
    }
}

/// Scan of a B+ tree file restricted by a predicate on its key field,
/// in either key order. Uses the tree to skip the non-matching prefix
/// and stops as soon as no further match is possible.
pub struct IndexScan {
    tx: Transaction,
    table: Arc<BTreeTable>,
    predicate: Predicate,
    direction: ScanDirection,
    schema: Schema,

    iter: Option<SearchIter>,
    next_tuple: Option<WrappedTuple>,
}

impl IndexScan {
    pub fn new(
        tx: &Transaction,
        table: &Arc<BTreeTable>,
        predicate: &Predicate,
        direction: ScanDirection,
    ) -> Result<Self, DbError> {
        if predicate.field_index != table.key_field {
            return Err(DbError::invalid_argument(&format!(
                "index scan predicate must target the key field {}, got {}",
                table.key_field, predicate.field_index
            )));
        }

        Ok(Self {
            tx: *tx,
            table: Arc::clone(table),
            predicate: predicate.clone(),
            direction,
            schema: table.get_schema(),
            iter: None,
            next_tuple: None,
        })
    }

    fn make_iter(&self) -> SearchIter {
        match self.direction {
            ScanDirection::Forward => SearchIter::Forward(BTreeTableSearchIterator::new(
                &self.tx,
                &self.table,
                &self.predicate,
            )),
            ScanDirection::Reverse => SearchIter::Reverse(BTreeTableReverseSearchIterator::new(
                &self.tx,
                &self.table,
                &self.predicate,
            )),
        }
    }
}

impl OpIterator for IndexScan {
    fn open(&mut self) -> DbResult {
        self.iter = Some(self.make_iter());
        self.next_tuple = None;
        Ok(())
    }

    fn close(&mut self) -> DbResult {
        self.iter = None;
        self.next_tuple = None;
        Ok(())
    }

    fn rewind(&mut self) -> DbResult {
        if self.iter.is_none() {
            return Err(not_open_error());
        }
        self.open()
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        let iter = self.iter.as_mut().ok_or_else(not_open_error)?;
        if self.next_tuple.is_none() {
            self.next_tuple = iter.next();
        }
        Ok(self.next_tuple.is_some())
    }

    fn next(&mut self) -> Result<WrappedTuple, DbError> {
        if !self.has_next()? {
            return Err(exhausted_error());
        }
        Ok(self.next_tuple.take().unwrap())
    }

    fn get_schema(&self) -> &Schema {
        &self.schema
    }
}
