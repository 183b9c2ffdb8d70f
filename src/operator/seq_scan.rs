use std::sync::Arc;

use crate::{
    catalog::Table,
    error::DbError,
    heap::HeapTableIterator,
    operator::{exhausted_error, not_open_error, OpIterator},
    storage::{schema::Schema, tuple::WrappedTuple},
    transaction::Transaction,
    types::DbResult,
    BTreeTable, BTreeTableIterator, Database, HeapTable,
};

enum TableIter {
    Heap(HeapTableIterator),
    BTree(BTreeTableIterator),
}

impl TableIter {
    fn next(&mut self) -> Option<WrappedTuple> {
        match self {
            TableIter::Heap(it) => it.next(),
            TableIter::BTree(it) => it.next(),
        }
    }

    fn rewind(&mut self) {
        match self {
            TableIter::Heap(it) => it.rewind(),
            TableIter::BTree(it) => it.rewind(),
        }
    }
}

/// Full scan of a table, heap or B+ tree alike.
pub struct SeqScan {
    tx: Transaction,
    table: Table,
    schema: Schema,

    iter: Option<TableIter>,
    next_tuple: Option<WrappedTuple>,
}

impl SeqScan {
    pub fn new(tx: &Transaction, table_id: u32) -> Result<Self, DbError> {
        let table = Database::catalog()
            .get_table(&table_id)
            .ok_or_else(|| DbError::new(&format!("table {} not found", table_id)))?;
        let schema = table.get_schema();

        Ok(Self {
            tx: *tx,
            table,
            schema,
            iter: None,
            next_tuple: None,
        })
    }

    fn make_iter(&self) -> TableIter {
        match &self.table {
            Table::Heap(t) => {
                TableIter::Heap(HeapTableIterator::new(&self.tx, Arc::<HeapTable>::clone(t)))
            }
            Table::BTree(t) => {
                TableIter::BTree(BTreeTableIterator::new(&self.tx, &Arc::<BTreeTable>::clone(t)))
            }
        }
    }
}

impl OpIterator for SeqScan {
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
        match self.iter.as_mut() {
            Some(iter) => {
                iter.rewind();
                self.next_tuple = None;
                Ok(())
            }
            None => Err(not_open_error()),
        }
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
