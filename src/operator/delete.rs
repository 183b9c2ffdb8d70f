use crate::{
    error::DbError,
    operator::{exhausted_error, not_open_error, OpIterator},
    page_id::PageID,
    storage::{
        schema::{small_int_schema, Schema},
        tuple::{Cell, Tuple, WrappedTuple},
    },
    transaction::Transaction,
    types::DbResult,
    Database,
};

/// Mirror of `Insert`: deletes every tuple produced by its child (located
/// through their record ids) and yields a single `(count)` tuple.
pub struct Delete {
    tx: Transaction,
    child: Box<dyn OpIterator>,
    schema: Schema,

    open: bool,
    done: bool,
}

impl Delete {
    pub fn new(tx: &Transaction, child: Box<dyn OpIterator>) -> Self {
        Self {
            tx: *tx,
            child,
            schema: small_int_schema(1, "deleted"),
            open: false,
            done: false,
        }
    }

    fn drain(&mut self) -> Result<WrappedTuple, DbError> {
        let mut count = 0;
        while self.child.has_next()? {
            let t = self.child.next()?;
            Database::buffer_pool().delete_tuple(&self.tx, &t)?;
            count += 1;
        }

        let tuple = Tuple::new_from_cells(&[Cell::Int32(count)]);
        Ok(WrappedTuple::new(tuple, 0, PageID::empty()))
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> DbResult {
        self.open = true;
        self.done = false;
        self.child.open()
    }

    fn close(&mut self) -> DbResult {
        self.open = false;
        self.child.close()
    }

    fn rewind(&mut self) -> DbResult {
        if !self.open {
            return Err(not_open_error());
        }
        self.child.rewind()
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if !self.open {
            return Err(not_open_error());
        }
        Ok(!self.done)
    }

    fn next(&mut self) -> Result<WrappedTuple, DbError> {
        if !self.has_next()? {
            return Err(exhausted_error());
        }
        self.done = true;
        self.drain()
    }

    fn get_schema(&self) -> &Schema {
        &self.schema
    }
}
