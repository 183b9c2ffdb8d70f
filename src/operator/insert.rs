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

/// One-shot write operator: drains its child into the target table and
/// yields a single one-field tuple holding the insert count.
pub struct Insert {
    tx: Transaction,
    table_id: u32,
    child: Box<dyn OpIterator>,
    schema: Schema,

    open: bool,
    done: bool,
}

impl Insert {
    pub fn new(tx: &Transaction, table_id: u32, child: Box<dyn OpIterator>) -> Result<Self, DbError> {
        let table_schema = Database::catalog()
            .get_schema(&table_id)
            .ok_or_else(|| DbError::new(&format!("table {} not found", table_id)))?;
        if &table_schema != child.get_schema() {
            return Err(DbError::invalid_argument(
                "child schema does not match the target table",
            ));
        }

        Ok(Self {
            tx: *tx,
            table_id,
            child,
            schema: small_int_schema(1, "inserted"),
            open: false,
            done: false,
        })
    }

    fn drain(&mut self) -> Result<WrappedTuple, DbError> {
        let mut count = 0;
        while self.child.has_next()? {
            let t = self.child.next()?;
            Database::buffer_pool()
                .insert_tuple(&self.tx, self.table_id, t.get_tuple())?;
            count += 1;
        }

        let tuple = Tuple::new_from_cells(&[Cell::Int32(count)]);
        Ok(WrappedTuple::new(tuple, 0, PageID::empty()))
    }
}

impl OpIterator for Insert {
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
        // the writes already happened; rewinding does not repeat them
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
