use crate::{
    error::DbError,
    operator::{exhausted_error, OpIterator, Predicate},
    storage::{schema::Schema, tuple::WrappedTuple},
    types::DbResult,
};

/// Yields the child tuples satisfying the predicate.
pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,

    next_tuple: Option<WrappedTuple>,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            next_tuple: None,
        }
    }

    fn fetch_next(&mut self) -> Result<Option<WrappedTuple>, DbError> {
        while self.child.has_next()? {
            let t = self.child.next()?;
            if self.predicate.matches(&t.get_cell(self.predicate.field_index)) {
                return Ok(Some(t));
            }
        }
        Ok(None)
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> DbResult {
        self.next_tuple = None;
        self.child.open()
    }

    fn close(&mut self) -> DbResult {
        self.next_tuple = None;
        self.child.close()
    }

    fn rewind(&mut self) -> DbResult {
        self.next_tuple = None;
        self.child.rewind()
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        if self.next_tuple.is_none() {
            self.next_tuple = self.fetch_next()?;
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
        self.child.get_schema()
    }
}
