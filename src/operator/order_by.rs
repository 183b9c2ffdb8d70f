use crate::{
    error::DbError,
    operator::{exhausted_error, not_open_error, OpIterator},
    storage::{schema::Schema, tuple::WrappedTuple},
    types::DbResult,
};

/// Materializes the child's output and yields it sorted by one field.
pub struct OrderBy {
    child: Box<dyn OpIterator>,
    field: usize,
    ascending: bool,

    tuples: Option<Vec<WrappedTuple>>,
    cursor: usize,
}

impl OrderBy {
    pub fn new(child: Box<dyn OpIterator>, field: usize, ascending: bool) -> Result<Self, DbError> {
        if field >= child.get_schema().fields_count() {
            return Err(DbError::invalid_argument(&format!(
                "order-by field {} out of range, child has {} fields",
                field,
                child.get_schema().fields_count()
            )));
        }

        Ok(Self {
            child,
            field,
            ascending,
            tuples: None,
            cursor: 0,
        })
    }

    fn materialize(&mut self) -> DbResult {
        let mut tuples = Vec::new();
        while self.child.has_next()? {
            tuples.push(self.child.next()?);
        }

        let field = self.field;
        tuples.sort_by(|a, b| a.get_cell(field).cmp(&b.get_cell(field)));
        if !self.ascending {
            tuples.reverse();
        }

        self.tuples = Some(tuples);
        self.cursor = 0;
        Ok(())
    }
}

impl OpIterator for OrderBy {
    fn open(&mut self) -> DbResult {
        self.child.open()?;
        self.materialize()
    }

    fn close(&mut self) -> DbResult {
        self.tuples = None;
        self.cursor = 0;
        self.child.close()
    }

    fn rewind(&mut self) -> DbResult {
        if self.tuples.is_none() {
            return Err(not_open_error());
        }
        self.cursor = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        let tuples = self.tuples.as_ref().ok_or_else(not_open_error)?;
        Ok(self.cursor < tuples.len())
    }

    fn next(&mut self) -> Result<WrappedTuple, DbError> {
        if !self.has_next()? {
            return Err(exhausted_error());
        }
        let tuple = self.tuples.as_ref().unwrap()[self.cursor].clone();
        self.cursor += 1;
        Ok(tuple)
    }

    fn get_schema(&self) -> &Schema {
        self.child.get_schema()
    }
}
