use crate::{
    error::DbError,
    operator::{exhausted_error, Op, OpIterator},
    page_id::PageID,
    storage::{
        schema::Schema,
        tuple::{Tuple, WrappedTuple},
    },
    types::DbResult,
};

/// Compares a field of the outer tuple against a field of the inner
/// tuple.
#[derive(Clone)]
pub struct JoinPredicate {
    pub field1: usize,
    pub op: Op,
    pub field2: usize,
}

impl JoinPredicate {
    pub fn new(field1: usize, op: Op, field2: usize) -> Self {
        Self { field1, op, field2 }
    }

    pub fn matches(&self, outer: &Tuple, inner: &Tuple) -> bool {
        self.op
            .compare(&outer.get_cell(self.field1), &inner.get_cell(self.field2))
    }
}

/// Nested-loop join: for each outer tuple, rewind the inner child and
/// emit the concatenation of every matching pair.
pub struct Join {
    predicate: JoinPredicate,
    outer: Box<dyn OpIterator>,
    inner: Box<dyn OpIterator>,
    schema: Schema,

    current_outer: Option<WrappedTuple>,
    next_tuple: Option<WrappedTuple>,
}

impl Join {
    pub fn new(
        predicate: JoinPredicate,
        outer: Box<dyn OpIterator>,
        inner: Box<dyn OpIterator>,
    ) -> Self {
        let schema = Schema::merge(outer.get_schema(), inner.get_schema());
        Self {
            predicate,
            outer,
            inner,
            schema,
            current_outer: None,
            next_tuple: None,
        }
    }

    fn fetch_next(&mut self) -> Result<Option<WrappedTuple>, DbError> {
        loop {
            if self.current_outer.is_none() {
                if !self.outer.has_next()? {
                    return Ok(None);
                }
                self.current_outer = Some(self.outer.next()?);
                self.inner.rewind()?;
            }

            let outer = self.current_outer.as_ref().unwrap().get_tuple().clone();
            while self.inner.has_next()? {
                let inner = self.inner.next()?;
                if self.predicate.matches(&outer, &inner) {
                    let merged = Tuple::merge(&outer, &inner);
                    return Ok(Some(WrappedTuple::new(merged, 0, PageID::empty())));
                }
            }

            // inner exhausted for this outer tuple
            self.current_outer = None;
        }
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> DbResult {
        self.current_outer = None;
        self.next_tuple = None;
        self.outer.open()?;
        self.inner.open()
    }

    fn close(&mut self) -> DbResult {
        self.current_outer = None;
        self.next_tuple = None;
        self.outer.close()?;
        self.inner.close()
    }

    fn rewind(&mut self) -> DbResult {
        self.current_outer = None;
        self.next_tuple = None;
        self.outer.rewind()?;
        self.inner.rewind()
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
        &self.schema
    }
}
