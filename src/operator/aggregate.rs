use std::collections::HashMap;

use crate::{
    error::DbError,
    operator::{exhausted_error, not_open_error, OpIterator},
    page_id::PageID,
    storage::{
        schema::{FieldItem, Schema, Type},
        tuple::{Cell, Tuple, WrappedTuple},
    },
    types::DbResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

/// The single-pass aggregation capability: feed tuples in, read result
/// tuples out.
pub trait Aggregator {
    fn merge(&mut self, tuple: &Tuple);

    /// One result tuple per group: `(group, value)`, or `(value)` when
    /// not grouping.
    fn results(&self) -> Vec<Tuple>;
}

struct IntAggState {
    count: usize,
    sum: i64,
    min: i32,
    max: i32,
}

impl IntAggState {
    /// Seed the state from the first value of the group; no sentinel
    /// constants involved.
    fn first(value: i32) -> Self {
        Self {
            count: 1,
            sum: value as i64,
            min: value,
            max: value,
        }
    }

    fn absorb(&mut self, value: i32) {
        self.count += 1;
        self.sum += value as i64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn result(&self, op: AggregateOp) -> i32 {
        match op {
            AggregateOp::Min => self.min,
            AggregateOp::Max => self.max,
            AggregateOp::Sum => self.sum as i32,
            // the running sum divides at read time
            AggregateOp::Avg => (self.sum / self.count as i64) as i32,
            AggregateOp::Count => self.count as i32,
        }
    }
}

/// Aggregates an int field, grouped by an optional field (`None` = one
/// global group). Groups are reported in first-seen order.
pub struct IntegerAggregator {
    group_field: Option<usize>,
    agg_field: usize,
    op: AggregateOp,

    groups: HashMap<Option<Cell>, IntAggState>,
    group_order: Vec<Option<Cell>>,
}

impl IntegerAggregator {
    pub fn new(group_field: Option<usize>, agg_field: usize, op: AggregateOp) -> Self {
        Self {
            group_field,
            agg_field,
            op,
            groups: HashMap::new(),
            group_order: Vec::new(),
        }
    }
}

impl Aggregator for IntegerAggregator {
    fn merge(&mut self, tuple: &Tuple) {
        let group = self.group_field.map(|i| tuple.get_cell(i));
        let value = tuple.get_cell(self.agg_field).get_int32();

        match self.groups.get_mut(&group) {
            Some(state) => state.absorb(value),
            None => {
                self.group_order.push(group.clone());
                self.groups.insert(group, IntAggState::first(value));
            }
        }
    }

    fn results(&self) -> Vec<Tuple> {
        self.group_order
            .iter()
            .map(|group| {
                let value = Cell::Int32(self.groups[group].result(self.op));
                match group {
                    Some(g) => Tuple::new_from_cells(&[g.clone(), value]),
                    None => Tuple::new_from_cells(&[value]),
                }
            })
            .collect()
    }
}

/// Aggregates a string field; only COUNT is meaningful for strings.
pub struct StringAggregator {
    group_field: Option<usize>,

    counts: HashMap<Option<Cell>, usize>,
    group_order: Vec<Option<Cell>>,
}

impl StringAggregator {
    pub fn new(
        group_field: Option<usize>,
        _agg_field: usize,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        if op != AggregateOp::Count {
            return Err(DbError::invalid_argument(&format!(
                "string fields only support COUNT, got {:?}",
                op
            )));
        }

        Ok(Self {
            group_field,
            counts: HashMap::new(),
            group_order: Vec::new(),
        })
    }
}

impl Aggregator for StringAggregator {
    fn merge(&mut self, tuple: &Tuple) {
        let group = self.group_field.map(|i| tuple.get_cell(i));
        match self.counts.get_mut(&group) {
            Some(count) => *count += 1,
            None => {
                self.group_order.push(group.clone());
                self.counts.insert(group, 1);
            }
        }
    }

    fn results(&self) -> Vec<Tuple> {
        self.group_order
            .iter()
            .map(|group| {
                let value = Cell::Int32(self.counts[group] as i32);
                match group {
                    Some(g) => Tuple::new_from_cells(&[g.clone(), value]),
                    None => Tuple::new_from_cells(&[value]),
                }
            })
            .collect()
    }
}

/// Single-pass aggregation operator: drains its child on open, then
/// yields one tuple per group.
pub struct Aggregate {
    child: Box<dyn OpIterator>,
    agg_field: usize,
    group_field: Option<usize>,
    op: AggregateOp,
    schema: Schema,

    results: Option<Vec<Tuple>>,
    cursor: usize,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn OpIterator>,
        agg_field: usize,
        group_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, DbError> {
        let child_schema = child.get_schema().clone();
        if agg_field >= child_schema.fields_count() {
            return Err(DbError::invalid_argument(&format!(
                "aggregate field {} out of range, child has {} fields",
                agg_field,
                child_schema.fields_count()
            )));
        }
        if let Some(group_field) = group_field {
            if group_field >= child_schema.fields_count() {
                return Err(DbError::invalid_argument(&format!(
                    "group field {} out of range, child has {} fields",
                    group_field,
                    child_schema.fields_count()
                )));
            }
        }

        // result schema: (group, value) or (value)
        let value_field = FieldItem {
            t: Type::Int,
            name: format!("{:?}", op).to_lowercase(),
        };
        let fields = match group_field {
            Some(group_field) => vec![
                child_schema.get_field(group_field).clone(),
                value_field,
            ],
            None => vec![value_field],
        };

        Ok(Self {
            child,
            agg_field,
            group_field,
            op,
            schema: Schema::new(fields),
            results: None,
            cursor: 0,
        })
    }

    fn build(&mut self) -> DbResult {
        let mut aggregator: Box<dyn Aggregator> =
            match self.child.get_schema().get_field(self.agg_field).t {
                Type::Int => Box::new(IntegerAggregator::new(
                    self.group_field,
                    self.agg_field,
                    self.op,
                )),
                Type::Char => Box::new(StringAggregator::new(
                    self.group_field,
                    self.agg_field,
                    self.op,
                )?),
            };

        while self.child.has_next()? {
            let t = self.child.next()?;
            aggregator.merge(&t);
        }

        self.results = Some(aggregator.results());
        self.cursor = 0;
        Ok(())
    }
}

impl OpIterator for Aggregate {
    fn open(&mut self) -> DbResult {
        self.child.open()?;
        self.build()
    }

    fn close(&mut self) -> DbResult {
        self.results = None;
        self.cursor = 0;
        self.child.close()
    }

    fn rewind(&mut self) -> DbResult {
        if self.results.is_none() {
            return Err(not_open_error());
        }
        self.cursor = 0;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool, DbError> {
        let results = self.results.as_ref().ok_or_else(not_open_error)?;
        Ok(self.cursor < results.len())
    }

    fn next(&mut self) -> Result<WrappedTuple, DbError> {
        if !self.has_next()? {
            return Err(exhausted_error());
        }
        let tuple = self.results.as_ref().unwrap()[self.cursor].clone();
        self.cursor += 1;
        Ok(WrappedTuple::new(tuple, 0, PageID::empty()))
    }

    fn get_schema(&self) -> &Schema {
        &self.schema
    }
}
