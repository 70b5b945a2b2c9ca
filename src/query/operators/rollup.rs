//! Rollup aggregation over a sorted stream
//!
//! The aggregate half of sort-merge mode: the merged input is globally
//! sorted by the grouping key, so each equal-key run folds into one output
//! row carrying the grouping fields, the implicit `count(*)`, and one
//! column per requested aggregate. Like the other sorted-stream stages it
//! verifies the sort precondition and fails fast on regression.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::{QueryError, QueryResult};
use crate::types::{AggregateFunction, Row, RowComparator, Value};
use std::cmp::Ordering;

/// One aggregate computed per group
#[derive(Debug, Clone)]
pub struct RollupMetric {
    /// Aggregate function
    pub function: AggregateFunction,
    /// Field aggregated over (`*` only for count)
    pub field: String,
}

impl RollupMetric {
    fn output_column(&self) -> String {
        self.function.output_column(&self.field)
    }
}

/// Accumulator for one metric within one group
#[derive(Debug, Default)]
struct MetricState {
    count: u64,
    sum: f64,
    min: Option<Value>,
    max: Option<Value>,
}

impl MetricState {
    fn fold(&mut self, value: Option<&Value>) {
        let Some(value) = value else { return };
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Some(n) = value.as_f64() {
            self.sum += n;
        }
        match &self.min {
            None => self.min = Some(value.clone()),
            Some(m) if value.compare(m) == Ordering::Less => self.min = Some(value.clone()),
            _ => {}
        }
        match &self.max {
            None => self.max = Some(value.clone()),
            Some(m) if value.compare(m) == Ordering::Greater => self.max = Some(value.clone()),
            _ => {}
        }
    }

    fn finish(&self, function: AggregateFunction) -> Value {
        match function {
            AggregateFunction::Count => Value::Int(self.count as i64),
            AggregateFunction::Sum => Value::Float(self.sum),
            AggregateFunction::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Float(self.sum / self.count as f64)
                }
            }
            AggregateFunction::Min => self.min.clone().unwrap_or(Value::Null),
            AggregateFunction::Max => self.max.clone().unwrap_or(Value::Null),
        }
    }
}

/// Stage folding equal-key runs of a sorted stream into aggregate rows
pub struct RollupCursor {
    input: Box<dyn Cursor>,
    key_fields: Vec<String>,
    comparator: RowComparator,
    metrics: Vec<RollupMetric>,
    /// First row of the next group, pulled while closing out the previous one
    pending: Option<Row>,
    exhausted: bool,
}

impl RollupCursor {
    /// Roll `input` up by `key_fields`, computing `metrics` per group
    pub fn new(input: Box<dyn Cursor>, key_fields: Vec<String>, metrics: Vec<RollupMetric>) -> Self {
        let comparator = RowComparator::ascending(&key_fields);
        Self {
            input,
            key_fields,
            comparator,
            metrics,
            pending: None,
            exhausted: false,
        }
    }

    fn emit_group(&self, head: &Row, group_count: u64, states: &[MetricState]) -> Row {
        let mut row = Row::new();
        for field in &self.key_fields {
            row.set(
                field.clone(),
                head.get(field).cloned().unwrap_or(Value::Null),
            );
        }
        row.set("count(*)", Value::Int(group_count as i64));
        for (metric, state) in self.metrics.iter().zip(states) {
            row.set(metric.output_column(), state.finish(metric.function));
        }
        row
    }
}

impl Cursor for RollupCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.exhausted {
            return Ok(None);
        }

        let head = match self.pending.take() {
            Some(row) => row,
            None => match self.input.next_row(ctx)? {
                Some(row) => row,
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
            },
        };

        let mut states: Vec<MetricState> =
            self.metrics.iter().map(|_| MetricState::default()).collect();
        let mut group_count = 1u64;
        fold_row(&self.metrics, &mut states, &head);

        loop {
            match self.input.next_row(ctx)? {
                None => {
                    self.exhausted = true;
                    return Ok(Some(self.emit_group(&head, group_count, &states)));
                }
                Some(row) => match self.comparator.compare(&row, &head) {
                    Ordering::Equal => {
                        fold_row(&self.metrics, &mut states, &row);
                        group_count += 1;
                    }
                    Ordering::Greater => {
                        self.pending = Some(row);
                        return Ok(Some(self.emit_group(&head, group_count, &states)));
                    }
                    Ordering::Less => {
                        return Err(QueryError::internal(
                            "rollup input is not sorted by the grouping key",
                        ))
                    }
                },
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.pending = None;
        self.exhausted = true;
    }

    fn name(&self) -> &'static str {
        "Rollup"
    }
}

fn fold_row(metrics: &[RollupMetric], states: &mut [MetricState], row: &Row) {
    for (metric, state) in metrics.iter().zip(states.iter_mut()) {
        state.fold(row.get(&metric.field));
    }
}
