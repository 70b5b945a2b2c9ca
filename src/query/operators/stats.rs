//! Global stats source
//!
//! Aggregates without grouping: one scatter/gather stats request to the
//! cluster, folded into a single output row. Averages are derived from the
//! merged sum and count partials so shard merging stays exact.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::search::{SearchContext, StatsRequest, StatsResponse};
use crate::types::{AggregateFunction, Row, Value};
use std::sync::Arc;

/// One aggregate column of the stats row
#[derive(Debug, Clone)]
pub struct StatsMetric {
    /// Aggregate function
    pub function: AggregateFunction,
    /// Field aggregated over; `*` with count means the whole document set
    pub field: String,
}

/// Source stage emitting exactly one row of global aggregates
pub struct GlobalStatsCursor {
    search: Arc<SearchContext>,
    request: StatsRequest,
    metrics: Vec<StatsMetric>,
    emitted: bool,
}

impl GlobalStatsCursor {
    /// Build the stats source
    pub fn new(search: Arc<SearchContext>, request: StatsRequest, metrics: Vec<StatsMetric>) -> Self {
        Self {
            search,
            request,
            metrics,
            emitted: false,
        }
    }

    fn build_row(&self, response: &StatsResponse) -> Row {
        let mut row = Row::new();
        for metric in &self.metrics {
            let column = metric.function.output_column(&metric.field);
            let value = if metric.field == "*" {
                // Only count is defined over the whole document set.
                Value::Int(response.doc_count as i64)
            } else {
                match response.fields.get(&metric.field) {
                    None => Value::Null,
                    Some(stats) => match metric.function {
                        AggregateFunction::Count => Value::Int(stats.count as i64),
                        AggregateFunction::Sum => Value::Float(stats.sum),
                        AggregateFunction::Avg => {
                            if stats.count == 0 {
                                Value::Null
                            } else {
                                Value::Float(stats.sum / stats.count as f64)
                            }
                        }
                        AggregateFunction::Min => stats.min.clone().unwrap_or(Value::Null),
                        AggregateFunction::Max => stats.max.clone().unwrap_or(Value::Null),
                    },
                }
            };
            row.set(column, value);
        }
        row
    }
}

impl Cursor for GlobalStatsCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;

        let client = self.search.client();
        let response = self.search.block_on(client.stats(&self.request))?;
        ctx.stats.shard_requests += 1;
        Ok(Some(self.build_row(&response)))
    }

    fn close(&mut self) {
        self.emitted = true;
    }

    fn name(&self) -> &'static str {
        "GlobalStats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::stubs::StubIndex;
    use crate::types::ShardTopology;

    fn setup(docs: &[i64]) -> Arc<SearchContext> {
        let stub = Arc::new(StubIndex::new());
        for &size in docs {
            stub.add_document(Row::new().with("size", Value::Int(size)));
        }
        Arc::new(SearchContext::new(ShardTopology::single_node(1), stub).unwrap())
    }

    #[test]
    fn test_single_row_of_global_aggregates() {
        let search = setup(&[1, 2, 3, 10]);
        let request = StatsRequest {
            query: "*:*".into(),
            fields: vec!["size".into()],
        };
        let metrics = vec![
            StatsMetric {
                function: AggregateFunction::Count,
                field: "*".into(),
            },
            StatsMetric {
                function: AggregateFunction::Sum,
                field: "size".into(),
            },
            StatsMetric {
                function: AggregateFunction::Avg,
                field: "size".into(),
            },
            StatsMetric {
                function: AggregateFunction::Max,
                field: "size".into(),
            },
        ];
        let mut cursor = GlobalStatsCursor::new(search, request, metrics);
        let mut ctx = ExecutionContext::new();

        let row = cursor.next_row(&mut ctx).unwrap().unwrap();
        assert_eq!(row.get("count(*)"), Some(&Value::Int(4)));
        assert_eq!(row.get("sum(size)"), Some(&Value::Float(16.0)));
        assert_eq!(row.get("avg(size)"), Some(&Value::Float(4.0)));
        assert_eq!(row.get("max(size)"), Some(&Value::Int(10)));
        assert!(cursor.next_row(&mut ctx).unwrap().is_none());
    }

    #[test]
    fn test_stats_over_missing_field_is_null() {
        let search = setup(&[1]);
        let request = StatsRequest {
            query: "*:*".into(),
            fields: vec!["absent".into()],
        };
        let metrics = vec![StatsMetric {
            function: AggregateFunction::Avg,
            field: "absent".into(),
        }];
        let mut cursor = GlobalStatsCursor::new(search, request, metrics);
        let mut ctx = ExecutionContext::new();
        let row = cursor.next_row(&mut ctx).unwrap().unwrap();
        assert_eq!(row.get("avg(absent)"), Some(&Value::Null));
    }
}
