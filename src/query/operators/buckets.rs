//! Time-series bucket source
//!
//! One range-bucketed aggregation request per query: the index buckets the
//! window by the grain gap and computes the sub-aggregates; this stage
//! rewrites each bucket into a result row keyed by the virtual grouping
//! column, with the bucket start rendered in the grain's display format.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::search::{SearchContext, TimeBucketRequest};
use crate::types::{Row, Value};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Source stage emitting one row per window bucket
pub struct TimeBucketsCursor {
    search: Arc<SearchContext>,
    request: TimeBucketRequest,
    /// Virtual grouping column the bucket key is published under
    group_column: String,
    /// Display format for bucket keys
    format: &'static str,
    buffered: Option<VecDeque<Row>>,
}

impl TimeBucketsCursor {
    /// Build the bucket source
    pub fn new(
        search: Arc<SearchContext>,
        request: TimeBucketRequest,
        group_column: String,
        format: &'static str,
    ) -> Self {
        Self {
            search,
            request,
            group_column,
            format,
            buffered: None,
        }
    }

    fn open(&mut self, ctx: &mut ExecutionContext) -> QueryResult<VecDeque<Row>> {
        let client = self.search.client();
        let response = self.search.block_on(client.time_buckets(&self.request))?;
        ctx.stats.shard_requests += 1;
        ctx.stats.groups_fetched += response.buckets.len() as u64;

        let mut rows = VecDeque::with_capacity(response.buckets.len());
        for bucket in response.buckets {
            let key = render_bucket_key(&bucket.start, self.format);
            let mut row = Row::new().with(self.group_column.clone(), Value::Text(key));
            row.set("count(*)", Value::Int(bucket.count as i64));
            for (column, value) in bucket.metrics {
                row.set(column, value);
            }
            rows.push_back(row);
        }
        Ok(rows)
    }
}

impl Cursor for TimeBucketsCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.buffered.is_none() {
            let rows = self.open(ctx)?;
            self.buffered = Some(rows);
        }
        Ok(self.buffered.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self) {
        self.buffered = Some(VecDeque::new());
    }

    fn name(&self) -> &'static str {
        "TimeBuckets"
    }
}

/// Render a bucket start instant in the grain's display format
///
/// Explicit window bounds can make the index return keys this translator
/// did not mint; an unparseable key passes through raw rather than failing
/// the whole series.
fn render_bucket_key(start: &str, format: &'static str) -> String {
    match DateTime::parse_from_rfc3339(start) {
        Ok(instant) => instant.with_timezone(&Utc).format(format).to_string(),
        Err(_) => {
            warn!(key = start, "bucket key is not an ISO-8601 instant");
            start.to_string()
        }
    }
}
