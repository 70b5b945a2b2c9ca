//! Top-K ranking stage
//!
//! Re-ranks a stream by the requested ordering when that ordering differs
//! from the order the stream naturally arrives in. Collects the input,
//! sorts it, and truncates to K when a limit is known; with no limit it is
//! a plain blocking sort. Inserted only when needed: a requested ordering
//! that matches the grouping-field order skips straight to the limit stage.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::types::{Row, RowComparator};
use std::collections::VecDeque;

/// Stage sorting its input by a comparator, keeping at most K rows
pub struct TopKCursor {
    input: Box<dyn Cursor>,
    comparator: RowComparator,
    k: Option<usize>,
    ranked: Option<VecDeque<Row>>,
}

impl TopKCursor {
    /// Rank `input` by `comparator`, truncating to `k` rows when given
    pub fn new(input: Box<dyn Cursor>, comparator: RowComparator, k: Option<usize>) -> Self {
        Self {
            input,
            comparator,
            k,
            ranked: None,
        }
    }

    fn collect_and_rank(&mut self, ctx: &mut ExecutionContext) -> QueryResult<VecDeque<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.input.next_row(ctx)? {
            rows.push(row);
        }
        rows.sort_by(|a, b| self.comparator.compare(a, b));
        if let Some(k) = self.k {
            rows.truncate(k);
        }
        Ok(rows.into())
    }
}

impl Cursor for TopKCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.ranked.is_none() {
            let ranked = self.collect_and_rank(ctx)?;
            self.ranked = Some(ranked);
        }
        Ok(self.ranked.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self) {
        self.input.close();
        self.ranked = Some(VecDeque::new());
    }

    fn name(&self) -> &'static str {
        "TopK"
    }
}
