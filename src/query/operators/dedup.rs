//! Distributed duplicate elimination
//!
//! Distinct-over-grouping-fields for sort-merge mode: the input stream is
//! already globally sorted by the grouping key (or a compatible requested
//! ordering), so eliminating duplicates is a single-pass comparison against
//! the previously emitted key. The stage verifies the sort precondition as
//! it goes and fails fast when the input regresses.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::{QueryError, QueryResult};
use crate::types::{Row, RowComparator};
use std::cmp::Ordering;

/// Stage emitting the first row of each equal-key run
pub struct DedupCursor {
    input: Box<dyn Cursor>,
    comparator: RowComparator,
    last_emitted: Option<Row>,
}

impl DedupCursor {
    /// Deduplicate `input` by the given key fields (ascending key order)
    pub fn new(input: Box<dyn Cursor>, key_fields: &[String]) -> Self {
        Self {
            input,
            comparator: RowComparator::ascending(key_fields),
            last_emitted: None,
        }
    }

    /// Deduplicate with an explicit comparator (compatible requested order)
    pub fn with_comparator(input: Box<dyn Cursor>, comparator: RowComparator) -> Self {
        Self {
            input,
            comparator,
            last_emitted: None,
        }
    }
}

impl Cursor for DedupCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        loop {
            let Some(row) = self.input.next_row(ctx)? else {
                return Ok(None);
            };
            match &self.last_emitted {
                None => {
                    self.last_emitted = Some(row.clone());
                    return Ok(Some(row));
                }
                Some(previous) => match self.comparator.compare(&row, previous) {
                    Ordering::Equal => continue,
                    Ordering::Greater => {
                        self.last_emitted = Some(row.clone());
                        return Ok(Some(row));
                    }
                    Ordering::Less => {
                        return Err(QueryError::internal(
                            "duplicate elimination input is not sorted by the grouping key",
                        ))
                    }
                },
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.last_emitted = None;
    }

    fn name(&self) -> &'static str {
        "Dedup"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    struct FixedCursor {
        rows: Vec<Row>,
        at: usize,
    }

    impl Cursor for FixedCursor {
        fn next_row(&mut self, _ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
            let row = self.rows.get(self.at).cloned();
            self.at += 1;
            Ok(row)
        }

        fn close(&mut self) {}

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    fn owner_rows(owners: &[&str]) -> Box<dyn Cursor> {
        Box::new(FixedCursor {
            rows: owners
                .iter()
                .map(|o| Row::new().with("owner", Value::text(*o)))
                .collect(),
            at: 0,
        })
    }

    #[test]
    fn test_dedup_collapses_runs() {
        let keys = vec!["owner".to_string()];
        let mut dedup = DedupCursor::new(owner_rows(&["amy", "amy", "bob", "bob", "zoe"]), &keys);
        let mut ctx = ExecutionContext::new();
        let mut out = Vec::new();
        while let Some(row) = dedup.next_row(&mut ctx).unwrap() {
            out.push(row.get("owner").cloned().unwrap());
        }
        assert_eq!(
            out,
            vec![Value::text("amy"), Value::text("bob"), Value::text("zoe")]
        );
    }

    #[test]
    fn test_dedup_rejects_unsorted_input() {
        let keys = vec!["owner".to_string()];
        let mut dedup = DedupCursor::new(owner_rows(&["bob", "amy"]), &keys);
        let mut ctx = ExecutionContext::new();
        assert!(dedup.next_row(&mut ctx).unwrap().is_some());
        let err = dedup.next_row(&mut ctx).unwrap_err();
        assert_eq!(err.kind, crate::query::error::QueryErrorKind::Internal);
    }

    #[test]
    fn test_dedup_empty_input() {
        let keys = vec!["owner".to_string()];
        let mut dedup = DedupCursor::new(owner_rows(&[]), &keys);
        let mut ctx = ExecutionContext::new();
        assert!(dedup.next_row(&mut ctx).unwrap().is_none());
    }
}
