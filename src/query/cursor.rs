//! Pull-based cursor infrastructure
//!
//! The planner assembles a chain of operators and returns a [`QueryCursor`];
//! nothing fetches until pulled. Closing the cursor releases every
//! operator's resources on all exit paths (clean exhaustion, failure, and
//! cooperative cancellation), and dropping it closes it too, so resources
//! follow scope.

use crate::query::error::{QueryError, QueryResult};
use crate::types::Row;

/// Common interface for all cursor stages
///
/// Stages implement a pull model: each `next_row` call may pull from the
/// stage's input(s) and must propagate `close` to them. `close` is
/// idempotent; it is called on every exit path, including construction-time
/// failures of downstream stages.
pub trait Cursor: Send {
    /// Pull the next row
    ///
    /// Returns `Ok(Some(row))` while data remains, `Ok(None)` at end of
    /// stream, or `Err` for a terminal failure.
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>>;

    /// Release this stage's resources and those of its inputs
    fn close(&mut self);

    /// Stage name for debugging and tracing
    fn name(&self) -> &'static str;
}

/// Statistics collected while a query context executes
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStats {
    /// Rows handed to the client cursor
    pub rows_pulled: u64,
    /// Requests issued to the index boundary
    pub shard_requests: u64,
    /// Rows consumed by merge stages
    pub rows_merged: u64,
    /// Grouped results fetched from the index
    pub groups_fetched: u64,
}

/// Context threaded through every pull
///
/// Owns the cancellation flag and execution statistics. No state in here is
/// shared across query contexts; each context owns its own.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    cancelled: bool,
    /// Execution statistics, updated by stages as they work
    pub stats: ExecutionStats,
}

impl ExecutionContext {
    /// Fresh context
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cooperative cancellation
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Fail the current pull if cancellation was requested
    pub fn check_active(&self) -> QueryResult<()> {
        if self.cancelled {
            Err(QueryError::cancelled("query cancelled"))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Active,
    Done,
    Failed,
}

/// Client-facing result cursor owning the operator chain
///
/// Exhaustion, failure, and cancellation all close the chain exactly once;
/// after a failure the cursor stays in a terminal error state.
pub struct QueryCursor {
    root: Box<dyn Cursor>,
    ctx: ExecutionContext,
    columns: Vec<String>,
    state: CursorState,
    closed: bool,
}

impl QueryCursor {
    /// Wrap an assembled operator chain
    pub(crate) fn new(root: Box<dyn Cursor>, columns: Vec<String>) -> Self {
        Self {
            root,
            ctx: ExecutionContext::new(),
            columns,
            state: CursorState::Active,
            closed: false,
        }
    }

    /// Pull the next result row
    pub fn next_row(&mut self) -> QueryResult<Option<Row>> {
        match self.state {
            CursorState::Done => return Ok(None),
            CursorState::Failed => {
                return Err(QueryError::execution("cursor is in a terminal error state"))
            }
            CursorState::Active => {}
        }

        match self.root.next_row(&mut self.ctx) {
            Ok(Some(row)) => {
                self.ctx.stats.rows_pulled += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                self.state = CursorState::Done;
                self.close_chain();
                Ok(None)
            }
            Err(err) => {
                self.state = CursorState::Failed;
                self.close_chain();
                Err(err)
            }
        }
    }

    /// Columns of the result, in presentation order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Execution statistics so far
    pub fn stats(&self) -> &ExecutionStats {
        &self.ctx.stats
    }

    /// Request cooperative cancellation; the next pull fails with
    /// `Cancelled` and releases the chain
    pub fn cancel(&mut self) {
        self.ctx.cancel();
    }

    /// Release all operator resources now
    pub fn close(&mut self) {
        if self.state == CursorState::Active {
            self.state = CursorState::Done;
        }
        self.close_chain();
    }

    fn close_chain(&mut self) {
        if !self.closed {
            self.closed = true;
            self.root.close();
        }
    }
}

impl Drop for QueryCursor {
    fn drop(&mut self) {
        self.close_chain();
    }
}

impl std::fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCursor")
            .field("root", &self.root.name())
            .field("state", &self.state)
            .field("columns", &self.columns)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FixedCursor {
        rows: Vec<Row>,
        at: usize,
        fail_after: Option<usize>,
        closed: Arc<AtomicBool>,
    }

    impl Cursor for FixedCursor {
        fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
            ctx.check_active()?;
            if let Some(n) = self.fail_after {
                if self.at >= n {
                    return Err(QueryError::execution("boom"));
                }
            }
            let row = self.rows.get(self.at).cloned();
            self.at += 1;
            Ok(row)
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| Row::new().with("i", Value::Int(i as i64)))
            .collect()
    }

    #[test]
    fn test_cursor_closes_on_exhaustion() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut cursor = QueryCursor::new(
            Box::new(FixedCursor {
                rows: rows(2),
                at: 0,
                fail_after: None,
                closed: Arc::clone(&closed),
            }),
            vec!["i".into()],
        );
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_none());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(cursor.stats().rows_pulled, 2);
        // Exhausted cursors keep answering end-of-stream.
        assert!(cursor.next_row().unwrap().is_none());
    }

    #[test]
    fn test_cursor_failure_is_terminal_and_closes() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut cursor = QueryCursor::new(
            Box::new(FixedCursor {
                rows: rows(5),
                at: 0,
                fail_after: Some(1),
                closed: Arc::clone(&closed),
            }),
            vec!["i".into()],
        );
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().is_err());
        assert!(closed.load(Ordering::SeqCst));
        // Terminal error state persists.
        assert!(cursor.next_row().is_err());
    }

    #[test]
    fn test_cancel_fails_next_pull_and_closes() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut cursor = QueryCursor::new(
            Box::new(FixedCursor {
                rows: rows(5),
                at: 0,
                fail_after: None,
                closed: Arc::clone(&closed),
            }),
            vec!["i".into()],
        );
        assert!(cursor.next_row().unwrap().is_some());
        cursor.cancel();
        let err = cursor.next_row().unwrap_err();
        assert_eq!(err.kind, crate::query::error::QueryErrorKind::Cancelled);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_closes_chain() {
        let closed = Arc::new(AtomicBool::new(false));
        {
            let _cursor = QueryCursor::new(
                Box::new(FixedCursor {
                    rows: rows(5),
                    at: 0,
                    fail_after: None,
                    closed: Arc::clone(&closed),
                }),
                vec!["i".into()],
            );
        }
        assert!(closed.load(Ordering::SeqCst));
    }
}
