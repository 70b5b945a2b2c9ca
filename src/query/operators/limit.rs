//! Limit stage
//!
//! Caps the number of rows a chain returns. Every strategy ends in one of
//! these when the descriptor carries a limit; it also stops pulling from
//! its input once the cap is reached, so upstream stages never do work for
//! rows nobody will see.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::types::Row;

/// Stage returning at most `limit` rows from its input
pub struct LimitCursor {
    input: Box<dyn Cursor>,
    limit: u64,
    returned: u64,
    exhausted: bool,
}

impl LimitCursor {
    /// Cap `input` at `limit` rows
    pub fn new(input: Box<dyn Cursor>, limit: u64) -> Self {
        Self {
            input,
            limit,
            returned: 0,
            exhausted: false,
        }
    }
}

impl Cursor for LimitCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.exhausted || self.returned >= self.limit {
            self.exhausted = true;
            return Ok(None);
        }
        match self.input.next_row(ctx)? {
            Some(row) => {
                self.returned += 1;
                if self.returned >= self.limit {
                    self.exhausted = true;
                }
                Ok(Some(row))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
        self.exhausted = true;
    }

    fn name(&self) -> &'static str {
        "Limit"
    }
}
