//! Pushdown grouped aggregation source
//!
//! One faceted aggregation request per query, overfetched beyond the final
//! limit so downstream having-filtering and re-ranking have candidates to
//! discard before truncation. Groups arrive in the index's natural
//! per-group order and are emitted as-is.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::search::{FacetRequest, SearchContext};
use crate::types::Row;
use std::collections::VecDeque;
use std::sync::Arc;

/// Source stage emitting one row per fetched group
pub struct FacetGroupsCursor {
    search: Arc<SearchContext>,
    request: FacetRequest,
    buffered: Option<VecDeque<Row>>,
}

impl FacetGroupsCursor {
    /// Build the facet source; `request.limit` carries the overfetched
    /// group count
    pub fn new(search: Arc<SearchContext>, request: FacetRequest) -> Self {
        Self {
            search,
            request,
            buffered: None,
        }
    }
}

impl Cursor for FacetGroupsCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.buffered.is_none() {
            let client = self.search.client();
            let response = self.search.block_on(client.facet_groups(&self.request))?;
            ctx.stats.shard_requests += 1;
            ctx.stats.groups_fetched += response.groups.len() as u64;
            self.buffered = Some(response.groups.into());
        }
        Ok(self.buffered.as_mut().and_then(VecDeque::pop_front))
    }

    fn close(&mut self) {
        self.buffered = Some(VecDeque::new());
    }

    fn name(&self) -> &'static str {
        "FacetGroups"
    }
}
