//! Scatter search source
//!
//! The simple-select source: one search request scattered to every shard in
//! the topology, per-shard streams merged back by the requested ordering.
//! Requests go out one shard at a time; the sort-merge worker fan-out is
//! the only place the translator parallelizes.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::{QueryError, QueryResult};
use crate::query::operators::merge::StreamMerger;
use crate::search::{SearchContext, SearchRequest};
use crate::types::{Row, RowComparator};
use std::sync::Arc;
use tracing::debug;

/// Source stage scattering a search across all shards
pub struct ScatterSearchCursor {
    search: Arc<SearchContext>,
    request: SearchRequest,
    merger: Option<StreamMerger>,
    exhausted: bool,
}

impl ScatterSearchCursor {
    /// Build the scatter source; per-shard streams come back ordered by the
    /// request's sort and are merged with the same comparator
    pub fn new(search: Arc<SearchContext>, request: SearchRequest) -> Self {
        Self {
            search,
            request,
            merger: None,
            exhausted: false,
        }
    }

    fn open(&mut self, ctx: &mut ExecutionContext) -> QueryResult<()> {
        let client = self.search.client();
        let shards = self.search.topology().shards.clone();
        debug!(shards = shards.len(), "opening scatter search");

        let mut streams = Vec::with_capacity(shards.len());
        for shard in &shards {
            let stream = self
                .search
                .block_on(client.shard_search(shard, &self.request))?;
            ctx.stats.shard_requests += 1;
            streams.push(stream);
        }

        let comparator = RowComparator::new(self.request.sort.clone());
        self.merger = Some(StreamMerger::new(streams, comparator));
        Ok(())
    }
}

impl Cursor for ScatterSearchCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        if self.exhausted {
            return Ok(None);
        }
        if self.merger.is_none() {
            self.open(ctx)?;
        }
        let merger = self
            .merger
            .as_mut()
            .ok_or_else(|| QueryError::internal("scatter search opened without streams"))?;
        match merger.next_row()? {
            Some(row) => {
                ctx.stats.rows_merged += 1;
                Ok(Some(row))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if let Some(merger) = &mut self.merger {
            merger.close();
        }
        self.merger = None;
        self.exhausted = true;
    }

    fn name(&self) -> &'static str {
        "ScatterSearch"
    }
}
