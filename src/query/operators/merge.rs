//! K-way sorted stream merge and the worker fan-out source
//!
//! A single merge stage repeatedly selects the least head among its input
//! streams per the active comparator. Every input stream must already be
//! sorted by the merge key; the merge checks that precondition per stream
//! and fails fast on violation, because a silently unsorted partition would
//! corrupt ordering for every stage downstream.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::{QueryError, QueryResult};
use crate::search::{Partition, SearchContext, SearchRequest, ShardStream};
use crate::types::{Row, RowComparator};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Incremental k-way merge over already-sorted shard streams
///
/// Not a cursor stage itself; the scatter and partition sources drive it.
pub struct StreamMerger {
    streams: Vec<ShardStream>,
    comparator: RowComparator,
    last_per_stream: Vec<Option<Row>>,
}

impl StreamMerger {
    /// Merge `streams`, each pre-sorted by `comparator`'s keys
    pub fn new(streams: Vec<ShardStream>, comparator: RowComparator) -> Self {
        let n = streams.len();
        Self {
            streams,
            comparator,
            last_per_stream: vec![None; n],
        }
    }

    /// Pull the next row in merged order
    pub fn next_row(&mut self) -> QueryResult<Option<Row>> {
        let mut least: Option<usize> = None;
        for i in 0..self.streams.len() {
            let head = self.streams[i].peek()?;
            let Some(head) = head else { continue };
            match least {
                None => least = Some(i),
                Some(current) => {
                    // peek() borrows mutably, so re-peek the current least.
                    let head = head.clone();
                    if let Some(current_head) = self.streams[current].peek()? {
                        if self.comparator.compare(&head, current_head) == Ordering::Less {
                            least = Some(i);
                        }
                    }
                }
            }
        }

        let Some(winner) = least else {
            return Ok(None);
        };
        let row = self.streams[winner]
            .next_row()?
            .ok_or_else(|| QueryError::internal("merge stream drained between peek and pull"))?;

        if let Some(previous) = &self.last_per_stream[winner] {
            if self.comparator.compare(&row, previous) == Ordering::Less {
                return Err(QueryError::internal(
                    "partition stream is not sorted by the merge key",
                ));
            }
        }
        self.last_per_stream[winner] = Some(row.clone());
        Ok(Some(row))
    }

    /// Drop all stream buffers
    pub fn close(&mut self) {
        self.streams.clear();
        self.last_per_stream.clear();
    }

    /// Number of input streams
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

/// Source stage fanning a search out across W key-space partitions
///
/// The only internal parallelism in the translator: the grouping-key space
/// is split across `workers` independent partition streams, requested
/// concurrently, then merged back single-threaded preserving order.
pub struct PartitionMergeCursor {
    search: Arc<SearchContext>,
    request: SearchRequest,
    keys: Vec<String>,
    workers: usize,
    comparator: RowComparator,
    merger: Option<StreamMerger>,
    exhausted: bool,
}

impl PartitionMergeCursor {
    /// Build the fan-out source
    ///
    /// `comparator` must match the request's sort; each worker stream comes
    /// back ordered by it.
    pub fn new(
        search: Arc<SearchContext>,
        request: SearchRequest,
        keys: Vec<String>,
        workers: usize,
        comparator: RowComparator,
    ) -> Self {
        Self {
            search,
            request,
            keys,
            workers: workers.max(1),
            comparator,
            merger: None,
            exhausted: false,
        }
    }

    fn open(&mut self, ctx: &mut ExecutionContext) -> QueryResult<()> {
        let client = self.search.client();
        let request = &self.request;
        let partitions: Vec<Partition> = (0..self.workers)
            .map(|index| Partition {
                index,
                total: self.workers,
                keys: self.keys.clone(),
            })
            .collect();
        debug!(workers = self.workers, "opening partition fan-out");

        let results = self.search.block_on(async {
            let calls = partitions
                .iter()
                .map(|p| client.partition_search(request, p));
            futures::future::join_all(calls).await
        });
        ctx.stats.shard_requests += self.workers as u64;

        let mut streams = Vec::with_capacity(results.len());
        for result in results {
            streams.push(result?);
        }
        self.merger = Some(StreamMerger::new(streams, self.comparator.clone()));
        Ok(())
    }
}

impl Cursor for PartitionMergeCursor {
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
            .ok_or_else(|| QueryError::internal("partition merge opened without streams"))?;
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
        "PartitionMerge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::types::{SortDirection, Value};

    fn row(k: i64) -> Row {
        Row::new().with("k", Value::Int(k))
    }

    fn asc() -> RowComparator {
        RowComparator::new(vec![("k".to_string(), SortDirection::Asc)])
    }

    fn drain(merger: &mut StreamMerger) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(r) = merger.next_row().unwrap() {
            match r.get("k") {
                Some(Value::Int(k)) => out.push(*k),
                other => panic!("unexpected key {other:?}"),
            }
        }
        out
    }

    #[test]
    fn test_merge_selects_least_head() {
        let streams = vec![
            ShardStream::from_rows(vec![row(1), row(4), row(7)]),
            ShardStream::from_rows(vec![row(2), row(3), row(9)]),
            ShardStream::from_rows(vec![row(5)]),
        ];
        let mut merger = StreamMerger::new(streams, asc());
        assert_eq!(drain(&mut merger), vec![1, 2, 3, 4, 5, 7, 9]);
    }

    #[test]
    fn test_merge_with_empty_streams() {
        let streams = vec![
            ShardStream::from_rows(vec![]),
            ShardStream::from_rows(vec![row(2)]),
            ShardStream::from_rows(vec![]),
        ];
        let mut merger = StreamMerger::new(streams, asc());
        assert_eq!(drain(&mut merger), vec![2]);
        assert!(merger.next_row().unwrap().is_none());
    }

    #[test]
    fn test_unsorted_partition_fails_fast() {
        let streams = vec![ShardStream::from_rows(vec![row(5), row(2)])];
        let mut merger = StreamMerger::new(streams, asc());
        assert!(merger.next_row().unwrap().is_some());
        let err = merger.next_row().unwrap_err();
        assert_eq!(err.kind, crate::query::error::QueryErrorKind::Internal);
        assert!(err.message.contains("not sorted"));
    }

    #[test]
    fn test_terminal_stream_error_surfaces_after_buffered_rows() {
        let streams = vec![
            ShardStream::from_rows(vec![row(3)]),
            ShardStream::failed(vec![row(1)], TransportError::Timeout("shard 1".into())),
        ];
        let mut merger = StreamMerger::new(streams, asc());
        assert!(merger.next_row().unwrap().is_some()); // k=1
        // The failed stream's buffer is drained; its marker surfaces on the
        // next head selection.
        assert!(merger.next_row().is_err());
    }
}
