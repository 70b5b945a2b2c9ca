//! Index cluster boundary
//!
//! Everything the translator needs from the document index/search cluster,
//! behind one narrow async trait: schema discovery, primitive per-shard and
//! partitioned searches, and the three cluster-coordinated aggregation
//! primitives (global stats, faceted groups, range-bucketed time series).
//!
//! Query execution itself is single-threaded pull; the [`SearchContext`]
//! resource handle owns a current-thread runtime that bridges synchronous
//! cursor pulls onto the async transport. The handle is threaded through the
//! planner explicitly rather than held as ambient global state.

pub mod stubs;

use crate::error::{TransportError, TransportResult};
use crate::types::{AggregateFunction, Row, Shard, ShardTopology, SortDirection};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

// =============================================================================
// Requests
// =============================================================================

/// Primitive document search request
///
/// `sort` is honored by the index; per-shard and per-partition result
/// streams come back already ordered by it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Native index query string
    pub query: String,
    /// Storage fields to return per document
    pub fields: Vec<String>,
    /// Requested result order
    pub sort: Vec<(String, SortDirection)>,
    /// Optional per-stream row cap
    pub limit: Option<u64>,
}

/// One slice of the grouping-key space for worker fan-out
///
/// Partitions are disjoint and cover the key space; every document whose
/// key tuple hashes to `index` (mod `total`) belongs to this slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// This worker's slice number
    pub index: usize,
    /// Total number of slices
    pub total: usize,
    /// Fields whose values define the partitioning key
    pub keys: Vec<String>,
}

/// A single aggregate the index computes per group or bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Aggregate function to apply
    pub function: AggregateFunction,
    /// Storage field the function aggregates over
    pub field: String,
}

impl MetricSpec {
    /// Output column label for this metric
    pub fn output_column(&self) -> String {
        self.function.output_column(&self.field)
    }
}

/// Cluster-coordinated numeric stats request (no grouping)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {
    /// Native index query string
    pub query: String,
    /// Fields to compute stats over
    pub fields: Vec<String>,
}

/// Group ordering for a faceted aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FacetOrder {
    /// The index's natural per-group order (count descending)
    #[default]
    Natural,
    /// Ascending by the grouping key tuple
    KeyAsc,
}

/// Cluster-coordinated faceted group aggregation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetRequest {
    /// Native index query string
    pub query: String,
    /// Grouping fields, outermost first
    pub buckets: Vec<String>,
    /// Per-group aggregates beyond the implicit count
    pub metrics: Vec<MetricSpec>,
    /// Maximum number of groups to return (already overfetched)
    pub limit: u64,
    /// Group ordering
    pub order: FacetOrder,
}

/// Cluster-coordinated range-bucketed time aggregation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucketRequest {
    /// Native index query string
    pub query: String,
    /// Storage date field to bucket on
    pub field: String,
    /// Window start (ISO-8601 instant or verbatim explicit bound)
    pub start: String,
    /// Window end, exclusive
    pub end: String,
    /// Bucket width, one grain unit (`+1DAY`, `+1MONTH`, `+1YEAR`)
    pub gap: String,
    /// Per-bucket aggregates beyond the implicit count
    pub metrics: Vec<MetricSpec>,
}

// =============================================================================
// Responses
// =============================================================================

/// Mergeable partial stats for one field
///
/// Carries sum and count rather than a mean so partials from independent
/// shards merge exactly; averages are derived at the edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of documents with a value for the field
    pub count: u64,
    /// Sum of numeric values
    pub sum: f64,
    /// Minimum value seen
    pub min: Option<crate::types::Value>,
    /// Maximum value seen
    pub max: Option<crate::types::Value>,
}

impl FieldStats {
    /// Merge another partial into this one
    pub fn merge(&mut self, other: &FieldStats) {
        self.count += other.count;
        self.sum += other.sum;
        merge_bound(&mut self.min, &other.min, std::cmp::Ordering::Less);
        merge_bound(&mut self.max, &other.max, std::cmp::Ordering::Greater);
    }
}

fn merge_bound(
    into: &mut Option<crate::types::Value>,
    from: &Option<crate::types::Value>,
    keep: std::cmp::Ordering,
) {
    if let Some(candidate) = from {
        match into {
            None => *into = Some(candidate.clone()),
            Some(current) => {
                if candidate.compare(current) == keep {
                    *into = Some(candidate.clone());
                }
            }
        }
    }
}

/// Global stats over the matched document set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Total matched documents
    pub doc_count: u64,
    /// Per-field stats partials
    pub fields: HashMap<String, FieldStats>,
}

/// Faceted group aggregation result
///
/// Each group row carries the bucket fields plus one column per requested
/// metric (labelled `function(field)`) and the implicit `count(*)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetResponse {
    /// Group rows in the index's natural per-group order
    pub groups: Vec<Row>,
}

/// One bucket of a range-bucketed time aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Bucket start instant (ISO-8601)
    pub start: String,
    /// Documents in the bucket
    pub count: u64,
    /// Requested metric values, labelled `function(field)`
    pub metrics: Vec<(String, crate::types::Value)>,
}

/// Range-bucketed time aggregation result, buckets in window order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeBucketResponse {
    /// All buckets of the window, including empty ones
    pub buckets: Vec<TimeBucket>,
}

// =============================================================================
// Shard streams
// =============================================================================

/// Buffered result stream from one shard or worker partition
///
/// Transport failures during iteration never block the caller: the boundary
/// converts them into an end-of-stream-with-error marker. Rows buffered
/// before the failure are still delivered; the error surfaces once the
/// buffer drains.
#[derive(Debug, Default)]
pub struct ShardStream {
    rows: VecDeque<Row>,
    error: Option<TransportError>,
}

impl ShardStream {
    /// Stream that delivers `rows` and then ends cleanly
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            error: None,
        }
    }

    /// Stream that delivers `rows` and then surfaces `error`
    pub fn failed(rows: Vec<Row>, error: TransportError) -> Self {
        Self {
            rows: rows.into(),
            error: Some(error),
        }
    }

    /// Next buffered row, the terminal error marker, or clean end of stream
    pub fn next_row(&mut self) -> TransportResult<Option<Row>> {
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => match self.error.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    /// Peek at the head row without consuming it
    ///
    /// Surfaces the terminal error marker if the buffer is drained.
    pub fn peek(&mut self) -> TransportResult<Option<&Row>> {
        if self.rows.is_empty() {
            if let Some(err) = self.error.take() {
                return Err(err);
            }
        }
        Ok(self.rows.front())
    }

    /// Rows still buffered
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

// =============================================================================
// IndexClient trait
// =============================================================================

/// Narrow interface to the document index/search cluster
///
/// Implementations own connection management and per-shard client caching;
/// the translator only ever sees this trait through a [`SearchContext`].
#[async_trait]
pub trait IndexClient: Send + Sync + 'static {
    /// Index-observed fields and their storage types
    async fn field_types(&self) -> TransportResult<HashMap<String, String>>;

    /// Primitive search against one shard; the stream is ordered per the
    /// request's sort
    async fn shard_search(&self, shard: &Shard, req: &SearchRequest)
        -> TransportResult<ShardStream>;

    /// Partitioned search over the whole index for worker fan-out; each
    /// partition stream is ordered per the request's sort
    async fn partition_search(
        &self,
        req: &SearchRequest,
        partition: &Partition,
    ) -> TransportResult<ShardStream>;

    /// Cluster-coordinated global stats
    async fn stats(&self, req: &StatsRequest) -> TransportResult<StatsResponse>;

    /// Cluster-coordinated faceted group aggregation
    async fn facet_groups(&self, req: &FacetRequest) -> TransportResult<FacetResponse>;

    /// Cluster-coordinated range-bucketed time aggregation
    async fn time_buckets(&self, req: &TimeBucketRequest) -> TransportResult<TimeBucketResponse>;
}

// =============================================================================
// SearchContext
// =============================================================================

/// Resource handle bundling the cluster client, the read-only shard
/// topology, and the runtime that bridges sync cursor pulls onto async
/// transport calls
///
/// One handle is shared across the cursors of a query context; dropping it
/// releases the bridge runtime.
pub struct SearchContext {
    topology: ShardTopology,
    client: Arc<dyn IndexClient>,
    runtime: tokio::runtime::Runtime,
}

impl SearchContext {
    /// Build a context over a client and topology
    pub fn new(topology: ShardTopology, client: Arc<dyn IndexClient>) -> TransportResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Runtime(e.to_string()))?;
        Ok(Self {
            topology,
            client,
            runtime,
        })
    }

    /// The cluster layout this context queries
    pub fn topology(&self) -> &ShardTopology {
        &self.topology
    }

    /// The cluster client
    pub fn client(&self) -> Arc<dyn IndexClient> {
        Arc::clone(&self.client)
    }

    /// Drive an async transport call to completion from sync code
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("shards", &self.topology.shard_count())
            .finish()
    }
}
