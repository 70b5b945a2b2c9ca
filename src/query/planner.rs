//! Query planner - strategy selection and chain assembly
//!
//! Maps a bound query descriptor onto one of five execution strategies over
//! the sharded index and assembles the pull-based cursor chain for it. This
//! is a small fixed decision tree over query shape, not a cost-based
//! optimizer:
//!
//! 1. No aggregates, no grouping: simple select, scattered to every shard
//! 2. Aggregates without grouping: one global stats gather
//! 3. Grouping in sort-merge mode: distinct or rollup over a worker
//!    fan-out merged centrally
//! 4. Grouping in pushdown mode on a single day/month/year virtual column:
//!    range-bucketed time-series aggregation
//! 5. Any other pushdown grouping: faceted aggregation with overfetch
//!
//! The planner triggers schema discovery once per query context and builds
//! every index request in terms of storage fields, renaming back to
//! published column names at the top of the chain.

use crate::filters::{self, FieldFilter};
use crate::query::cursor::{Cursor, QueryCursor};
use crate::query::descriptor::{ExecutionMode, QueryDescriptor};
use crate::query::error::{QueryError, QueryResult};
use crate::query::operators::rollup::RollupMetric;
use crate::query::operators::stats::StatsMetric;
use crate::query::operators::{
    DedupCursor, FacetGroupsCursor, GlobalStatsCursor, HavingCursor, HavingPredicate, LimitCursor,
    PartitionMergeCursor, ProjectCursor, RollupCursor, ScatterSearchCursor, TimeBucketsCursor,
    TopKCursor,
};
use crate::query::window::{self, TimeGrain};
use crate::schema::{predicate_scan, split_time_suffix, SchemaBuilder, SchemaColumn};
use crate::search::{
    FacetOrder, FacetRequest, MetricSpec, SearchContext, SearchRequest, StatsRequest,
    TimeBucketRequest,
};
use crate::types::{AggregateFunction, RowComparator, SortDirection};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Planner Configuration
// ============================================================================

/// Configuration for query planning
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Sort-merge worker fan-out width (default: available cores)
    pub merge_workers: usize,

    /// Group fetch cap for pushdown grouped aggregation without a limit
    pub max_groups: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            merge_workers: num_cpus::get().max(1),
            max_groups: 10_000,
        }
    }
}

impl PlannerConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sort-merge worker count
    pub fn with_merge_workers(mut self, workers: usize) -> Self {
        self.merge_workers = workers.max(1);
        self
    }

    /// Set the unlimited-query group fetch cap
    pub fn with_max_groups(mut self, max_groups: u64) -> Self {
        self.max_groups = max_groups.max(1);
        self
    }
}

// ============================================================================
// Query Context
// ============================================================================

/// Per-query state: the index handle, administrator-configured fields, and
/// the schema built once for this context
///
/// Nothing in here is shared across concurrent query contexts except the
/// read-only topology inside the search handle.
pub struct QueryContext {
    search: Arc<SearchContext>,
    configured_fields: HashMap<String, String>,
    schema: RwLock<Option<Arc<Vec<SchemaColumn>>>>,
}

impl QueryContext {
    /// Context over an index handle
    pub fn new(search: Arc<SearchContext>) -> Self {
        Self {
            search,
            configured_fields: HashMap::new(),
            schema: RwLock::new(None),
        }
    }

    /// Attach administrator-configured fields (name to storage type)
    pub fn with_configured_fields(mut self, fields: HashMap<String, String>) -> Self {
        self.configured_fields = fields;
        self
    }

    /// The index handle
    pub fn search(&self) -> Arc<SearchContext> {
        Arc::clone(&self.search)
    }

    /// The virtual table schema for this context, built on first use
    ///
    /// Combines index-observed fields, configured fields, and fields the
    /// descriptor's raw SQL references in its WHERE clause.
    pub fn schema(&self, descriptor: &QueryDescriptor) -> QueryResult<Arc<Vec<SchemaColumn>>> {
        if let Some(schema) = self.schema.read().as_ref() {
            return Ok(Arc::clone(schema));
        }

        let client = self.search.client();
        let observed = self.search.block_on(client.field_types())?;
        let predicate_fields = descriptor
            .raw_sql
            .as_deref()
            .map(predicate_scan::extract)
            .unwrap_or_default();
        let built = SchemaBuilder::build(
            &observed,
            &self.configured_fields,
            &predicate_fields,
            descriptor.select_all,
        );

        let schema = Arc::new(built);
        *self.schema.write() = Some(Arc::clone(&schema));
        Ok(schema)
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// The five execution strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Scatter search, no aggregation
    SimpleSelect,
    /// One scatter/gather aggregate request, no grouping
    GlobalStats,
    /// Distributed duplicate elimination over merged worker streams
    DistinctMerge,
    /// Distributed partial-rollup-then-merge
    RollupMerge,
    /// Range-bucketed time-series aggregation
    TimeSeries,
    /// Pushdown faceted aggregation with overfetch
    GroupedFacets,
}

/// Evaluate the decision tree, in order
fn choose_strategy(
    descriptor: &QueryDescriptor,
    aggregates: &[(AggregateFunction, String)],
) -> QueryResult<Strategy> {
    if descriptor.buckets.is_empty() {
        return if aggregates.is_empty() {
            Ok(Strategy::SimpleSelect)
        } else {
            Ok(Strategy::GlobalStats)
        };
    }

    if descriptor.execution_mode == ExecutionMode::SortMerge {
        return if aggregates.is_empty() {
            if descriptor.having.is_some() {
                // A having clause means aggregation was intended.
                Err(QueryError::validation(
                    "at least one aggregate function required",
                ))
            } else {
                Ok(Strategy::DistinctMerge)
            }
        } else {
            Ok(Strategy::RollupMerge)
        };
    }

    if descriptor.buckets.len() == 1 && split_time_suffix(&descriptor.buckets[0]).is_some() {
        return Ok(Strategy::TimeSeries);
    }

    Ok(Strategy::GroupedFacets)
}

/// Overfetched group count for pushdown grouped aggregation
///
/// Extra candidates absorb local having-filtering and re-ranking before
/// truncation.
fn overfetch(limit: u64) -> u64 {
    std::cmp::max((limit as f64 * 1.25) as u64, limit + 150)
}

/// Whether the requested ordering names exactly the grouping fields, in
/// sequence (directions free)
fn ordering_covers_buckets(orderings: &[(String, SortDirection)], buckets: &[String]) -> bool {
    orderings.len() == buckets.len()
        && orderings
            .iter()
            .zip(buckets)
            .all(|((field, _), bucket)| field == bucket)
}

/// Whether the requested ordering is exactly the grouping fields ascending
/// (the order group streams and key-ordered facets naturally arrive in)
fn ordering_is_bucket_asc(orderings: &[(String, SortDirection)], buckets: &[String]) -> bool {
    ordering_covers_buckets(orderings, buckets)
        && orderings
            .iter()
            .all(|(_, direction)| *direction == SortDirection::Asc)
}

// ============================================================================
// Query Planner
// ============================================================================

/// Selects and assembles one of the five execution strategies
pub struct QueryPlanner {
    config: PlannerConfig,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryPlanner {
    /// Planner with default configuration
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    /// Planner with custom configuration
    pub fn with_config(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan a descriptor into a result cursor
    pub fn plan(&self, ctx: &QueryContext, descriptor: &QueryDescriptor) -> QueryResult<QueryCursor> {
        self.plan_at(ctx, descriptor, Utc::now())
    }

    /// Plan with an explicit clock, for deterministic time windows
    pub fn plan_at(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        now: DateTime<Utc>,
    ) -> QueryResult<QueryCursor> {
        let schema = ctx.schema(descriptor)?;
        let aggregates = parse_aggregates(descriptor)?;
        let filters = decode_filters(descriptor)?;
        let having = descriptor
            .having
            .as_deref()
            .map(HavingPredicate::parse)
            .transpose()?;

        let strategy = choose_strategy(descriptor, &aggregates)?;
        debug!(?strategy, buckets = descriptor.buckets.len(), "selected execution strategy");

        match strategy {
            Strategy::SimpleSelect => self.plan_simple_select(ctx, descriptor, &schema),
            Strategy::GlobalStats => {
                self.plan_global_stats(ctx, descriptor, &schema, &aggregates, having)
            }
            Strategy::DistinctMerge => self.plan_distinct_merge(ctx, descriptor, &schema),
            Strategy::RollupMerge => {
                self.plan_rollup_merge(ctx, descriptor, &schema, &aggregates, having)
            }
            Strategy::TimeSeries => {
                self.plan_time_series(ctx, descriptor, &schema, &aggregates, &filters, having, now)
            }
            Strategy::GroupedFacets => {
                self.plan_grouped_facets(ctx, descriptor, &schema, &aggregates, having)
            }
        }
    }

    /// Strategy 1: scatter search wrapped in a limiting stage
    fn plan_simple_select(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
    ) -> QueryResult<QueryCursor> {
        if !descriptor.select_all {
            for (name, _) in &descriptor.fields {
                if name.contains('*') {
                    return Err(QueryError::validation(format!(
                        "projected field {name:?} contains a wildcard"
                    )));
                }
            }
        }

        let projected: Vec<String> = if descriptor.select_all {
            schema.iter().map(|col| col.name.clone()).collect()
        } else {
            descriptor
                .fields
                .iter()
                .map(|(name, _)| name.clone())
                .collect()
        };
        let pairs: Vec<(String, String)> = projected
            .iter()
            .map(|name| (name.clone(), source_of(schema, name)))
            .collect();

        let request = SearchRequest {
            query: descriptor.native_query(),
            fields: pairs.iter().map(|(_, source)| source.clone()).collect(),
            sort: descriptor
                .orderings
                .iter()
                .map(|(field, direction)| (source_of(schema, field), *direction))
                .collect(),
            limit: descriptor.limit,
        };

        let mut chain: Box<dyn Cursor> = Box::new(ScatterSearchCursor::new(ctx.search(), request));
        chain = apply_projection(chain, pairs);
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, projected))
    }

    /// Strategy 2: one scatter/gather aggregate request, no grouping
    fn plan_global_stats(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
        aggregates: &[(AggregateFunction, String)],
        having: Option<HavingPredicate>,
    ) -> QueryResult<QueryCursor> {
        let mut stats_fields: Vec<String> = Vec::new();
        let mut metrics = Vec::with_capacity(aggregates.len());
        let mut pairs = Vec::with_capacity(aggregates.len());
        for (function, field) in aggregates {
            let source = if field == "*" {
                "*".to_string()
            } else {
                source_of(schema, field)
            };
            if source != "*" && !stats_fields.contains(&source) {
                stats_fields.push(source.clone());
            }
            pairs.push((
                function.output_column(field),
                function.output_column(&source),
            ));
            metrics.push(StatsMetric {
                function: *function,
                field: source,
            });
        }

        let request = StatsRequest {
            query: descriptor.native_query(),
            fields: stats_fields,
        };
        let columns: Vec<String> = pairs.iter().map(|(published, _)| published.clone()).collect();

        let mut chain: Box<dyn Cursor> =
            Box::new(GlobalStatsCursor::new(ctx.search(), request, metrics));
        chain = apply_projection(chain, pairs);
        chain = apply_having(chain, having);
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, columns))
    }

    /// Strategy 3a: distributed duplicate elimination over merged workers
    fn plan_distinct_merge(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
    ) -> QueryResult<QueryCursor> {
        let key_sources: Vec<String> = descriptor
            .buckets
            .iter()
            .map(|bucket| source_of(schema, bucket))
            .collect();

        // Merge by the requested ordering when it covers exactly the
        // grouping fields; the stream stays dedup-compatible either way.
        let ordering_compatible = ordering_covers_buckets(&descriptor.orderings, &descriptor.buckets);
        let sort: Vec<(String, SortDirection)> = if ordering_compatible {
            descriptor
                .orderings
                .iter()
                .map(|(field, direction)| (source_of(schema, field), *direction))
                .collect()
        } else {
            key_sources
                .iter()
                .map(|key| (key.clone(), SortDirection::Asc))
                .collect()
        };
        let comparator = RowComparator::new(sort.clone());

        let request = SearchRequest {
            query: descriptor.native_query(),
            fields: key_sources.clone(),
            sort,
            limit: None,
        };

        let mut chain: Box<dyn Cursor> = Box::new(PartitionMergeCursor::new(
            ctx.search(),
            request,
            key_sources.clone(),
            self.config.merge_workers,
            comparator.clone(),
        ));
        chain = Box::new(DedupCursor::with_comparator(chain, comparator));
        chain = apply_projection(chain, bucket_pairs(descriptor, schema));

        if !ordering_compatible && !descriptor.orderings.is_empty() {
            chain = Box::new(TopKCursor::new(
                chain,
                RowComparator::new(descriptor.orderings.clone()),
                descriptor.limit.map(|l| l as usize),
            ));
        }
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, descriptor.buckets.clone()))
    }

    /// Strategy 3b: distributed partial-rollup-then-merge
    fn plan_rollup_merge(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
        aggregates: &[(AggregateFunction, String)],
        having: Option<HavingPredicate>,
    ) -> QueryResult<QueryCursor> {
        let key_sources: Vec<String> = descriptor
            .buckets
            .iter()
            .map(|bucket| source_of(schema, bucket))
            .collect();

        let mut fields = key_sources.clone();
        let mut metrics = Vec::new();
        let mut pairs = bucket_pairs(descriptor, schema);
        pairs.push(("count(*)".to_string(), "count(*)".to_string()));
        for (function, field) in aggregates {
            if *function == AggregateFunction::Count && field == "*" {
                continue;
            }
            let source = source_of(schema, field);
            if !fields.contains(&source) {
                fields.push(source.clone());
            }
            pairs.push((
                function.output_column(field),
                function.output_column(&source),
            ));
            metrics.push(RollupMetric {
                function: *function,
                field: source,
            });
        }

        let sort: Vec<(String, SortDirection)> = key_sources
            .iter()
            .map(|key| (key.clone(), SortDirection::Asc))
            .collect();
        let comparator = RowComparator::new(sort.clone());
        let request = SearchRequest {
            query: descriptor.native_query(),
            fields,
            sort,
            limit: None,
        };

        let mut chain: Box<dyn Cursor> = Box::new(PartitionMergeCursor::new(
            ctx.search(),
            request,
            key_sources.clone(),
            self.config.merge_workers,
            comparator,
        ));
        chain = Box::new(RollupCursor::new(chain, key_sources, metrics));
        chain = apply_projection(chain, pairs);
        chain = apply_having(chain, having);
        chain = self.apply_group_ordering(chain, descriptor);
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, grouped_columns(descriptor, aggregates)))
    }

    /// Strategy 4: range-bucketed time-series aggregation
    #[allow(clippy::too_many_arguments)]
    fn plan_time_series(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
        aggregates: &[(AggregateFunction, String)],
        filters: &HashMap<String, FieldFilter>,
        having: Option<HavingPredicate>,
        now: DateTime<Utc>,
    ) -> QueryResult<QueryCursor> {
        let bucket_name = &descriptor.buckets[0];
        let (base, variant) = split_time_suffix(bucket_name)
            .ok_or_else(|| QueryError::internal("time-series strategy without a time suffix"))?;
        let grain = TimeGrain::from_variant(variant)
            .ok_or_else(|| QueryError::internal("time variant without a grain"))?;
        let window = window::resolve(grain, bucket_name, filters, now);

        // The virtual column resolves to its underlying date field; fall
        // back to the de-suffixed base for fields discovery never saw.
        let date_field = SchemaBuilder::find(schema, bucket_name)
            .map(|col| col.source.clone())
            .unwrap_or_else(|| source_of(schema, base));

        let mut metrics = Vec::new();
        let mut pairs = vec![
            (bucket_name.clone(), bucket_name.clone()),
            ("count(*)".to_string(), "count(*)".to_string()),
        ];
        for (function, field) in aggregates {
            if *function == AggregateFunction::Count {
                continue;
            }
            let source = source_of(schema, field);
            pairs.push((
                function.output_column(field),
                function.output_column(&source),
            ));
            metrics.push(MetricSpec {
                function: *function,
                field: source,
            });
        }

        let request = TimeBucketRequest {
            query: descriptor.native_query(),
            field: date_field,
            start: window.start.clone(),
            end: window.end.clone(),
            gap: window.gap.to_string(),
            metrics,
        };

        let mut chain: Box<dyn Cursor> = Box::new(TimeBucketsCursor::new(
            ctx.search(),
            request,
            bucket_name.clone(),
            window.format,
        ));
        chain = apply_projection(chain, pairs);
        chain = apply_having(chain, having);
        chain = self.apply_group_ordering(chain, descriptor);
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, grouped_columns(descriptor, aggregates)))
    }

    /// Strategy 5: pushdown grouped aggregation with overfetch
    fn plan_grouped_facets(
        &self,
        ctx: &QueryContext,
        descriptor: &QueryDescriptor,
        schema: &[SchemaColumn],
        aggregates: &[(AggregateFunction, String)],
        having: Option<HavingPredicate>,
    ) -> QueryResult<QueryCursor> {
        let key_sources: Vec<String> = descriptor
            .buckets
            .iter()
            .map(|bucket| source_of(schema, bucket))
            .collect();

        let mut metrics = Vec::new();
        let mut pairs: Vec<(String, String)> = descriptor
            .buckets
            .iter()
            .zip(&key_sources)
            .map(|(bucket, source)| (bucket.clone(), source.clone()))
            .collect();
        pairs.push(("count(*)".to_string(), "count(*)".to_string()));
        for (function, field) in aggregates {
            if *function == AggregateFunction::Count && field == "*" {
                continue;
            }
            let source = source_of(schema, field);
            pairs.push((
                function.output_column(field),
                function.output_column(&source),
            ));
            metrics.push(MetricSpec {
                function: *function,
                field: source,
            });
        }

        let fetch = descriptor
            .limit
            .map(overfetch)
            .unwrap_or(self.config.max_groups);
        let ordered_by_key = ordering_is_bucket_asc(&descriptor.orderings, &descriptor.buckets);
        let order = if ordered_by_key {
            FacetOrder::KeyAsc
        } else {
            FacetOrder::Natural
        };

        let request = FacetRequest {
            query: descriptor.native_query(),
            buckets: key_sources,
            metrics,
            limit: fetch,
            order,
        };

        let mut chain: Box<dyn Cursor> = Box::new(FacetGroupsCursor::new(ctx.search(), request));
        chain = apply_projection(chain, pairs);
        chain = apply_having(chain, having);
        chain = self.apply_group_ordering(chain, descriptor);
        chain = apply_limit(chain, descriptor.limit);
        Ok(QueryCursor::new(chain, grouped_columns(descriptor, aggregates)))
    }

    /// Shared tie-break: a requested ordering that equals the grouping-field
    /// order needs no ranking stage; anything else gets an explicit top-K
    /// ranking stage ahead of the limit
    fn apply_group_ordering(
        &self,
        chain: Box<dyn Cursor>,
        descriptor: &QueryDescriptor,
    ) -> Box<dyn Cursor> {
        if descriptor.orderings.is_empty()
            || ordering_is_bucket_asc(&descriptor.orderings, &descriptor.buckets)
        {
            return chain;
        }
        Box::new(TopKCursor::new(
            chain,
            RowComparator::new(descriptor.orderings.clone()),
            descriptor.limit.map(|l| l as usize),
        ))
    }
}

// ============================================================================
// Assembly helpers
// ============================================================================

fn parse_aggregates(
    descriptor: &QueryDescriptor,
) -> QueryResult<Vec<(AggregateFunction, String)>> {
    let mut aggregates = Vec::with_capacity(descriptor.aggregates.len());
    for spec in &descriptor.aggregates {
        let function = AggregateFunction::parse(&spec.function).ok_or_else(|| {
            QueryError::validation(format!("unknown aggregate function {:?}", spec.function))
        })?;
        if function != AggregateFunction::Count && spec.field == "*" {
            return Err(QueryError::validation(format!(
                "aggregate function {:?} requires a field",
                spec.function
            )));
        }
        aggregates.push((function, spec.field.clone()));
    }
    Ok(aggregates)
}

fn decode_filters(descriptor: &QueryDescriptor) -> QueryResult<HashMap<String, FieldFilter>> {
    match descriptor.filter_data.as_deref() {
        None => Ok(HashMap::new()),
        Some(encoded) => filters::decode(encoded)
            .map_err(|e| QueryError::validation("malformed filter data").with_source(e)),
    }
}

/// Storage field a published column resolves to; unknown names pass through
/// (the front end surfaces unresolvable projections as its own error)
fn source_of(schema: &[SchemaColumn], name: &str) -> String {
    SchemaBuilder::find(schema, name)
        .map(|col| col.source.clone())
        .unwrap_or_else(|| name.to_string())
}

fn bucket_pairs(descriptor: &QueryDescriptor, schema: &[SchemaColumn]) -> Vec<(String, String)> {
    descriptor
        .buckets
        .iter()
        .map(|bucket| (bucket.clone(), source_of(schema, bucket)))
        .collect()
}

/// Published columns of a grouped result: the buckets, then the aggregate
/// labels (or the implicit count when no aggregates were requested)
fn grouped_columns(
    descriptor: &QueryDescriptor,
    aggregates: &[(AggregateFunction, String)],
) -> Vec<String> {
    let mut columns = descriptor.buckets.clone();
    if aggregates.is_empty() {
        columns.push("count(*)".to_string());
    } else {
        for (function, field) in aggregates {
            columns.push(function.output_column(field));
        }
    }
    columns
}

fn apply_projection(chain: Box<dyn Cursor>, pairs: Vec<(String, String)>) -> Box<dyn Cursor> {
    if ProjectCursor::is_identity(&pairs) {
        chain
    } else {
        Box::new(ProjectCursor::new(chain, pairs))
    }
}

fn apply_having(chain: Box<dyn Cursor>, having: Option<HavingPredicate>) -> Box<dyn Cursor> {
    match having {
        None => chain,
        Some(predicate) => Box::new(HavingCursor::new(chain, predicate)),
    }
}

fn apply_limit(chain: Box<dyn Cursor>, limit: Option<u64>) -> Box<dyn Cursor> {
    match limit {
        None => chain,
        Some(limit) => Box::new(LimitCursor::new(chain, limit)),
    }
}

// ============================================================================
// Tests
// ============================================================================
