//! In-memory stub implementation of the index boundary
//!
//! Backs unit and integration tests with a deterministic, single-process
//! stand-in for the search cluster. The stub keeps every request it serves
//! so tests can assert on what the planner actually sent.
//!
//! Fidelity notes: documents are assigned to shards round-robin; the native
//! query string is recorded but not evaluated (tests drive selection through
//! document setup instead); facet groups come back in the index's natural
//! order, count-descending.

use crate::error::{TransportError, TransportResult};
use crate::search::{
    FacetOrder, FacetRequest, FacetResponse, FieldStats, IndexClient, MetricSpec, Partition,
    SearchRequest, ShardStream, StatsRequest, StatsResponse, TimeBucket, TimeBucketRequest,
    TimeBucketResponse,
};
use crate::types::{AggregateFunction, Row, RowComparator, Shard, Value};
use async_trait::async_trait;
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Every request kind the stub can serve, recorded for test assertions
#[derive(Debug, Clone)]
pub enum RecordedRequest {
    /// A per-shard primitive search
    Search(u32, SearchRequest),
    /// A partitioned worker search
    PartitionSearch(SearchRequest, Partition),
    /// A global stats request
    Stats(StatsRequest),
    /// A faceted group aggregation
    Facets(FacetRequest),
    /// A range-bucketed time aggregation
    TimeBuckets(TimeBucketRequest),
}

/// Deterministic in-memory index cluster
pub struct StubIndex {
    shard_count: usize,
    fields: RwLock<HashMap<String, String>>,
    docs: RwLock<Vec<Row>>,
    failing_shards: RwLock<HashSet<u32>>,
    recorded: RwLock<Vec<RecordedRequest>>,
}

impl StubIndex {
    /// Empty stub with a single shard
    pub fn new() -> Self {
        Self::with_shards(1)
    }

    /// Empty stub spread over `shard_count` shards
    pub fn with_shards(shard_count: usize) -> Self {
        Self {
            shard_count: shard_count.max(1),
            fields: RwLock::new(HashMap::new()),
            docs: RwLock::new(Vec::new()),
            failing_shards: RwLock::new(HashSet::new()),
            recorded: RwLock::new(Vec::new()),
        }
    }

    /// Declare an index-observed field and its storage type
    pub fn declare_field(&self, name: impl Into<String>, storage_type: impl Into<String>) {
        self.fields.write().insert(name.into(), storage_type.into());
    }

    /// Add a document
    pub fn add_document(&self, doc: Row) {
        self.docs.write().push(doc);
    }

    /// Make a shard answer with a terminal transport error
    pub fn fail_shard(&self, shard_id: u32) {
        self.failing_shards.write().insert(shard_id);
    }

    /// Requests served so far, in order
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.recorded.read().clone()
    }

    fn record(&self, req: RecordedRequest) {
        self.recorded.write().push(req);
    }

    fn sorted_projection(&self, docs: Vec<Row>, req: &SearchRequest) -> Vec<Row> {
        let mut docs = docs;
        if !req.sort.is_empty() {
            let cmp = RowComparator::new(req.sort.clone());
            docs.sort_by(|a, b| cmp.compare(a, b));
        }
        if let Some(limit) = req.limit {
            docs.truncate(limit as usize);
        }
        docs
    }
}

impl Default for StubIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexClient for StubIndex {
    async fn field_types(&self) -> TransportResult<HashMap<String, String>> {
        Ok(self.fields.read().clone())
    }

    async fn shard_search(
        &self,
        shard: &Shard,
        req: &SearchRequest,
    ) -> TransportResult<ShardStream> {
        self.record(RecordedRequest::Search(shard.id, req.clone()));
        if self.failing_shards.read().contains(&shard.id) {
            return Ok(ShardStream::failed(
                Vec::new(),
                TransportError::Connection(format!("shard {} unreachable", shard.id)),
            ));
        }

        let docs: Vec<Row> = self
            .docs
            .read()
            .iter()
            .enumerate()
            .filter(|(i, _)| i % self.shard_count == shard.id as usize)
            .map(|(_, doc)| doc.clone())
            .collect();
        Ok(ShardStream::from_rows(self.sorted_projection(docs, req)))
    }

    async fn partition_search(
        &self,
        req: &SearchRequest,
        partition: &Partition,
    ) -> TransportResult<ShardStream> {
        self.record(RecordedRequest::PartitionSearch(
            req.clone(),
            partition.clone(),
        ));
        if partition.total == 0 {
            return Err(TransportError::Rejected("empty partition set".into()));
        }

        let docs: Vec<Row> = self
            .docs
            .read()
            .iter()
            .filter(|doc| partition_slot(doc, &partition.keys, partition.total) == partition.index)
            .cloned()
            .collect();
        Ok(ShardStream::from_rows(self.sorted_projection(docs, req)))
    }

    async fn stats(&self, req: &StatsRequest) -> TransportResult<StatsResponse> {
        self.record(RecordedRequest::Stats(req.clone()));
        let docs = self.docs.read();

        let mut fields = HashMap::new();
        for field in &req.fields {
            let mut stats = FieldStats::default();
            for doc in docs.iter() {
                if let Some(value) = doc.get(field) {
                    if value.is_null() {
                        continue;
                    }
                    stats.count += 1;
                    if let Some(n) = value.as_f64() {
                        stats.sum += n;
                    }
                    merge_min_max(&mut stats, value);
                }
            }
            fields.insert(field.clone(), stats);
        }

        Ok(StatsResponse {
            doc_count: docs.len() as u64,
            fields,
        })
    }

    async fn facet_groups(&self, req: &FacetRequest) -> TransportResult<FacetResponse> {
        self.record(RecordedRequest::Facets(req.clone()));
        let docs = self.docs.read();

        let mut grouped: Vec<(Vec<Value>, Vec<&Row>)> = Vec::new();
        for doc in docs.iter() {
            let key: Vec<Value> = req
                .buckets
                .iter()
                .map(|f| doc.get(f).cloned().unwrap_or(Value::Null))
                .collect();
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(doc),
                None => grouped.push((key, vec![doc])),
            }
        }

        match req.order {
            // Natural per-group order: count descending, key ascending ties.
            FacetOrder::Natural => grouped.sort_by(|(ka, a), (kb, b)| {
                b.len().cmp(&a.len()).then_with(|| compare_keys(ka, kb))
            }),
            FacetOrder::KeyAsc => grouped.sort_by(|(ka, _), (kb, _)| compare_keys(ka, kb)),
        }
        grouped.truncate(req.limit as usize);

        let groups = grouped
            .into_iter()
            .map(|(key, members)| {
                let mut row = Row::new();
                for (field, value) in req.buckets.iter().zip(key) {
                    row.set(field.clone(), value);
                }
                row.set("count(*)", Value::Int(members.len() as i64));
                for metric in &req.metrics {
                    row.set(metric.output_column(), compute_metric(&members, metric));
                }
                row
            })
            .collect();
        Ok(FacetResponse { groups })
    }

    async fn time_buckets(&self, req: &TimeBucketRequest) -> TransportResult<TimeBucketResponse> {
        self.record(RecordedRequest::TimeBuckets(req.clone()));
        let start = parse_instant(&req.start)
            .ok_or_else(|| TransportError::Rejected(format!("bad range start {:?}", req.start)))?;
        let end = parse_instant(&req.end)
            .ok_or_else(|| TransportError::Rejected(format!("bad range end {:?}", req.end)))?;

        let docs = self.docs.read();
        let mut buckets = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let next = step_gap(cursor, &req.gap)?;
            let members: Vec<&Row> = docs
                .iter()
                .filter(|doc| {
                    doc.get(&req.field)
                        .and_then(|v| match v {
                            Value::Text(s) => parse_instant(s),
                            _ => None,
                        })
                        .map(|t| t >= cursor && t < next)
                        .unwrap_or(false)
                })
                .collect();

            let metrics = req
                .metrics
                .iter()
                .map(|m| (m.output_column(), compute_metric(&members, m)))
                .collect();
            buckets.push(TimeBucket {
                start: cursor.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                count: members.len() as u64,
                metrics,
            });
            cursor = next;
        }
        Ok(TimeBucketResponse { buckets })
    }
}

fn partition_slot(doc: &Row, keys: &[String], total: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    for key in keys {
        match doc.get(key) {
            Some(value) => value.to_string().hash(&mut hasher),
            None => "".hash(&mut hasher),
        }
    }
    (hasher.finish() % total as u64) as usize
}

fn compare_keys(a: &[Value], b: &[Value]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = x.compare(y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

fn merge_min_max(stats: &mut FieldStats, value: &Value) {
    match &stats.min {
        None => stats.min = Some(value.clone()),
        Some(m) if value.compare(m) == std::cmp::Ordering::Less => stats.min = Some(value.clone()),
        _ => {}
    }
    match &stats.max {
        None => stats.max = Some(value.clone()),
        Some(m) if value.compare(m) == std::cmp::Ordering::Greater => {
            stats.max = Some(value.clone())
        }
        _ => {}
    }
}

fn compute_metric(members: &[&Row], metric: &MetricSpec) -> Value {
    let numbers: Vec<f64> = members
        .iter()
        .filter_map(|doc| doc.get(&metric.field).and_then(Value::as_f64))
        .collect();
    match metric.function {
        AggregateFunction::Count => Value::Int(members.len() as i64),
        AggregateFunction::Sum => Value::Float(numbers.iter().sum()),
        AggregateFunction::Avg => {
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFunction::Min => numbers
            .iter()
            .copied()
            .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.min(n))))
            .map_or(Value::Null, Value::Float),
        AggregateFunction::Max => numbers
            .iter()
            .copied()
            .fold(None::<f64>, |acc, n| Some(acc.map_or(n, |a| a.max(n))))
            .map_or(Value::Null, Value::Float),
    }
}

/// Parse an ISO-8601 instant or plain date, UTC
fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim().trim_matches(|c| c == '\'' || c == '"');
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

fn step_gap(from: DateTime<Utc>, gap: &str) -> TransportResult<DateTime<Utc>> {
    let stepped = match gap {
        "+1DAY" => from.checked_add_days(Days::new(1)),
        "+1MONTH" => from.checked_add_months(Months::new(1)),
        "+1YEAR" => from.checked_add_months(Months::new(12)),
        other => return Err(TransportError::Rejected(format!("unsupported gap {other:?}"))),
    };
    stepped.ok_or_else(|| TransportError::Rejected("gap step overflow".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SortDirection;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }

    fn doc(owner: &str, size: i64) -> Row {
        Row::new()
            .with("owner", Value::text(owner))
            .with("size", Value::Int(size))
    }

    #[test]
    fn test_shard_search_sorts_and_limits() {
        let stub = StubIndex::new();
        stub.add_document(doc("zoe", 3));
        stub.add_document(doc("amy", 1));
        stub.add_document(doc("mia", 2));

        let shard = Shard {
            id: 0,
            replicas: vec!["local".into()],
        };
        let req = SearchRequest {
            query: "*:*".into(),
            fields: vec!["owner".into()],
            sort: vec![("owner".into(), SortDirection::Asc)],
            limit: Some(2),
        };
        let mut stream = block_on(stub.shard_search(&shard, &req)).unwrap();
        let first = stream.next_row().unwrap().unwrap();
        assert_eq!(first.get("owner"), Some(&Value::text("amy")));
        assert!(stream.next_row().unwrap().is_some());
        assert!(stream.next_row().unwrap().is_none());
    }

    #[test]
    fn test_partition_search_covers_key_space() {
        let stub = StubIndex::new();
        for i in 0..20 {
            stub.add_document(doc(&format!("user{i}"), i));
        }
        let req = SearchRequest::default();
        let total: usize = (0..4)
            .map(|index| {
                let partition = Partition {
                    index,
                    total: 4,
                    keys: vec!["owner".into()],
                };
                let mut stream = block_on(stub.partition_search(&req, &partition)).unwrap();
                let mut n = 0;
                while stream.next_row().unwrap().is_some() {
                    n += 1;
                }
                n
            })
            .sum();
        assert_eq!(total, 20);
    }

    #[test]
    fn test_facet_groups_natural_order_is_count_desc() {
        let stub = StubIndex::new();
        stub.add_document(doc("amy", 1));
        stub.add_document(doc("amy", 2));
        stub.add_document(doc("zoe", 3));

        let req = FacetRequest {
            query: "*:*".into(),
            buckets: vec!["owner".into()],
            metrics: vec![],
            limit: 10,
            order: FacetOrder::Natural,
        };
        let response = block_on(stub.facet_groups(&req)).unwrap();
        assert_eq!(response.groups.len(), 2);
        assert_eq!(response.groups[0].get("owner"), Some(&Value::text("amy")));
        assert_eq!(response.groups[0].get("count(*)"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_time_buckets_cover_window() {
        let stub = StubIndex::new();
        stub.add_document(Row::new().with("created", Value::text("2026-03-02T10:00:00Z")));
        stub.add_document(Row::new().with("created", Value::text("2026-03-02T23:00:00Z")));
        stub.add_document(Row::new().with("created", Value::text("2026-03-04T00:00:00Z")));

        let req = TimeBucketRequest {
            query: "*:*".into(),
            field: "created".into(),
            start: "2026-03-01T00:00:00Z".into(),
            end: "2026-03-05T00:00:00Z".into(),
            gap: "+1DAY".into(),
            metrics: vec![],
        };
        let response = block_on(stub.time_buckets(&req)).unwrap();
        assert_eq!(response.buckets.len(), 4);
        assert_eq!(response.buckets[1].count, 2);
        assert_eq!(response.buckets[3].count, 1);
        assert_eq!(response.buckets[0].start, "2026-03-01T00:00:00Z");
    }

    #[test]
    fn test_failing_shard_yields_terminal_error_stream() {
        let stub = StubIndex::with_shards(2);
        stub.fail_shard(1);
        let shard = Shard {
            id: 1,
            replicas: vec!["local".into()],
        };
        let mut stream =
            block_on(stub.shard_search(&shard, &SearchRequest::default())).unwrap();
        assert!(stream.next_row().is_err());
    }
}
