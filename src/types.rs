//! Core data types used throughout the translator
//!
//! This module defines the fundamental data structures shared across the
//! schema, search, and query layers:
//!
//! # Key Types
//!
//! - **`Value`**: A single typed field value (text, integer, float, or null)
//! - **`Row`**: A sparse document row keyed by column name
//! - **`SortDirection`**: Ascending/descending marker for orderings
//! - **`Shard`** / **`ShardTopology`**: Read-only view of the index cluster
//!
//! # Example
//!
//! ```rust
//! use shardql::types::{Row, Value};
//!
//! let mut row = Row::new();
//! row.set("cm:owner", Value::text("jsmith"));
//! assert_eq!(row.get("cm:owner"), Some(&Value::text("jsmith")));
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// A single typed field value
///
/// Documents in the index are sparse and loosely typed; every value the
/// translator handles is one of these three scalar shapes or null. Date and
/// time fields stay `Text` by design (opaque ISO-8601 strings) so that all
/// calendar arithmetic happens in the bucket/window logic rather than by
/// numeric comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent or explicitly null value
    Null,
    /// UTF-8 text (also carries dates and identifiers)
    Text(String),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit float
    Float(f64),
}

impl Value {
    /// Convenience constructor for text values
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Interpret the value as a float where possible
    ///
    /// Integers widen; text parses when it is a plain number. Used by the
    /// having evaluator and aggregate folding, where the index hands back
    /// numeric results in whichever shape its codec chose.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Total order over values used by merge and ranking comparators
    ///
    /// Null sorts first; numbers compare cross-type (`Int` vs `Float`);
    /// text compares lexicographically. Mixed text/number falls back to the
    /// textual rendering so the order is still total.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => total_f64(*a as f64, *b),
            (Value::Float(a), Value::Int(b)) => total_f64(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => total_f64(*a, *b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (a, b) => a.to_string().cmp(&b.to_string()),
        }
    }

    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn total_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Text(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A sparse document row keyed by column name
///
/// Rows flow from the index boundary through the operator chain to the
/// client-facing cursor. Column order for presentation comes from the
/// published schema, not from the row itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: HashMap<String, Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field value
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Builder-style field setter
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Number of populated fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over populated fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Sort direction for an ordering entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order
    Asc,
    /// Descending order
    Desc,
}

impl SortDirection {
    /// Apply the direction to an ascending comparison result
    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// Aggregate function accepted from the SQL front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    /// Row count
    Count,
    /// Numeric sum
    Sum,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Arithmetic mean
    Avg,
}

impl AggregateFunction {
    /// Parse the front end's raw function token (case-insensitive)
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "avg" => Some(AggregateFunction::Avg),
            _ => None,
        }
    }

    /// Lowercase name used in output column labels
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
        }
    }

    /// Output column label for this function over a field
    ///
    /// Matches the label the front end projects, e.g. `count(*)` or
    /// `sum(cm:content.size)`.
    pub fn output_column(self, field: &str) -> String {
        format!("{}({})", self.name(), field)
    }
}

/// Compares rows by an ordered list of (field, direction) keys
///
/// The single comparator shared by merge, ranking, and duplicate
/// elimination; missing fields compare as null (first).
#[derive(Debug, Clone)]
pub struct RowComparator {
    keys: Vec<(String, SortDirection)>,
}

impl RowComparator {
    /// Comparator over explicit (field, direction) keys
    pub fn new(keys: Vec<(String, SortDirection)>) -> Self {
        Self { keys }
    }

    /// Ascending comparator over a plain field list
    pub fn ascending(fields: &[String]) -> Self {
        Self {
            keys: fields
                .iter()
                .map(|f| (f.clone(), SortDirection::Asc))
                .collect(),
        }
    }

    /// The ordered comparison keys
    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Compare two rows by the configured keys
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for (field, direction) in &self.keys {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ord = direction.apply(left.compare(right));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// A single shard of the document index with its replica endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Stable shard identifier
    pub id: u32,
    /// Replica endpoints able to answer for this shard
    pub replicas: Vec<String>,
}

/// Read-only view of the index cluster layout
///
/// Shared across query contexts; never mutated by the translator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardTopology {
    /// All shards in the cluster, in stable order
    pub shards: Vec<Shard>,
}

impl ShardTopology {
    /// Topology with `n` single-replica shards, for embedded and test setups
    pub fn single_node(n: u32) -> Self {
        Self {
            shards: (0..n)
                .map(|id| Shard {
                    id,
                    replicas: vec![format!("local-{id}")],
                })
                .collect(),
        }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compare_nulls_first() {
        assert_eq!(Value::Null.compare(&Value::Int(0)), Ordering::Less);
        assert_eq!(Value::Int(0).compare(&Value::Null), Ordering::Greater);
        assert_eq!(Value::Null.compare(&Value::Null), Ordering::Equal);
    }

    #[test]
    fn test_value_compare_cross_numeric() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.0).compare(&Value::Int(3)), Ordering::Equal);
    }

    #[test]
    fn test_value_as_f64() {
        assert_eq!(Value::Int(7).as_f64(), Some(7.0));
        assert_eq!(Value::text("2.5").as_f64(), Some(2.5));
        assert_eq!(Value::text("abc").as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_row_round_trip() {
        let row = Row::new()
            .with("a", Value::Int(1))
            .with("b", Value::text("x"));
        assert_eq!(row.get("a"), Some(&Value::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_sort_direction_apply() {
        assert_eq!(SortDirection::Asc.apply(Ordering::Less), Ordering::Less);
        assert_eq!(SortDirection::Desc.apply(Ordering::Less), Ordering::Greater);
    }

    #[test]
    fn test_single_node_topology() {
        let topo = ShardTopology::single_node(3);
        assert_eq!(topo.shard_count(), 3);
        assert_eq!(topo.shards[2].id, 2);
    }

    #[test]
    fn test_aggregate_function_parse() {
        assert_eq!(AggregateFunction::parse("COUNT"), Some(AggregateFunction::Count));
        assert_eq!(AggregateFunction::parse("avg"), Some(AggregateFunction::Avg));
        assert_eq!(AggregateFunction::parse("median"), None);
    }

    #[test]
    fn test_aggregate_output_column() {
        assert_eq!(AggregateFunction::Count.output_column("*"), "count(*)");
        assert_eq!(AggregateFunction::Sum.output_column("size"), "sum(size)");
    }

    #[test]
    fn test_row_comparator_multi_key() {
        let cmp = RowComparator::new(vec![
            ("a".to_string(), SortDirection::Asc),
            ("b".to_string(), SortDirection::Desc),
        ]);
        let r1 = Row::new().with("a", Value::Int(1)).with("b", Value::Int(5));
        let r2 = Row::new().with("a", Value::Int(1)).with("b", Value::Int(9));
        let r3 = Row::new().with("a", Value::Int(2)).with("b", Value::Int(0));
        assert_eq!(cmp.compare(&r1, &r2), Ordering::Greater); // b desc
        assert_eq!(cmp.compare(&r1, &r3), Ordering::Less);
        assert_eq!(cmp.compare(&r1, &r1), Ordering::Equal);
    }

    #[test]
    fn test_row_comparator_missing_field_sorts_first() {
        let cmp = RowComparator::ascending(&["k".to_string()]);
        let with = Row::new().with("k", Value::Int(0));
        let without = Row::new();
        assert_eq!(cmp.compare(&without, &with), Ordering::Less);
    }
}
