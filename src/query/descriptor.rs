//! Bound query descriptor
//!
//! The contract with the external SQL front end: a query that has already
//! been parsed and validated, reduced to the fields this translator needs
//! to choose and assemble an execution strategy. Everything here is data;
//! interpretation happens in the planner.

use crate::schema::QUERY_COLUMN;
use crate::types::SortDirection;
use serde::{Deserialize, Serialize};

/// How grouped aggregation work is distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Delegate aggregation to the index cluster
    #[default]
    Pushdown,
    /// Partition across parallel workers and merge sorted partials centrally
    SortMerge,
}

/// One (function, field) aggregate requested by the front end
///
/// The function arrives as the front end's raw token and is validated at
/// planning time, so an unknown function is a pre-dispatch rejection rather
/// than a construction failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSpec {
    /// Raw function token (`COUNT`, `SUM`, `MIN`, `MAX`, `AVG`)
    pub function: String,
    /// Field to aggregate over (`*` only for COUNT)
    pub field: String,
}

impl AggregateSpec {
    /// Convenience constructor
    pub fn new(function: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            field: field.into(),
        }
    }
}

/// Declared type of a projected field, as the front end bound it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeclaredType {
    /// Text / unspecified
    #[default]
    Text,
    /// 64-bit integer
    Int64,
    /// 64-bit float
    Float64,
}

/// A bound relational query over the virtual table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Projected fields in declaration order
    pub fields: Vec<(String, DeclaredType)>,
    /// Opaque index query string; may embed the raw-subquery escape token
    pub predicate: String,
    /// Requested orderings in declaration order
    pub orderings: Vec<(String, SortDirection)>,
    /// Grouping fields ("buckets") in declaration order
    pub buckets: Vec<String>,
    /// Requested aggregates in declaration order
    pub aggregates: Vec<AggregateSpec>,
    /// Optional row limit
    pub limit: Option<u64>,
    /// Negate the whole predicate
    pub negate_predicate: bool,
    /// Opaque boolean expression over aggregate outputs
    pub having: Option<String>,
    /// FilterCodec-encoded range-filter metadata
    pub filter_data: Option<String>,
    /// How grouped aggregation is executed
    pub execution_mode: ExecutionMode,
    /// `select *`: projection is replaced by the discovered schema plus the
    /// identifier column
    pub select_all: bool,
    /// Raw SQL text, used only to seed schema discovery with
    /// predicate-referenced fields
    pub raw_sql: Option<String>,
}

impl QueryDescriptor {
    /// Start building a descriptor
    pub fn builder() -> QueryDescriptorBuilder {
        QueryDescriptorBuilder::default()
    }

    /// The effective native query for index requests
    ///
    /// An empty predicate matches everything. The escape token
    /// `_query_:"<raw>"` replaces the whole predicate with `<raw>` verbatim;
    /// unwrapping happens before negation, so a negated escaped predicate
    /// negates the raw query.
    pub fn native_query(&self) -> String {
        let effective = unwrap_escape(self.predicate.trim());
        let effective = if effective.is_empty() {
            "*:*"
        } else {
            effective
        };
        if self.negate_predicate {
            format!("-({effective})")
        } else {
            effective.to_string()
        }
    }
}

/// Unwrap the raw-subquery escape token, if present
fn unwrap_escape(predicate: &str) -> &str {
    let prefix = format!("{QUERY_COLUMN}:\"");
    if let Some(rest) = predicate.strip_prefix(prefix.as_str()) {
        if let Some(raw) = rest.strip_suffix('"') {
            return raw;
        }
    }
    predicate
}

/// Builder for [`QueryDescriptor`]
#[derive(Debug, Default)]
pub struct QueryDescriptorBuilder {
    descriptor: QueryDescriptor,
}

impl QueryDescriptorBuilder {
    /// Add a projected field
    pub fn field(mut self, name: impl Into<String>, declared: DeclaredType) -> Self {
        self.descriptor.fields.push((name.into(), declared));
        self
    }

    /// Set the predicate string
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.descriptor.predicate = predicate.into();
        self
    }

    /// Add an ordering
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.descriptor.orderings.push((field.into(), direction));
        self
    }

    /// Add a grouping field
    pub fn bucket(mut self, field: impl Into<String>) -> Self {
        self.descriptor.buckets.push(field.into());
        self
    }

    /// Add an aggregate
    pub fn aggregate(mut self, function: impl Into<String>, field: impl Into<String>) -> Self {
        self.descriptor
            .aggregates
            .push(AggregateSpec::new(function, field));
        self
    }

    /// Set the row limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.descriptor.limit = Some(limit);
        self
    }

    /// Negate the predicate
    pub fn negate(mut self) -> Self {
        self.descriptor.negate_predicate = true;
        self
    }

    /// Set the having expression
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.descriptor.having = Some(having.into());
        self
    }

    /// Set encoded filter metadata
    pub fn filter_data(mut self, encoded: impl Into<String>) -> Self {
        self.descriptor.filter_data = Some(encoded.into());
        self
    }

    /// Set the execution mode
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.descriptor.execution_mode = mode;
        self
    }

    /// Mark as `select *`
    pub fn select_all(mut self) -> Self {
        self.descriptor.select_all = true;
        self
    }

    /// Attach the raw SQL text for predicate-field discovery
    pub fn raw_sql(mut self, sql: impl Into<String>) -> Self {
        self.descriptor.raw_sql = Some(sql.into());
        self
    }

    /// Finish building
    pub fn build(self) -> QueryDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_predicate_matches_all() {
        let d = QueryDescriptor::builder().build();
        assert_eq!(d.native_query(), "*:*");
    }

    #[test]
    fn test_escape_token_unwraps_verbatim() {
        let d = QueryDescriptor::builder()
            .predicate(r#"_query_:"owner:jsmith AND +size:[0 TO 10]""#)
            .build();
        assert_eq!(d.native_query(), "owner:jsmith AND +size:[0 TO 10]");
    }

    #[test]
    fn test_negation_wraps_after_unwrapping() {
        let d = QueryDescriptor::builder()
            .predicate(r#"_query_:"owner:jsmith""#)
            .negate()
            .build();
        assert_eq!(d.native_query(), "-(owner:jsmith)");
    }

    #[test]
    fn test_plain_predicate_passes_through() {
        let d = QueryDescriptor::builder().predicate("owner:jsmith").build();
        assert_eq!(d.native_query(), "owner:jsmith");
    }

    #[test]
    fn test_unterminated_escape_is_not_unwrapped() {
        let d = QueryDescriptor::builder()
            .predicate(r#"_query_:"dangling"#)
            .build();
        assert_eq!(d.native_query(), r#"_query_:"dangling"#);
    }
}
