//! Virtual table schema discovery
//!
//! The SQL front end queries a single virtual table whose columns this
//! module assembles from four sources: fields observed in the index,
//! administrator-configured fields, fields referenced by the query's own
//! predicate text, and the fixed default-column catalog. Date-typed fields
//! additionally publish day/month/year virtual columns usable as
//! time-grain grouping keys.
//!
//! The schema is built once per query context and is immutable afterwards.

pub mod catalog;
pub mod predicate_scan;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

pub use catalog::{DEFAULT_COLUMNS, IDENTIFIER_COLUMN, QUERY_COLUMN, SCORE_COLUMN};

/// Logical column type exposed to the SQL front end
///
/// Deliberately small: everything string-like is text, and date/time
/// storage types stay text too. Timestamps remain opaque ISO-8601 strings,
/// with all calendar arithmetic deferred to the bucket/window logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    /// UTF-8 text
    Text,
    /// 64-bit signed integer
    Int64,
    /// 64-bit float
    Float64,
}

/// Calendar part a virtual time column represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeVariant {
    /// Not a virtual time column
    None,
    /// Calendar day (`yyyy-MM-dd`)
    Day,
    /// Calendar month (`yyyy-MM`)
    Month,
    /// Calendar year (`yyyy`)
    Year,
}

impl TimeVariant {
    /// The column-name suffix for this variant
    pub fn suffix(self) -> &'static str {
        match self {
            TimeVariant::None => "",
            TimeVariant::Day => "_day",
            TimeVariant::Month => "_month",
            TimeVariant::Year => "_year",
        }
    }
}

/// Split a column name into its base and time-variant suffix, if any
///
/// `created_day` → `("created", Day)`. Names without a recognized suffix
/// return `None`.
pub fn split_time_suffix(name: &str) -> Option<(&str, TimeVariant)> {
    for variant in [TimeVariant::Day, TimeVariant::Month, TimeVariant::Year] {
        if let Some(base) = name.strip_suffix(variant.suffix()) {
            if !base.is_empty() {
                return Some((base, variant));
            }
        }
    }
    None
}

/// One column of the virtual table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    /// Published column name
    pub name: String,
    /// Underlying storage field this column resolves to
    pub source: String,
    /// Logical type exposed upstream
    pub logical_type: LogicalType,
    /// Always true: the index never guarantees field presence
    pub nullable: bool,
    /// Which calendar part this column carries, if virtual
    pub time_variant: TimeVariant,
}

impl SchemaColumn {
    fn new(name: impl Into<String>, source: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            logical_type,
            nullable: true,
            time_variant: TimeVariant::None,
        }
    }

    fn virtual_time(base: &SchemaColumn, variant: TimeVariant) -> Self {
        Self {
            name: format!("{}{}", base.name, variant.suffix()),
            source: base.source.clone(),
            logical_type: LogicalType::Text,
            nullable: true,
            time_variant: variant,
        }
    }
}

/// Rewrite a namespaced field name (`ns:local`) to its formatted spelling
/// (`ns_local`). Names without a namespace come back unchanged.
pub fn format_name(name: &str) -> String {
    name.replace(':', "_")
}

/// Resolve an index-reported storage type to a logical type
///
/// Unknown storage types fall back to text, an explicit policy rather than
/// an error: the index is free to grow types this translator has never seen.
pub fn resolve_storage_type(storage_type: &str) -> LogicalType {
    match storage_type.to_ascii_lowercase().as_str() {
        "string" | "text" | "content" | "identifier" | "category" | "boolean" => LogicalType::Text,
        "int" | "integer" | "long" => LogicalType::Int64,
        "float" | "double" => LogicalType::Float64,
        "date" | "datetime" => LogicalType::Text,
        other => {
            warn!(storage_type = other, "unknown storage type, treating as text");
            LogicalType::Text
        }
    }
}

/// Whether an index-reported storage type is a date/time type
pub fn is_date_type(storage_type: &str) -> bool {
    matches!(
        storage_type.to_ascii_lowercase().as_str(),
        "date" | "datetime"
    )
}

/// Assembles the virtual table's column list
///
/// Stateless; the per-context caching of the built schema lives with the
/// query context that owns the index handle.
#[derive(Debug, Default)]
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Build the ordered column list for one query context
    ///
    /// `observed` and `configured` map field names to index storage types;
    /// `predicate_fields` seeds otherwise-unobservable fields referenced by
    /// the query's WHERE text (published as text, since their storage type
    /// is unknown). When `select_all` is set the result is filtered against
    /// the configured set and the default catalog, and catalog columns that
    /// discovery never produced are backfilled, so `select *` always
    /// publishes the full default surface.
    pub fn build(
        observed: &HashMap<String, String>,
        configured: &HashMap<String, String>,
        predicate_fields: &HashSet<String>,
        select_all: bool,
    ) -> Vec<SchemaColumn> {
        let mut columns: Vec<SchemaColumn> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let mut observed_names: Vec<&String> = observed.keys().collect();
        observed_names.sort();
        for name in observed_names {
            push_field(&mut columns, &mut seen, name, Some(observed[name].as_str()));
        }

        let mut configured_names: Vec<&String> = configured.keys().collect();
        configured_names.sort();
        for name in configured_names {
            push_field(&mut columns, &mut seen, name, Some(configured[name].as_str()));
        }

        let mut predicate_names: Vec<&String> = predicate_fields.iter().collect();
        predicate_names.sort();
        for name in predicate_names {
            push_field(&mut columns, &mut seen, name, None);
        }

        if select_all {
            let keep: HashSet<String> = configured
                .keys()
                .map(|name| format_name(name))
                .collect();
            columns.retain(|col| {
                let formatted = format_name(&col.name);
                keep.contains(&formatted) || catalog::in_catalog(&formatted)
            });

            let present: HashSet<String> =
                columns.iter().map(|col| format_name(&col.name)).collect();
            for (name, logical_type) in DEFAULT_COLUMNS {
                if !present.contains(&format_name(name)) {
                    columns.push(SchemaColumn::new(*name, *name, *logical_type));
                }
            }
        }

        columns.push(SchemaColumn::new(
            QUERY_COLUMN,
            QUERY_COLUMN,
            LogicalType::Text,
        ));
        columns.push(SchemaColumn::new(
            SCORE_COLUMN,
            SCORE_COLUMN,
            LogicalType::Float64,
        ));
        columns
    }

    /// Look up a column by exact (case-sensitive) name
    ///
    /// Select-list resolution is case-sensitive while predicate-side
    /// matching is not; that asymmetry is observed behavior and kept.
    pub fn find<'a>(columns: &'a [SchemaColumn], name: &str) -> Option<&'a SchemaColumn> {
        columns.iter().find(|col| col.name == name)
    }
}

/// Publish one field: the raw column, its day/month/year virtuals when
/// date-typed, and the formatted alias (with the same suffix rule) when the
/// formatted spelling differs from the raw name.
fn push_field(
    columns: &mut Vec<SchemaColumn>,
    seen: &mut HashSet<String>,
    name: &str,
    storage_type: Option<&str>,
) {
    if !seen.insert(name.to_string()) {
        return;
    }

    let logical_type = storage_type.map_or(LogicalType::Text, resolve_storage_type);
    let date_typed = storage_type.is_some_and(is_date_type);

    let raw = SchemaColumn::new(name, name, logical_type);
    let mut emitted = vec![raw.clone()];
    if date_typed {
        for variant in [TimeVariant::Day, TimeVariant::Month, TimeVariant::Year] {
            emitted.push(SchemaColumn::virtual_time(&raw, variant));
        }
    }

    let formatted = format_name(name);
    if formatted != name {
        let alias = SchemaColumn::new(formatted, name, logical_type);
        let mut alias_cols = vec![alias.clone()];
        if date_typed {
            for variant in [TimeVariant::Day, TimeVariant::Month, TimeVariant::Year] {
                alias_cols.push(SchemaColumn::virtual_time(&alias, variant));
            }
        }
        emitted.extend(alias_cols);
    }

    for col in emitted {
        if seen.insert(col.name.clone()) || col.name == name {
            columns.push(col);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed(fields: &[(&str, &str)]) -> HashMap<String, String> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn names(columns: &[SchemaColumn]) -> Vec<&str> {
        columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_plain_discovery_with_fixed_tail() {
        let cols = SchemaBuilder::build(
            &observed(&[("owner", "string"), ("size", "long")]),
            &HashMap::new(),
            &HashSet::new(),
            false,
        );
        assert_eq!(names(&cols), vec!["owner", "size", "_query_", "score"]);
        assert_eq!(cols[1].logical_type, LogicalType::Int64);
        assert_eq!(cols[3].logical_type, LogicalType::Float64);
        assert!(cols.iter().all(|c| c.nullable));
    }

    #[test]
    fn test_date_field_gets_time_virtuals() {
        let cols = SchemaBuilder::build(
            &observed(&[("created", "datetime")]),
            &HashMap::new(),
            &HashSet::new(),
            false,
        );
        assert_eq!(
            names(&cols),
            vec![
                "created",
                "created_day",
                "created_month",
                "created_year",
                "_query_",
                "score"
            ]
        );
        assert_eq!(cols[0].logical_type, LogicalType::Text);
        assert_eq!(cols[1].time_variant, TimeVariant::Day);
        assert_eq!(cols[1].source, "created");
    }

    #[test]
    fn test_namespaced_field_gets_formatted_alias() {
        let cols = SchemaBuilder::build(
            &observed(&[("cm:created", "date")]),
            &HashMap::new(),
            &HashSet::new(),
            false,
        );
        let n = names(&cols);
        assert!(n.contains(&"cm:created"));
        assert!(n.contains(&"cm:created_day"));
        assert!(n.contains(&"cm_created"));
        assert!(n.contains(&"cm_created_month"));
        // Both spellings resolve to the same storage field.
        let alias = SchemaBuilder::find(&cols, "cm_created").unwrap();
        assert_eq!(alias.source, "cm:created");
    }

    #[test]
    fn test_predicate_fields_publish_as_text() {
        let mut predicate_fields = HashSet::new();
        predicate_fields.insert("custom".to_string());
        let cols =
            SchemaBuilder::build(&HashMap::new(), &HashMap::new(), &predicate_fields, false);
        let custom = SchemaBuilder::find(&cols, "custom").unwrap();
        assert_eq!(custom.logical_type, LogicalType::Text);
        assert_eq!(custom.time_variant, TimeVariant::None);
    }

    #[test]
    fn test_select_all_filters_to_catalog_and_backfills() {
        let cols = SchemaBuilder::build(
            &observed(&[("cm:created", "datetime"), ("custom", "string")]),
            &HashMap::new(),
            &HashSet::new(),
            true,
        );
        let n = names(&cols);
        // Non-default discovered fields are excluded.
        assert!(!n.contains(&"custom"));
        // Synthesized time variants drop out under select-all.
        assert!(!n.contains(&"cm_created_day"));
        // The discovered catalog field survives in both spellings.
        assert!(n.contains(&"cm:created"));
        assert!(n.contains(&"cm_created"));
        // Catalog columns discovery never produced are backfilled.
        assert!(n.contains(&"DBID"));
        assert!(n.contains(&"cm:owner"));
        assert!(n.contains(&"TYPE"));
        // Fixed tail is always present.
        assert!(n.contains(&"_query_"));
        assert!(n.contains(&"score"));
    }

    #[test]
    fn test_select_all_keeps_configured_fields() {
        let cols = SchemaBuilder::build(
            &observed(&[("acme:rating", "float")]),
            &observed(&[("acme:rating", "float")]),
            &HashSet::new(),
            true,
        );
        let n = names(&cols);
        assert!(n.contains(&"acme:rating"));
        assert!(n.contains(&"acme_rating"));
    }

    #[test]
    fn test_unknown_storage_type_falls_back_to_text() {
        assert_eq!(resolve_storage_type("geopoint"), LogicalType::Text);
    }

    #[test]
    fn test_split_time_suffix() {
        assert_eq!(
            split_time_suffix("created_day"),
            Some(("created", TimeVariant::Day))
        );
        assert_eq!(
            split_time_suffix("cm_created_year"),
            Some(("cm_created", TimeVariant::Year))
        );
        assert_eq!(split_time_suffix("owner"), None);
        assert_eq!(split_time_suffix("_day"), None);
    }

    #[test]
    fn test_find_is_case_sensitive() {
        let cols = SchemaBuilder::build(
            &observed(&[("Owner", "string")]),
            &HashMap::new(),
            &HashSet::new(),
            false,
        );
        assert!(SchemaBuilder::find(&cols, "Owner").is_some());
        assert!(SchemaBuilder::find(&cols, "owner").is_none());
    }
}
