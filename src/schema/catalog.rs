//! Fixed default-column catalog
//!
//! The closed list of identity, audit, and classification columns every
//! deployment exposes. `select *` queries are filtered against this catalog
//! (plus administrator-configured fields) so the virtual table keeps a
//! stable, bounded surface regardless of what ad-hoc fields the index has
//! accumulated.

use crate::schema::LogicalType;

/// Column name for the raw native sub-query escape field
pub const QUERY_COLUMN: &str = "_query_";

/// Column name for the relevance score field
pub const SCORE_COLUMN: &str = "score";

/// Identifier column appended to select-all projections
pub const IDENTIFIER_COLUMN: &str = "DBID";

/// The default column catalog, in publication order
///
/// A static ordered list of (name, logical type) constants. Namespaced
/// entries match discovered columns by either their raw (`ns:local`) or
/// formatted (`ns_local`) spelling.
pub const DEFAULT_COLUMNS: &[(&str, LogicalType)] = &[
    (IDENTIFIER_COLUMN, LogicalType::Int64),
    ("cm:name", LogicalType::Text),
    ("cm:title", LogicalType::Text),
    ("cm:description", LogicalType::Text),
    ("cm:created", LogicalType::Text),
    ("cm:creator", LogicalType::Text),
    ("cm:modified", LogicalType::Text),
    ("cm:modifier", LogicalType::Text),
    ("cm:owner", LogicalType::Text),
    ("TYPE", LogicalType::Text),
    ("SITE", LogicalType::Text),
    ("ASPECT", LogicalType::Text),
];

/// Whether a formatted column name matches a catalog entry
pub fn in_catalog(formatted_name: &str) -> bool {
    DEFAULT_COLUMNS
        .iter()
        .any(|(name, _)| crate::schema::format_name(name) == formatted_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_matches_both_spellings() {
        assert!(in_catalog("cm_created"));
        assert!(in_catalog("TYPE"));
        assert!(!in_catalog("cm_created_day"));
        assert!(!in_catalog("custom_field"));
    }

    #[test]
    fn test_identifier_column_is_listed_first() {
        assert_eq!(DEFAULT_COLUMNS[0].0, IDENTIFIER_COLUMN);
        assert_eq!(DEFAULT_COLUMNS[0].1, LogicalType::Int64);
    }
}
