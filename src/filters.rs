//! Range-filter metadata codec
//!
//! Per-field range filters (bound value plus inclusive/exclusive markers)
//! travel between the SQL front end and this translator as a compact string.
//! The grammar is fixed for interoperability with previously-encoded strings:
//!
//! ```text
//! filter-data = entry *( "#-#" entry )
//! entry       = field "#=#" body
//! body        = marker "~" start "~" marker "~" end
//! marker      = "i" | "e"            ; inclusive / exclusive
//! start, end  = "*" | literal        ; "*" marks an open bound
//! ```
//!
//! The open-bound marker keeps an absent bound distinct from an empty
//! string literal. Decoding is strict: empty input yields an empty mapping,
//! and any malformed entry is a [`FilterCodecError`].

use crate::error::FilterCodecError;
use std::collections::HashMap;

/// Record separator between encoded filter entries
pub const RECORD_SEPARATOR: &str = "#-#";

/// Separator between a field name and its filter body
pub const FIELD_SEPARATOR: &str = "#=#";

/// Separator between the four body tokens
const TOKEN_SEPARATOR: char = '~';

/// Marker for an open (absent) bound
const OPEN_BOUND: &str = "*";

/// One edge of a range filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// No bound on this edge
    Open,
    /// A literal bound value (may be the empty string)
    Literal(String),
}

impl Bound {
    /// The literal value, if the bound is closed
    pub fn literal(&self) -> Option<&str> {
        match self {
            Bound::Open => None,
            Bound::Literal(v) => Some(v.as_str()),
        }
    }

    fn encode(&self) -> &str {
        match self {
            Bound::Open => OPEN_BOUND,
            Bound::Literal(v) => v.as_str(),
        }
    }

    fn decode(token: &str) -> Self {
        if token == OPEN_BOUND {
            Bound::Open
        } else {
            Bound::Literal(token.to_string())
        }
    }
}

/// Range filter for a single field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    /// Lower edge of the range
    pub start: Bound,
    /// Upper edge of the range
    pub end: Bound,
    /// Whether the lower edge is inclusive (default true)
    pub include_start: bool,
    /// Whether the upper edge is inclusive (default true)
    pub include_end: bool,
}

impl Default for FieldFilter {
    fn default() -> Self {
        Self {
            start: Bound::Open,
            end: Bound::Open,
            include_start: true,
            include_end: true,
        }
    }
}

impl FieldFilter {
    /// Filter with only a lower bound
    pub fn from_start(value: impl Into<String>, inclusive: bool) -> Self {
        Self {
            start: Bound::Literal(value.into()),
            include_start: inclusive,
            ..Self::default()
        }
    }

    /// Filter with only an upper bound
    pub fn from_end(value: impl Into<String>, inclusive: bool) -> Self {
        Self {
            end: Bound::Literal(value.into()),
            include_end: inclusive,
            ..Self::default()
        }
    }
}

/// Encode a field → filter mapping into the wire string
///
/// Entries are emitted in lexicographic field order so the encoding is
/// deterministic. The round-trip law `decode(encode(m)) == m` holds for
/// mappings whose names and values avoid the reserved separators.
pub fn encode(filters: &HashMap<String, FieldFilter>) -> String {
    let mut fields: Vec<&String> = filters.keys().collect();
    fields.sort();

    let mut entries = Vec::with_capacity(fields.len());
    for field in fields {
        let filter = &filters[field];
        entries.push(format!(
            "{field}{FIELD_SEPARATOR}{}{TOKEN_SEPARATOR}{}{TOKEN_SEPARATOR}{}{TOKEN_SEPARATOR}{}",
            marker(filter.include_start),
            filter.start.encode(),
            marker(filter.include_end),
            filter.end.encode(),
        ));
    }
    entries.join(RECORD_SEPARATOR)
}

/// Decode a wire string back into a field → filter mapping
///
/// Empty input decodes to an empty mapping. Malformed entries raise a
/// [`FilterCodecError`] rather than being skipped or defaulted.
pub fn decode(encoded: &str) -> Result<HashMap<String, FieldFilter>, FilterCodecError> {
    let mut filters = HashMap::new();
    if encoded.is_empty() {
        return Ok(filters);
    }

    for entry in encoded.split(RECORD_SEPARATOR) {
        let (field, body) = entry
            .split_once(FIELD_SEPARATOR)
            .ok_or_else(|| FilterCodecError::MissingSeparator(entry.to_string()))?;
        if field.is_empty() {
            return Err(FilterCodecError::EmptyFieldName);
        }

        let tokens: Vec<&str> = body.split(TOKEN_SEPARATOR).collect();
        if tokens.len() != 4 {
            return Err(FilterCodecError::BadTokenCount {
                field: field.to_string(),
                tokens: tokens.len(),
            });
        }

        let filter = FieldFilter {
            include_start: decode_marker(field, tokens[0])?,
            start: Bound::decode(tokens[1]),
            include_end: decode_marker(field, tokens[2])?,
            end: Bound::decode(tokens[3]),
        };
        filters.insert(field.to_string(), filter);
    }
    Ok(filters)
}

fn marker(inclusive: bool) -> &'static str {
    if inclusive {
        "i"
    } else {
        "e"
    }
}

fn decode_marker(field: &str, token: &str) -> Result<bool, FilterCodecError> {
    match token {
        "i" => Ok(true),
        "e" => Ok(false),
        other => Err(FilterCodecError::BadBoundMarker {
            field: field.to_string(),
            marker: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HashMap<String, FieldFilter> {
        let mut m = HashMap::new();
        m.insert(
            "cm:created".to_string(),
            FieldFilter {
                start: Bound::Literal("2020-01-01".to_string()),
                end: Bound::Open,
                include_start: true,
                include_end: false,
            },
        );
        m.insert(
            "size".to_string(),
            FieldFilter {
                start: Bound::Literal("0".to_string()),
                end: Bound::Literal("4096".to_string()),
                include_start: false,
                include_end: true,
            },
        );
        m
    }

    #[test]
    fn test_round_trip() {
        let m = sample();
        assert_eq!(decode(&encode(&m)).unwrap(), m);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let m = sample();
        assert_eq!(encode(&m), encode(&m.clone()));
        assert_eq!(
            encode(&m),
            "cm:created#=#i~2020-01-01~e~*#-#size#=#e~0~i~4096"
        );
    }

    #[test]
    fn test_empty_input_decodes_to_empty_map() {
        assert!(decode("").unwrap().is_empty());
        assert_eq!(encode(&HashMap::new()), "");
    }

    #[test]
    fn test_open_bound_distinct_from_empty_string() {
        let mut m = HashMap::new();
        m.insert(
            "f".to_string(),
            FieldFilter {
                start: Bound::Literal(String::new()),
                end: Bound::Open,
                include_start: true,
                include_end: true,
            },
        );
        let decoded = decode(&encode(&m)).unwrap();
        assert_eq!(decoded["f"].start, Bound::Literal(String::new()));
        assert_eq!(decoded["f"].end, Bound::Open);
    }

    #[test]
    fn test_malformed_body_is_an_error() {
        let err = decode("f#=#i~1~e").unwrap_err();
        assert_eq!(
            err,
            FilterCodecError::BadTokenCount {
                field: "f".to_string(),
                tokens: 3
            }
        );
    }

    #[test]
    fn test_missing_separator_is_an_error() {
        let err = decode("no-separator-here").unwrap_err();
        assert!(matches!(err, FilterCodecError::MissingSeparator(_)));
    }

    #[test]
    fn test_bad_marker_is_an_error() {
        let err = decode("f#=#x~1~e~*").unwrap_err();
        assert!(matches!(err, FilterCodecError::BadBoundMarker { .. }));
    }
}
