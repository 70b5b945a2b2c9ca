//! Lexical WHERE-clause field extraction
//!
//! A best-effort scan over raw query text that surfaces field names
//! referenced in a WHERE clause, so the schema builder can publish columns
//! the index has never observed. This is deliberately not a parser: it has
//! no parenthesis or string-literal awareness, so literals containing
//! `and` / `or` / `where` fragments can mislead it. That profile is part of
//! the component's contract and is preserved rather than fixed.
//!
//! Keyword detection is case-insensitive; extracted field names keep their
//! original case (predicate-side matching downstream is case-insensitive,
//! select-list matching is not).

use std::collections::HashSet;

/// Comparison operators that terminate a field-name candidate, multi-char
/// operators first so `>=` wins over `>` at the same position.
const COMPARISON_OPERATORS: &[&str] = &[
    ">=", "<=", "<>", "!=", "~=", ">", "<", "=", " in ", " between ",
];

/// Extract field names referenced in the WHERE clause of raw query text
///
/// Returns an empty set when no ` where ` token exists. Candidates that
/// start with a quote are discarded (literal-on-the-left heuristic).
pub fn extract(sql: &str) -> HashSet<String> {
    let mut fields = HashSet::new();

    // Standalone "not" tokens would glue onto the field name that follows
    // them, so they are stripped before any splitting.
    let stripped: String = sql
        .split_whitespace()
        .filter(|token| !token.eq_ignore_ascii_case("not"))
        .collect::<Vec<_>>()
        .join(" ");

    // ASCII-only lowering keeps byte offsets aligned with the original text.
    let lower = stripped.to_ascii_lowercase();
    let Some(where_at) = lower.find(" where ") else {
        return fields;
    };
    let tail = &stripped[where_at + " where ".len()..];

    for conjunct in split_conjuncts(tail) {
        let lower_conjunct = conjunct.to_ascii_lowercase();
        let Some(op_at) = COMPARISON_OPERATORS
            .iter()
            .filter_map(|op| lower_conjunct.find(*op))
            .min()
        else {
            continue;
        };

        let candidate = conjunct[..op_at].trim();
        if candidate.starts_with('\'') || candidate.starts_with('"') {
            continue;
        }
        let candidate = candidate.trim_matches(|c| c == '`' || c == '\'' || c == '"');
        if !candidate.is_empty() {
            fields.insert(candidate.to_string());
        }
    }
    fields
}

/// Split a predicate tail on `and` / `or` connectives (case-insensitive)
fn split_conjuncts(tail: &str) -> Vec<&str> {
    let lower = tail.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut conjuncts = Vec::new();
    let mut start = 0;
    let mut at = 0;

    while at < bytes.len() {
        let rest = &bytes[at..];
        let hit = if rest.starts_with(b" and ") {
            Some(" and ".len())
        } else if rest.starts_with(b" or ") {
            Some(" or ".len())
        } else {
            None
        };
        match hit {
            Some(len) => {
                // Matches begin at an ASCII space, so both offsets sit on
                // char boundaries of the original text.
                conjuncts.push(&tail[start..at]);
                at += len;
                start = at;
            }
            None => at += 1,
        }
    }
    conjuncts.push(&tail[start..]);
    conjuncts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extracts_fields_from_conjuncts() {
        assert_eq!(
            extract("select * from t where a = '1' and b = '2'"),
            set(&["a", "b"])
        );
    }

    #[test]
    fn test_no_where_clause_yields_empty() {
        assert_eq!(extract("select * from t"), set(&[]));
    }

    #[test]
    fn test_literal_on_the_left_is_discarded() {
        assert_eq!(extract("select * from t where 'x' = '1'"), set(&[]));
    }

    #[test]
    fn test_field_case_is_preserved() {
        assert_eq!(
            extract("SELECT * FROM t WHERE OwnerName = 'x'"),
            set(&["OwnerName"])
        );
    }

    #[test]
    fn test_not_tokens_are_stripped() {
        assert_eq!(
            extract("select * from t where not a = '1' or not b > 2"),
            set(&["a", "b"])
        );
    }

    #[test]
    fn test_backticks_and_operators() {
        assert_eq!(
            extract("select * from t where `cm:created` >= '2020' and size in (1,2)"),
            set(&["cm:created", "size"])
        );
    }

    #[test]
    fn test_between_operator_terminates_candidate() {
        assert_eq!(
            extract("select * from t where size between 1 and 10"),
            // The "and" inside BETWEEN splits a second, operator-less
            // conjunct, which is dropped. Known heuristic behavior.
            set(&["size"])
        );
    }

    #[test]
    fn test_conjunct_without_comparison_is_skipped() {
        assert_eq!(extract("select * from t where a = 1 and somethingelse"), set(&["a"]));
    }
}
