//! Having filter stage
//!
//! Filters already-aggregated rows against the front end's opaque having
//! expression. Always placed downstream of aggregation and upstream of
//! ranking/limit, never pushed into the index-side request: having
//! predicates are rare and operate on already-small grouped results.
//!
//! The expression is evaluated by a small lexical evaluator in the same
//! register as the predicate scanner: conjuncts split on and/or, one
//! comparison per conjunct, numeric literals only, evaluated left to
//! right without precedence or parentheses.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::{QueryError, QueryResult};
use crate::types::{Row, Value};

/// Comparison operator inside one having conjunct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

/// Connective joining a conjunct to the running result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connective {
    And,
    Or,
}

#[derive(Debug, Clone)]
struct Comparison {
    column: String,
    op: CompareOp,
    literal: f64,
}

impl Comparison {
    fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column).and_then(Value::as_f64) else {
            return false;
        };
        match self.op {
            CompareOp::Gt => actual > self.literal,
            CompareOp::Gte => actual >= self.literal,
            CompareOp::Lt => actual < self.literal,
            CompareOp::Lte => actual <= self.literal,
            CompareOp::Eq => actual == self.literal,
            CompareOp::Neq => actual != self.literal,
        }
    }
}

/// Parsed having expression
#[derive(Debug, Clone)]
pub struct HavingPredicate {
    first: Comparison,
    rest: Vec<(Connective, Comparison)>,
}

impl HavingPredicate {
    /// Parse the front end's having string
    ///
    /// Fails with a planning error on anything the evaluator cannot
    /// represent, so a malformed expression is rejected before dispatch.
    pub fn parse(expression: &str) -> QueryResult<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(QueryError::planning("having expression is empty"));
        }

        let mut terms = split_terms(trimmed);
        let (_, first_text) = terms.remove(0);
        let first = parse_comparison(&first_text)?;
        let mut rest = Vec::with_capacity(terms.len());
        for (connective, text) in terms {
            rest.push((connective, parse_comparison(&text)?));
        }
        Ok(Self { first, rest })
    }

    /// Evaluate against an aggregated row, left to right
    pub fn matches(&self, row: &Row) -> bool {
        let mut result = self.first.matches(row);
        for (connective, comparison) in &self.rest {
            result = match connective {
                Connective::And => result && comparison.matches(row),
                Connective::Or => result || comparison.matches(row),
            };
        }
        result
    }
}

fn split_terms(expression: &str) -> Vec<(Connective, String)> {
    let lower = expression.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut terms = Vec::new();
    let mut connective = Connective::And;
    let mut start = 0;
    let mut at = 0;

    while at < bytes.len() {
        let rest = &bytes[at..];
        let hit = if rest.starts_with(b" and ") {
            Some((Connective::And, " and ".len()))
        } else if rest.starts_with(b" or ") {
            Some((Connective::Or, " or ".len()))
        } else {
            None
        };
        match hit {
            Some((next_connective, len)) => {
                terms.push((connective, expression[start..at].to_string()));
                connective = next_connective;
                at += len;
                start = at;
            }
            None => at += 1,
        }
    }
    terms.push((connective, expression[start..].to_string()));
    terms
}

fn parse_comparison(text: &str) -> QueryResult<Comparison> {
    // Multi-char operators first so ">=" never parses as ">".
    const OPERATORS: &[(&str, CompareOp)] = &[
        (">=", CompareOp::Gte),
        ("<=", CompareOp::Lte),
        ("<>", CompareOp::Neq),
        ("!=", CompareOp::Neq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
        ("=", CompareOp::Eq),
    ];

    for (token, op) in OPERATORS {
        if let Some(at) = text.find(token) {
            let column = text[..at]
                .trim()
                .trim_matches(|c| c == '`' || c == '\'' || c == '"')
                .to_string();
            let literal_text = text[at + token.len()..]
                .trim()
                .trim_matches(|c| c == '\'' || c == '"');
            if column.is_empty() {
                return Err(QueryError::planning(format!(
                    "having conjunct {text:?} has no aggregate column"
                )));
            }
            let literal = literal_text.parse::<f64>().map_err(|_| {
                QueryError::planning(format!(
                    "having conjunct {text:?} compares against a non-numeric literal"
                ))
            })?;
            return Ok(Comparison {
                column,
                op: *op,
                literal,
            });
        }
    }
    Err(QueryError::planning(format!(
        "having conjunct {text:?} has no comparison operator"
    )))
}

/// Stage dropping aggregated rows that fail the having expression
pub struct HavingCursor {
    input: Box<dyn Cursor>,
    predicate: HavingPredicate,
}

impl HavingCursor {
    /// Wrap `input` with the parsed predicate
    pub fn new(input: Box<dyn Cursor>, predicate: HavingPredicate) -> Self {
        Self { input, predicate }
    }
}

impl Cursor for HavingCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        loop {
            let Some(row) = self.input.next_row(ctx)? else {
                return Ok(None);
            };
            if self.predicate.matches(&row) {
                return Ok(Some(row));
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }

    fn name(&self) -> &'static str {
        "Having"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(count: i64, sum: f64) -> Row {
        Row::new()
            .with("count(*)", Value::Int(count))
            .with("sum(size)", Value::Float(sum))
    }

    #[test]
    fn test_single_comparison() {
        let p = HavingPredicate::parse("count(*) > 2").unwrap();
        assert!(p.matches(&group(3, 0.0)));
        assert!(!p.matches(&group(2, 0.0)));
    }

    #[test]
    fn test_and_or_left_to_right() {
        let p = HavingPredicate::parse("count(*) > 2 and sum(size) <= 10").unwrap();
        assert!(p.matches(&group(3, 10.0)));
        assert!(!p.matches(&group(3, 11.0)));

        let p = HavingPredicate::parse("count(*) > 100 or sum(size) = 5").unwrap();
        assert!(p.matches(&group(1, 5.0)));
        assert!(!p.matches(&group(1, 6.0)));
    }

    #[test]
    fn test_missing_column_fails_the_row() {
        let p = HavingPredicate::parse("avg(size) >= 1").unwrap();
        assert!(!p.matches(&group(3, 9.0)));
    }

    #[test]
    fn test_malformed_expressions_are_planning_errors() {
        assert!(HavingPredicate::parse("").is_err());
        assert!(HavingPredicate::parse("count(*)").is_err());
        assert!(HavingPredicate::parse("count(*) > many").is_err());
        assert!(HavingPredicate::parse("> 3").is_err());
    }

    #[test]
    fn test_quoted_literal_and_backticked_column() {
        let p = HavingPredicate::parse("`count(*)` >= '2'").unwrap();
        assert!(p.matches(&group(2, 0.0)));
    }

    struct FixedCursor {
        rows: Vec<Row>,
        at: usize,
    }

    impl Cursor for FixedCursor {
        fn next_row(&mut self, _ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
            let row = self.rows.get(self.at).cloned();
            self.at += 1;
            Ok(row)
        }

        fn close(&mut self) {}

        fn name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[test]
    fn test_having_stage_filters_stream() {
        let rows = vec![group(1, 0.0), group(5, 0.0), group(2, 0.0), group(9, 0.0)];
        let predicate = HavingPredicate::parse("count(*) >= 5").unwrap();
        let mut cursor = HavingCursor::new(Box::new(FixedCursor { rows, at: 0 }), predicate);
        let mut ctx = ExecutionContext::new();

        let mut counts = Vec::new();
        while let Some(row) = cursor.next_row(&mut ctx).unwrap() {
            counts.push(row.get("count(*)").cloned().unwrap());
        }
        assert_eq!(counts, vec![Value::Int(5), Value::Int(9)]);
    }
}
