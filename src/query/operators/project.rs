//! Projection stage
//!
//! Rewrites rows from storage-field names to the published column names of
//! the virtual table (and from index-side aggregate labels to the labels
//! the front end projects). Fields outside the projection are dropped;
//! projected fields absent from a row come through as null.

use crate::query::cursor::{Cursor, ExecutionContext};
use crate::query::error::QueryResult;
use crate::types::{Row, Value};

/// Stage mapping `(published, source)` column pairs over each row
pub struct ProjectCursor {
    input: Box<dyn Cursor>,
    columns: Vec<(String, String)>,
}

impl ProjectCursor {
    /// Project `input` onto the `(published, source)` pairs
    pub fn new(input: Box<dyn Cursor>, columns: Vec<(String, String)>) -> Self {
        Self { input, columns }
    }

    /// Whether every pair maps a name onto itself
    pub fn is_identity(columns: &[(String, String)]) -> bool {
        columns.iter().all(|(published, source)| published == source)
    }
}

impl Cursor for ProjectCursor {
    fn next_row(&mut self, ctx: &mut ExecutionContext) -> QueryResult<Option<Row>> {
        ctx.check_active()?;
        let Some(row) = self.input.next_row(ctx)? else {
            return Ok(None);
        };
        let mut projected = Row::new();
        for (published, source) in &self.columns {
            projected.set(
                published.clone(),
                row.get(source).cloned().unwrap_or(Value::Null),
            );
        }
        Ok(Some(projected))
    }

    fn close(&mut self) {
        self.input.close();
    }

    fn name(&self) -> &'static str {
        "Project"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_project_renames_and_drops() {
        let rows = vec![Row::new()
            .with("cm:created", Value::text("2026-01-01"))
            .with("internal", Value::Int(42))];
        let mut project = ProjectCursor::new(
            Box::new(FixedCursor { rows, at: 0 }),
            vec![("cm_created".to_string(), "cm:created".to_string())],
        );
        let mut ctx = ExecutionContext::new();
        let row = project.next_row(&mut ctx).unwrap().unwrap();
        assert_eq!(row.get("cm_created"), Some(&Value::text("2026-01-01")));
        assert_eq!(row.get("cm:created"), None);
        assert_eq!(row.get("internal"), None);
    }

    #[test]
    fn test_missing_source_projects_null() {
        let rows = vec![Row::new()];
        let mut project = ProjectCursor::new(
            Box::new(FixedCursor { rows, at: 0 }),
            vec![("owner".to_string(), "owner".to_string())],
        );
        let mut ctx = ExecutionContext::new();
        let row = project.next_row(&mut ctx).unwrap().unwrap();
        assert_eq!(row.get("owner"), Some(&Value::Null));
    }

    #[test]
    fn test_identity_detection() {
        let identity = vec![("a".to_string(), "a".to_string())];
        let renaming = vec![("a".to_string(), "b".to_string())];
        assert!(ProjectCursor::is_identity(&identity));
        assert!(!ProjectCursor::is_identity(&renaming));
    }
}
