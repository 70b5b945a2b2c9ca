//! Query error types
//!
//! Structured error handling for planning and execution. Validation and
//! planning failures are synchronous and never retried; execution failures
//! surface as a terminal error state on the cursor.

use std::fmt;

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    /// Error kind for programmatic handling
    pub kind: QueryErrorKind,
    /// Human-readable message
    pub message: String,
    /// Optional source error
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add source error for error chaining
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create a validation error (rejected before dispatch)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Validation, message)
    }

    /// Create a planning error
    pub fn planning(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Planning, message)
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Execution, message)
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Cancelled, message)
    }

    /// Create an internal error (bug, broken invariant)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::Internal, message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Categories of query errors for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The descriptor was rejected before dispatch
    Validation,
    /// No execution strategy could be assembled
    Planning,
    /// A strategy failed while iterating (transport, index)
    Execution,
    /// The cursor was cancelled cooperatively
    Cancelled,
    /// Internal error (bug, violated precondition)
    Internal,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryErrorKind::Validation => write!(f, "ValidationError"),
            QueryErrorKind::Planning => write!(f, "PlanningError"),
            QueryErrorKind::Execution => write!(f, "ExecutionError"),
            QueryErrorKind::Cancelled => write!(f, "Cancelled"),
            QueryErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

impl From<crate::error::TransportError> for QueryError {
    fn from(e: crate::error::TransportError) -> Self {
        QueryError::execution(e.to_string()).with_source(e)
    }
}

/// Result type alias for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = QueryError::validation("wildcard in projected field 'na*me'");
        assert_eq!(err.kind, QueryErrorKind::Validation);
        assert!(err.message.contains("na*me"));
    }

    #[test]
    fn test_error_display() {
        let err = QueryError::planning("at least one aggregate function required");
        let display = format!("{}", err);
        assert!(display.contains("PlanningError"));
        assert!(display.contains("aggregate"));
    }

    #[test]
    fn test_transport_error_chains_as_execution() {
        use std::error::Error;
        let err: QueryError = crate::error::TransportError::Timeout("shard 3".into()).into();
        assert_eq!(err.kind, QueryErrorKind::Execution);
        assert!(err.source().is_some());
    }
}
