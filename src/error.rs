//! Error types for the translator's external boundaries

use thiserror::Error;

/// Errors raised at the shard transport / index cluster boundary
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection to a shard or the cluster coordinator failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// The index rejected the request
    #[error("Index rejected request: {0}")]
    Rejected(String),

    /// The request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// A shard referenced by the topology is unknown to the client
    #[error("Unknown shard: {0}")]
    UnknownShard(u32),

    /// The response could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The bridge runtime driving transport calls could not be built
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Errors raised while decoding range-filter metadata strings
///
/// Decoding is strict: the filter-data wire format is the one bit-exact
/// format in this subsystem, so malformed input is never silently defaulted.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FilterCodecError {
    /// An entry is missing the field/body separator
    #[error("Filter entry has no field separator: {0:?}")]
    MissingSeparator(String),

    /// An entry body does not have exactly four tokens
    #[error("Filter body for field {field:?} has {tokens} tokens, expected 4")]
    BadTokenCount {
        /// Field the malformed body belongs to
        field: String,
        /// Number of tokens actually present
        tokens: usize,
    },

    /// An inclusive/exclusive marker is neither `i` nor `e`
    #[error("Invalid bound marker {marker:?} for field {field:?}")]
    BadBoundMarker {
        /// Field the malformed marker belongs to
        field: String,
        /// The offending marker token
        marker: String,
    },

    /// An entry has an empty field name
    #[error("Filter entry has an empty field name")]
    EmptyFieldName,
}

/// Result alias for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
