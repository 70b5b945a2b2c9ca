//! Cursor stages
//!
//! The building blocks the planner composes into operator chains:
//! - Source stages that issue index requests (scatter search, partitioned
//!   merge, global stats, faceted groups, time buckets)
//! - Streaming stages that transform pulled rows (duplicate elimination,
//!   rollup, having filter)
//! - Finishing stages (top-K ranking, limit)
//!
//! Every stage is pull-based: nothing fetches until pulled, and `close`
//! propagates through the whole chain.

pub mod buckets;
pub mod dedup;
pub mod facets;
pub mod having;
pub mod limit;
pub mod merge;
pub mod project;
pub mod rollup;
pub mod scatter;
pub mod stats;
pub mod topk;

pub use buckets::TimeBucketsCursor;
pub use dedup::DedupCursor;
pub use facets::FacetGroupsCursor;
pub use having::{HavingCursor, HavingPredicate};
pub use limit::LimitCursor;
pub use merge::{PartitionMergeCursor, StreamMerger};
pub use project::ProjectCursor;
pub use rollup::RollupCursor;
pub use scatter::ScatterSearchCursor;
pub use stats::GlobalStatsCursor;
pub use topk::TopKCursor;
