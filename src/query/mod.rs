//! Query translation and execution
//!
//! The entry point of the translator: a bound query descriptor goes in, a
//! pull-based result cursor comes out. Submodules cover the descriptor
//! contract, strategy planning, time-window resolution, and the operator
//! stages the planner composes.

pub mod cursor;
pub mod descriptor;
pub mod error;
pub mod operators;
pub mod planner;
pub mod window;

pub use cursor::{Cursor, ExecutionContext, ExecutionStats, QueryCursor};
pub use descriptor::{
    AggregateSpec, DeclaredType, ExecutionMode, QueryDescriptor, QueryDescriptorBuilder,
};
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use planner::{PlannerConfig, QueryContext, QueryPlanner, Strategy};
pub use window::{resolve as resolve_window, TimeGrain, TimeWindow};
