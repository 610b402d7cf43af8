//! Configurable tree-sitter query layer.
//!
//! Extraction logic that benefits from declarative patterns runs through
//! this layer instead of hand-rolled AST walks:
//!
//! - `config`: named query definitions with category, priority, per-language
//!   applicability, and an attached processor closure
//! - `executor`: compiles patterns, groups captures per match, dispatches to
//!   processors, and isolates per-query failures
//!
//! Sets are built with [`QuerySetBuilder`], seeded from [`default_queries`]
//! and adjusted per call. Execution state lives in a fresh
//! [`QueryExecutionContext`] per run, so a set can be shared across files.

mod config;
mod executor;

pub use config::{
    default_queries, QueryCategory, QueryDefinition, QueryProcessor, QuerySet, QuerySetBuilder,
    QuerySettings,
};
pub use executor::{
    CaptureGroups, CapturedNode, CategorizedQueryResults, QueryExecutionContext,
    QueryExecutor, QueryMatchCaptures, QueryRunOutcome, QueryRunRecord, QueryRunSummary,
};
