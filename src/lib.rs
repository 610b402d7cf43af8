//! Codefacts - structural fact extraction for TypeScript and JavaScript.
//!
//! Codefacts parses source files with tree-sitter and runs pluggable
//! extractors over the syntax tree to produce serializable facts:
//! dependency edges, per-import usage, exported surface, declared
//! identifiers, and per-function complexity.
//!
//! # Architecture
//!
//! - `language`: grammar selection and parsing into `ParsedSource`
//! - `extract`: the `Extractor` plugin contract and the built-in extractors
//! - `query`: configurable tree-sitter query sets with per-query processors
//! - `engine`: registry, orchestration, and the fingerprint-guarded cache
//! - `error`: the crate-wide error type
//!
//! # Adding an Extractor
//!
//! Implement `Extractor` (see `src/extract/` for the built-ins), then
//! register it on an `AnalysisEngine`. The engine serializes each
//! extractor's typed output under its name in the merged report.
//!
//! # Example
//!
//! ```
//! use codefacts::{AnalysisConfigBuilder, AnalysisEngine};
//!
//! let engine = AnalysisEngine::with_builtins();
//! let config = AnalysisConfigBuilder::new().build();
//! let report = engine
//!     .analyze_source("import { a } from './a'; a();", "demo.ts", &config)
//!     .unwrap();
//! assert!(report.extracted_data.contains_key("usage"));
//! ```

pub mod engine;
pub mod error;
pub mod extract;
pub mod language;
pub mod query;

pub use engine::{
    AnalysisConfig, AnalysisConfigBuilder, AnalysisEngine, AnalysisPreset, AnalysisReport,
    CacheStats,
};
pub use error::Error;
pub use extract::{
    DynExtractor, ExtractionOptions, ExtractionRequest, Extractor, ExtractorConfig,
    ExtractorMetadata, SourceLocation, ValidationResult,
};
pub use language::{Language, ParsedSource};
pub use query::{QueryExecutor, QuerySet, QuerySetBuilder};
