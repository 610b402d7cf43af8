//! Extraction plugins.
//!
//! Each extractor is a self-contained unit behind the [`Extractor`] trait:
//! it declares which languages it supports, produces one serializable output
//! type per file, and validates its own output. The engine holds extractors
//! type-erased as [`DynExtractor`] trait objects.
//!
//! Built-in extractors:
//!
//! - `dependencies`: import/export/require/dynamic-import edges
//! - `usage`: per-import usage analysis (calls, member access, references)
//! - `exports`: exported surface, including class structure
//! - `identifiers`: declared-identifier catalog
//! - `complexity`: per-function cyclomatic and cognitive complexity

pub mod complexity;
pub mod contract;
pub mod dependencies;
pub mod exports;
pub mod identifiers;
pub mod usage;

pub use complexity::{ComplexityExtractor, ComplexityRecord, FileComplexitySummary};
pub use contract::{
    DynExtractor, ExtractionOptions, ExtractionRequest, Extractor, ExtractorConfig,
    ExtractorMetadata, OutputSchema, QualityMetrics, SchemaEnum, SourceLocation,
    ValidationResult,
};
pub use dependencies::{DependencyExtractor, DependencyKind, DependencyRecord, DependencySet};
pub use exports::{
    ClassDescriptor, ClassMethodInfo, ClassPropertyInfo, ExportExtractor, ExportRecord,
    ExportSet, ExportType, Visibility,
};
pub use identifiers::{IdentifierExtractor, IdentifierKind, IdentifierRecord, IdentifierSet};
pub use usage::{ImportBinding, UsageAnalysis, UsageExtractor, UsageKind, UsageRecord};
