//! The extractor plugin contract.
//!
//! Every extractor implements [`Extractor`]: a pure `extract` over a parsed
//! tree, plus self-description (`metadata`, `output_schema`), configuration,
//! and result validation. A type-erased [`DynExtractor`] view lets the
//! analysis engine hold a heterogeneous registry and merge outputs as JSON.
//!
//! Contract rules:
//! - `extract` must not mutate the tree and returns partial results for
//!   syntactically-valid-but-unusual input; ambiguity is reported through
//!   `validate`, not errors.
//! - The only fail-fast case is an incompatible input language.
//! - `configure` takes `&mut self`, so it cannot race an in-flight
//!   `extract(&self)`.
//! - Cleanup is `Drop`; there is no separate dispose step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tree_sitter::Node;

use crate::error::Error;
use crate::language::{Language, ParsedSource};

/// A source span. Lines and columns are both 1-based, uniformly across
/// every extractor; this is the single construction point for locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceLocation {
    /// Create a location from a tree-sitter node (0-based rows/columns).
    pub fn from_node(node: Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            line: start.row + 1,
            column: start.column + 1,
            end_line: end.row + 1,
            end_column: end.column + 1,
        }
    }

    /// Number of source lines the span covers.
    pub fn line_count(&self) -> usize {
        self.end_line - self.line + 1
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Options for one extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionOptions {
    /// Attach source locations to records.
    pub include_locations: bool,
    /// Capture comment text adjacent to declarations.
    pub include_comments: bool,
    /// Cap traversal depth; `None` means unlimited.
    pub max_depth: Option<usize>,
    /// Only keep records whose name matches one of these (empty = all).
    pub include: Vec<String>,
    /// Drop records whose name matches one of these.
    pub exclude: Vec<String>,
    /// Escape hatch for forward-compatible extractor-specific options.
    pub custom: BTreeMap<String, String>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            include_locations: true,
            include_comments: false,
            max_depth: None,
            include: Vec::new(),
            exclude: Vec::new(),
            custom: BTreeMap::new(),
        }
    }
}

impl ExtractionOptions {
    /// Apply the include/exclude name filters to a record name.
    pub fn allows(&self, name: &str) -> bool {
        if self.exclude.iter().any(|e| e == name) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|i| i == name)
    }

    /// Apply the `max_depth` cap to a traversal depth (root = 0). Every
    /// extractor walk checks this before descending.
    pub fn within_depth(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }
}

/// Immutable input to one extractor invocation.
pub struct ExtractionRequest<'a> {
    parsed: &'a ParsedSource,
    options: ExtractionOptions,
}

impl<'a> ExtractionRequest<'a> {
    pub fn new(parsed: &'a ParsedSource, options: ExtractionOptions) -> Self {
        Self { parsed, options }
    }

    pub fn with_defaults(parsed: &'a ParsedSource) -> Self {
        Self::new(parsed, ExtractionOptions::default())
    }

    pub fn parsed(&self) -> &ParsedSource {
        self.parsed
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    pub fn language(&self) -> Language {
        self.parsed.language()
    }

    pub fn file_path(&self) -> &str {
        self.parsed.path()
    }

    pub fn node_text(&self, node: Node) -> &str {
        self.parsed.node_text(node)
    }

    /// Location for a node, honoring `include_locations`.
    pub fn location(&self, node: Node) -> Option<SourceLocation> {
        self.options
            .include_locations
            .then(|| SourceLocation::from_node(node))
    }
}

/// Result of validating extracted data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityMetrics>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Quality estimate for an extraction result, each dimension in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub confidence: f64,
}

/// Static self-description of an extractor, used for discovery and
/// timeout/memory budgeting by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<Language>,
    pub default_timeout_ms: u64,
}

/// Runtime configuration for an extractor.
///
/// `configure` is idempotent; the borrow checker prevents configuring an
/// extractor while an extraction borrows it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    pub timeout_ms: u64,
    pub max_memory_bytes: u64,
    pub custom: BTreeMap<String, String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_memory_bytes: 256 * 1024 * 1024,
            custom: BTreeMap::new(),
        }
    }
}

impl ExtractorConfig {
    /// Check the configuration for unusable values.
    pub fn validate(&self) -> Result<(), Error> {
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_memory_bytes == 0 {
            return Err(Error::InvalidConfiguration(
                "max_memory_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Declared shape of an extractor's output: its kind, required fields, and
/// the closed value sets of its classification fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSchema {
    pub kind: &'static str,
    pub required_fields: Vec<&'static str>,
    pub classifications: Vec<SchemaEnum>,
}

/// One classification field and its allowed values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEnum {
    pub field: &'static str,
    pub values: Vec<&'static str>,
}

/// The uniform interface every extractor implements.
///
/// Implementations hold no per-call state: everything an extraction needs
/// lives in the request or in call-local accumulators, so one instance can
/// serve concurrent extractions of independent files.
pub trait Extractor: Send + Sync {
    /// Strongly-typed, JSON-serializable result.
    type Output: Serialize;

    /// Unique registry name.
    fn name(&self) -> &'static str;

    /// Whether this extractor handles the given language.
    fn supports(&self, language: Language) -> bool;

    /// Extract facts from one parsed tree. Pure: same input, same output.
    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Self::Output, Error>;

    /// Validate a complete result; inconsistencies become data, not errors.
    fn validate(&self, data: &Self::Output) -> ValidationResult;

    fn metadata(&self) -> ExtractorMetadata;

    fn configure(&mut self, config: ExtractorConfig) -> Result<(), Error> {
        config.validate()?;
        *self.config_mut() = config;
        Ok(())
    }

    fn configuration(&self) -> &ExtractorConfig;

    /// Mutable access for the default `configure` implementation.
    fn config_mut(&mut self) -> &mut ExtractorConfig;

    fn output_schema(&self) -> OutputSchema;

    /// Guard used by `extract` implementations for the one fail-fast case.
    fn ensure_supported(&self, request: &ExtractionRequest<'_>) -> Result<(), Error> {
        if self.supports(request.language()) {
            Ok(())
        } else {
            Err(Error::UnsupportedLanguage {
                extractor: self.name(),
                language: request.language(),
            })
        }
    }
}

/// Type-erased extractor view for the engine's registry.
///
/// `extract_value` runs `extract` then `validate` and serializes the typed
/// output, so the engine can merge heterogeneous results under one map.
pub trait DynExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn supports(&self, language: Language) -> bool;
    fn metadata(&self) -> ExtractorMetadata;
    fn output_schema(&self) -> OutputSchema;
    fn extract_value(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<(Value, ValidationResult), Error>;
}

impl<T: Extractor> DynExtractor for T {
    fn name(&self) -> &'static str {
        Extractor::name(self)
    }

    fn supports(&self, language: Language) -> bool {
        Extractor::supports(self, language)
    }

    fn metadata(&self) -> ExtractorMetadata {
        Extractor::metadata(self)
    }

    fn output_schema(&self) -> OutputSchema {
        Extractor::output_schema(self)
    }

    fn extract_value(
        &self,
        request: &ExtractionRequest<'_>,
    ) -> Result<(Value, ValidationResult), Error> {
        let output = self.extract(request)?;
        let validation = self.validate(&output);
        let value = serde_json::to_value(&output).map_err(|source| Error::Serialize {
            extractor: Extractor::name(self),
            source,
        })?;
        Ok((value, validation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_one_based() {
        let parsed =
            ParsedSource::parse("const x = 1;", Language::TypeScript, "t.ts").unwrap();
        let loc = SourceLocation::from_node(parsed.root());
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn test_options_filters() {
        let mut opts = ExtractionOptions::default();
        assert!(opts.allows("anything"));

        opts.exclude.push("skip".into());
        assert!(!opts.allows("skip"));
        assert!(opts.allows("keep"));

        opts.include.push("keep".into());
        assert!(opts.allows("keep"));
        assert!(!opts.allows("other"));
    }

    #[test]
    fn test_validation_result() {
        let mut v = ValidationResult::valid();
        assert!(v.is_valid);

        v.add_warning("odd but fine");
        assert!(v.is_valid);

        v.add_error("count mismatch");
        assert!(!v.is_valid);
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn test_config_validate() {
        let mut cfg = ExtractorConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.timeout_ms = 0;
        assert!(matches!(
            cfg.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
