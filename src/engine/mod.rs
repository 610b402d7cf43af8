//! Analysis engine: extractor registry, orchestration, and result cache.
//!
//! The engine owns a registry of type-erased extractors and runs a
//! configured subset of them over one parsed file. Extractor failures are
//! isolated: a failing extractor contributes an entry to `errors` and the
//! rest of the report is still produced. Reports are cached per file path
//! behind a content fingerprint.

mod builder;
mod cache;

pub use builder::{AnalysisConfig, AnalysisConfigBuilder, AnalysisPreset};
pub use cache::CacheStats;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::Error;
use crate::extract::contract::{
    DynExtractor, ExtractionRequest, ExtractorMetadata, ValidationResult,
};
use crate::extract::{
    ComplexityExtractor, DependencyExtractor, ExportExtractor, IdentifierExtractor,
    UsageExtractor,
};
use crate::language::{Language, ParsedSource};

const DEFAULT_CACHE_SIZE: usize = 256;

/// Per-extractor timing, present when debug info is requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractorTiming {
    pub extractor: String,
    pub execution_time_ms: f64,
}

/// Debug payload attached to a report on request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDebugInfo {
    pub timings: Vec<ExtractorTiming>,
    pub total_time_ms: f64,
}

/// Merged result of one analysis run over one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub file_path: String,
    pub language: Language,
    /// Extractor name to its serialized output.
    pub extracted_data: BTreeMap<String, Value>,
    /// Extractor name to its self-validation verdict.
    pub validation: BTreeMap<String, ValidationResult>,
    /// Extractor name to failure message, for extractors that errored.
    pub errors: BTreeMap<String, String>,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<AnalysisDebugInfo>,
}

/// Registry plus cache. One engine instance serves many files.
pub struct AnalysisEngine {
    extractors: BTreeMap<&'static str, Arc<dyn DynExtractor>>,
    cache: cache::ResultCache,
}

impl AnalysisEngine {
    /// An engine with an empty registry.
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(max_entries: usize) -> Self {
        Self {
            extractors: BTreeMap::new(),
            cache: cache::ResultCache::new(max_entries),
        }
    }

    /// An engine pre-loaded with every built-in extractor.
    pub fn with_builtins() -> Self {
        let mut engine = Self::new();
        // Registration of distinct built-ins cannot collide.
        let _ = engine.register(Arc::new(DependencyExtractor::new()));
        let _ = engine.register(Arc::new(UsageExtractor::new()));
        let _ = engine.register(Arc::new(ExportExtractor::new()));
        let _ = engine.register(Arc::new(IdentifierExtractor::new()));
        let _ = engine.register(Arc::new(ComplexityExtractor::new()));
        engine
    }

    /// Register an extractor under its own name.
    pub fn register(&mut self, extractor: Arc<dyn DynExtractor>) -> Result<(), Error> {
        let name = extractor.name();
        if self.extractors.contains_key(name) {
            return Err(Error::DuplicateExtractor(name.to_string()));
        }
        self.extractors.insert(name, extractor);
        Ok(())
    }

    /// Registered extractor names, sorted.
    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.keys().copied().collect()
    }

    /// Metadata of every registered extractor, in name order.
    pub fn extractor_metadata(&self) -> Vec<ExtractorMetadata> {
        self.extractors.values().map(|e| e.metadata()).collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Run the configured extractors over one parsed file.
    ///
    /// Fails fast only on configuration problems: an unknown extractor
    /// name or a language restriction the input violates. Individual
    /// extractor failures land in the report's `errors` map.
    pub fn analyze(
        &self,
        parsed: &ParsedSource,
        config: &AnalysisConfig,
    ) -> Result<AnalysisReport, Error> {
        if let Some(expected) = config.language {
            if parsed.language() != expected {
                return Err(Error::InvalidConfiguration(format!(
                    "configured for {} but input is {}",
                    expected,
                    parsed.language()
                )));
            }
        }

        let selected = self.resolve_extractors(&config.extractors)?;
        let names: Vec<String> = selected.iter().map(|e| e.name().to_string()).collect();
        let fingerprint = cache::fingerprint(parsed.source_bytes(), &names);

        if config.use_cache {
            if let Some(mut report) = self.cache.get(parsed.path(), &fingerprint) {
                debug!(path = parsed.path(), "analysis cache hit");
                report.from_cache = true;
                return Ok(report);
            }
        }

        let started = Instant::now();
        let request = ExtractionRequest::new(parsed, config.options.clone());

        let mut extracted_data = BTreeMap::new();
        let mut validation = BTreeMap::new();
        let mut errors = BTreeMap::new();
        let mut timings = Vec::new();

        for extractor in &selected {
            let name = extractor.name();
            if !extractor.supports(parsed.language()) {
                debug!(extractor = name, language = %parsed.language(), "skipped");
                // A skip is surfaced like any other per-extractor failure.
                errors.insert(
                    name.to_string(),
                    Error::UnsupportedLanguage {
                        extractor: name,
                        language: parsed.language(),
                    }
                    .to_string(),
                );
                continue;
            }

            let extractor_started = Instant::now();
            match extractor.extract_value(&request) {
                Ok((value, result)) => {
                    extracted_data.insert(name.to_string(), value);
                    validation.insert(name.to_string(), result);
                }
                Err(e) => {
                    warn!(extractor = name, error = %e, "extractor failed");
                    errors.insert(name.to_string(), e.to_string());
                }
            }
            if config.include_debug_info {
                timings.push(ExtractorTiming {
                    extractor: name.to_string(),
                    execution_time_ms: extractor_started.elapsed().as_secs_f64() * 1000.0,
                });
            }
        }

        let report = AnalysisReport {
            file_path: parsed.path().to_string(),
            language: parsed.language(),
            extracted_data,
            validation,
            errors,
            from_cache: false,
            debug: config.include_debug_info.then(|| AnalysisDebugInfo {
                timings,
                total_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            }),
        };

        if config.use_cache {
            self.cache
                .insert(parsed.path(), fingerprint, report.clone());
        }

        Ok(report)
    }

    /// Parse a source string then analyze it, inferring the language from
    /// the path extension.
    pub fn analyze_source(
        &self,
        source: &str,
        path: &str,
        config: &AnalysisConfig,
    ) -> Result<AnalysisReport, Error> {
        let parsed = ParsedSource::parse_for_path(source, path)?;
        self.analyze(&parsed, config)
    }

    fn resolve_extractors(
        &self,
        requested: &[String],
    ) -> Result<Vec<Arc<dyn DynExtractor>>, Error> {
        if requested.is_empty() {
            return Ok(self.extractors.values().cloned().collect());
        }
        let mut selected = Vec::with_capacity(requested.len());
        for name in requested {
            let extractor = self
                .extractors
                .get(name.as_str())
                .ok_or_else(|| Error::UnknownExtractor(name.clone()))?;
            selected.push(Arc::clone(extractor));
        }
        // Registry order regardless of request order, for stable reports.
        selected.sort_by_key(|e| e.name());
        selected.dedup_by_key(|e| e.name());
        Ok(selected)
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> ParsedSource {
        ParsedSource::parse(source, Language::TypeScript, "test.ts").unwrap()
    }

    const SAMPLE: &str = r#"
import { helper } from './utils';

export function run(x: number): number {
    if (x > 0) {
        return helper(x);
    }
    return 0;
}
"#;

    #[test]
    fn test_builtin_registry() {
        let engine = AnalysisEngine::with_builtins();
        assert_eq!(
            engine.extractor_names(),
            vec![
                "complexity",
                "dependencies",
                "exports",
                "identifiers",
                "usage"
            ]
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut engine = AnalysisEngine::with_builtins();
        let err = engine
            .register(Arc::new(DependencyExtractor::new()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateExtractor(name) if name == "dependencies"));
    }

    #[test]
    fn test_analyze_all_extractors() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new().build();
        let report = engine.analyze(&parse(SAMPLE), &config).unwrap();

        assert_eq!(report.extracted_data.len(), 5);
        assert!(report.errors.is_empty());
        assert!(!report.from_cache);
        assert!(report.validation.values().all(|v| v.is_valid));
        assert_eq!(
            report.extracted_data["dependencies"]["importCount"],
            serde_json::json!(1)
        );
    }

    #[test]
    fn test_unknown_extractor_fails_fast() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new()
            .with_extractor("nonexistent")
            .build();
        let err = engine.analyze(&parse(SAMPLE), &config).unwrap_err();
        assert!(matches!(err, Error::UnknownExtractor(_)));
    }

    #[test]
    fn test_subset_selection() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new()
            .with_extractor("dependencies")
            .with_extractor("complexity")
            .build();
        let report = engine.analyze(&parse(SAMPLE), &config).unwrap();

        let keys: Vec<&String> = report.extracted_data.keys().collect();
        assert_eq!(keys, vec!["complexity", "dependencies"]);
    }

    #[test]
    fn test_cache_round_trip() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new().build();

        let first = engine.analyze(&parse(SAMPLE), &config).unwrap();
        assert!(!first.from_cache);

        let second = engine.analyze(&parse(SAMPLE), &config).unwrap();
        assert!(second.from_cache);
        assert_eq!(first.extracted_data, second.extracted_data);

        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_changed_content_misses_cache() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new().build();

        engine.analyze(&parse(SAMPLE), &config).unwrap();
        let changed = engine
            .analyze(&parse("const y = 2;"), &config)
            .unwrap();
        assert!(!changed.from_cache);
    }

    #[test]
    fn test_extractor_subset_has_own_cache_identity() {
        let engine = AnalysisEngine::with_builtins();
        let all = AnalysisConfigBuilder::new().build();
        let deps_only = AnalysisConfigBuilder::new()
            .with_extractor("dependencies")
            .build();

        engine.analyze(&parse(SAMPLE), &all).unwrap();
        let report = engine.analyze(&parse(SAMPLE), &deps_only).unwrap();
        // Same file, different extractor set: must not reuse the report.
        assert!(!report.from_cache);
        assert_eq!(report.extracted_data.len(), 1);
    }

    #[test]
    fn test_unsupported_extractor_reported_in_errors() {
        use crate::extract::contract::{Extractor, ExtractorConfig, OutputSchema};

        struct TsOnlyExtractor {
            config: ExtractorConfig,
        }

        impl Extractor for TsOnlyExtractor {
            type Output = Vec<String>;

            fn name(&self) -> &'static str {
                "ts-only"
            }

            fn supports(&self, language: Language) -> bool {
                language == Language::TypeScript
            }

            fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Vec<String>, Error> {
                self.ensure_supported(request)?;
                Ok(Vec::new())
            }

            fn validate(&self, _data: &Vec<String>) -> ValidationResult {
                ValidationResult::valid()
            }

            fn metadata(&self) -> ExtractorMetadata {
                ExtractorMetadata {
                    name: "ts-only",
                    version: "0.0.0",
                    description: "typescript-only test extractor",
                    supported_languages: vec![Language::TypeScript],
                    default_timeout_ms: self.config.timeout_ms,
                }
            }

            fn configuration(&self) -> &ExtractorConfig {
                &self.config
            }

            fn config_mut(&mut self) -> &mut ExtractorConfig {
                &mut self.config
            }

            fn output_schema(&self) -> OutputSchema {
                OutputSchema {
                    kind: "stub",
                    required_fields: vec![],
                    classifications: vec![],
                }
            }
        }

        let mut engine = AnalysisEngine::with_builtins();
        engine
            .register(Arc::new(TsOnlyExtractor {
                config: ExtractorConfig::default(),
            }))
            .unwrap();

        let parsed =
            ParsedSource::parse("const x = 1;", Language::JavaScript, "test.js").unwrap();
        let config = AnalysisConfigBuilder::new().build();
        let report = engine.analyze(&parsed, &config).unwrap();

        // The language mismatch is visible in the report, not a silent skip.
        assert!(report.errors["ts-only"].contains("does not support"));
        assert!(!report.extracted_data.contains_key("ts-only"));
        assert_eq!(report.extracted_data.len(), 5);
    }

    #[test]
    fn test_language_restriction() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new()
            .with_language(Language::JavaScript)
            .build();
        let err = engine.analyze(&parse(SAMPLE), &config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn test_debug_timings() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new()
            .with_preset(AnalysisPreset::Development)
            .build();
        let report = engine.analyze(&parse(SAMPLE), &config).unwrap();

        let debug = report.debug.unwrap();
        assert_eq!(debug.timings.len(), 5);
        assert!(debug.total_time_ms >= 0.0);
    }

    #[test]
    fn test_analyze_source_infers_language() {
        let engine = AnalysisEngine::with_builtins();
        let config = AnalysisConfigBuilder::new().build();
        let report = engine
            .analyze_source("const x = 1;", "inline.tsx", &config)
            .unwrap();
        assert_eq!(report.language, Language::Tsx);
    }
}
