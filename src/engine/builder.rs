//! Analysis configuration: presets and a builder.
//!
//! Presets are plain data, not behavior. A preset fills in defaults; any
//! setting given explicitly on the builder wins over the preset, regardless
//! of call order.

use serde::{Deserialize, Serialize};

use crate::extract::contract::ExtractionOptions;
use crate::language::Language;

const MIN_DEPTH: usize = 1;
const MAX_DEPTH: usize = 5;

/// Named configuration bundles for common analysis profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisPreset {
    /// Structure-only pass: dependency edges and declared identifiers.
    Fast,
    /// Every registered extractor.
    Comprehensive,
    /// Every extractor, caching off, debug timings on.
    Development,
    /// Every extractor, caching on, no debug payload.
    Production,
    /// Dependency surface only: what comes in, what goes out, how it is used.
    Security,
}

impl AnalysisPreset {
    /// Extractor names the preset selects; empty means all registered.
    fn extractors(&self) -> Vec<String> {
        let names: &[&str] = match self {
            AnalysisPreset::Fast => &["dependencies", "identifiers"],
            AnalysisPreset::Security => &["dependencies", "exports", "usage"],
            _ => &[],
        };
        names.iter().map(|n| n.to_string()).collect()
    }

    fn use_cache(&self) -> bool {
        !matches!(self, AnalysisPreset::Development)
    }

    fn include_debug_info(&self) -> bool {
        matches!(self, AnalysisPreset::Development)
    }

    fn max_depth(&self) -> Option<usize> {
        match self {
            AnalysisPreset::Fast => Some(3),
            _ => None,
        }
    }
}

/// Resolved configuration for one `analyze` call.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Extractors to run; empty means every registered extractor.
    pub extractors: Vec<String>,
    pub use_cache: bool,
    pub include_debug_info: bool,
    /// When set, reject inputs of any other language.
    pub language: Option<Language>,
    pub options: ExtractionOptions,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            extractors: Vec::new(),
            use_cache: true,
            include_debug_info: false,
            language: None,
            options: ExtractionOptions::default(),
        }
    }
}

/// Fluent builder over [`AnalysisConfig`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisConfigBuilder {
    preset: Option<AnalysisPreset>,
    extractors: Vec<String>,
    use_cache: Option<bool>,
    include_debug_info: Option<bool>,
    language: Option<Language>,
    max_depth: Option<usize>,
    options: Option<ExtractionOptions>,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_preset(mut self, preset: AnalysisPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    /// Add one extractor by name. Calling this at all overrides any
    /// preset's extractor selection.
    pub fn with_extractor(mut self, name: impl Into<String>) -> Self {
        self.extractors.push(name.into());
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = Some(enabled);
        self
    }

    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.include_debug_info = Some(enabled);
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Cap traversal depth. Values are clamped to the supported range
    /// instead of erroring.
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth.clamp(MIN_DEPTH, MAX_DEPTH));
        self
    }

    pub fn with_options(mut self, options: ExtractionOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn build(self) -> AnalysisConfig {
        let preset = self.preset;

        let extractors = if !self.extractors.is_empty() {
            self.extractors
        } else {
            preset.map(|p| p.extractors()).unwrap_or_default()
        };

        let mut options = self.options.unwrap_or_default();
        if let Some(depth) = self
            .max_depth
            .or_else(|| preset.and_then(|p| p.max_depth()))
        {
            options.max_depth = Some(depth);
        }

        AnalysisConfig {
            extractors,
            use_cache: self
                .use_cache
                .or_else(|| preset.map(|p| p.use_cache()))
                .unwrap_or(true),
            include_debug_info: self
                .include_debug_info
                .or_else(|| preset.map(|p| p.include_debug_info()))
                .unwrap_or(false),
            language: self.language,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfigBuilder::new().build();
        assert!(config.extractors.is_empty());
        assert!(config.use_cache);
        assert!(!config.include_debug_info);
        assert_eq!(config.options.max_depth, None);
    }

    #[test]
    fn test_preset_fills_defaults() {
        let config = AnalysisConfigBuilder::new()
            .with_preset(AnalysisPreset::Fast)
            .build();
        assert_eq!(config.extractors, vec!["dependencies", "identifiers"]);
        assert_eq!(config.options.max_depth, Some(3));
        assert!(config.use_cache);
    }

    #[test]
    fn test_explicit_settings_win_over_preset() {
        let config = AnalysisConfigBuilder::new()
            .with_cache(true)
            .with_preset(AnalysisPreset::Development)
            .with_extractor("complexity")
            .build();
        // Development would disable the cache; the explicit call wins
        // even though it came before the preset.
        assert!(config.use_cache);
        assert!(config.include_debug_info);
        assert_eq!(config.extractors, vec!["complexity"]);
    }

    #[test]
    fn test_depth_is_clamped() {
        let low = AnalysisConfigBuilder::new().with_depth(0).build();
        assert_eq!(low.options.max_depth, Some(1));

        let high = AnalysisConfigBuilder::new().with_depth(50).build();
        assert_eq!(high.options.max_depth, Some(5));
    }

    #[test]
    fn test_security_preset_selection() {
        let config = AnalysisConfigBuilder::new()
            .with_preset(AnalysisPreset::Security)
            .build();
        assert_eq!(config.extractors, vec!["dependencies", "exports", "usage"]);
        assert!(!config.include_debug_info);
    }
}
