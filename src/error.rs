//! Typed errors for contract violations.
//!
//! Extractors report almost everything as data (see `ValidationResult`);
//! this enum covers only the fail-fast cases: incompatible input, bad
//! registration, bad configuration.

use thiserror::Error;

use crate::language::Language;

/// Errors that can cross the public boundary of the crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The extractor was handed a tree for a language it does not handle.
    #[error("extractor {extractor:?} does not support language {language}")]
    UnsupportedLanguage {
        extractor: &'static str,
        language: Language,
    },

    /// No language is registered for the given file extension.
    #[error("no supported language for extension {0:?}")]
    UnknownExtension(String),

    /// The parser produced no tree at all (wrong grammar, exhausted memory).
    #[error("failed to parse {0}")]
    ParseFailed(String),

    /// An analysis run selected an extractor name that is not registered.
    #[error("unknown extractor {0:?}")]
    UnknownExtractor(String),

    /// Registration under a name that is already taken.
    #[error("extractor {0:?} is already registered")]
    DuplicateExtractor(String),

    /// A query set already contains a query with this name.
    #[error("query {0:?} is already defined")]
    DuplicateQuery(String),

    /// A builder operation referenced a query name that does not exist.
    #[error("unknown query {0:?}")]
    UnknownQuery(String),

    /// `configure()` was handed an unusable configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An extractor output could not be serialized for the merged report.
    #[error("failed to serialize output of {extractor:?}")]
    Serialize {
        extractor: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
