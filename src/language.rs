//! Supported languages and the parsed-source input handle.
//!
//! The parser itself is an external black box (tree-sitter); this module is
//! the seam between it and the extractors. `ParsedSource` bundles the tree
//! with the source bytes because tree-sitter nodes do not own their text.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::Error;

static TYPESCRIPT: Lazy<tree_sitter::Language> =
    Lazy::new(|| tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());

static TSX: Lazy<tree_sitter::Language> =
    Lazy::new(|| tree_sitter_typescript::LANGUAGE_TSX.into());

static JAVASCRIPT: Lazy<tree_sitter::Language> =
    Lazy::new(|| tree_sitter_javascript::LANGUAGE.into());

/// Languages the built-in extractors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
        }
    }

    /// Map a file extension (without dot) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    /// The tree-sitter grammar for this language.
    pub fn grammar(&self) -> &'static tree_sitter::Language {
        match self {
            Language::TypeScript => &TYPESCRIPT,
            Language::Tsx => &TSX,
            Language::JavaScript => &JAVASCRIPT,
        }
    }

    /// All supported languages.
    pub fn all() -> &'static [Language] {
        &[Language::TypeScript, Language::Tsx, Language::JavaScript]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "typescript" | "ts" => Ok(Language::TypeScript),
            "tsx" => Ok(Language::Tsx),
            "javascript" | "js" => Ok(Language::JavaScript),
            _ => Err(format!("unknown language: {}", s)),
        }
    }
}

/// A parsed source file: the tree plus everything needed to read node text.
///
/// Extractors consume this read-only. One `ParsedSource` belongs to one
/// file; concurrent extraction of independent files uses independent
/// instances.
pub struct ParsedSource {
    tree: Tree,
    source: Vec<u8>,
    path: String,
    language: Language,
}

impl fmt::Debug for ParsedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedSource")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("bytes", &self.source.len())
            .finish_non_exhaustive()
    }
}

impl ParsedSource {
    /// Parse source text for the given language.
    ///
    /// A tree with ERROR nodes is still returned; extractors produce partial
    /// results for it. `Error::ParseFailed` only occurs when the parser
    /// yields no tree at all.
    pub fn parse(source: &str, language: Language, path: &str) -> Result<Self, Error> {
        let mut parser = Parser::new();
        parser
            .set_language(language.grammar())
            .map_err(|_| Error::ParseFailed(path.to_string()))?;
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| Error::ParseFailed(path.to_string()))?;

        Ok(Self {
            tree,
            source: source.as_bytes().to_vec(),
            path: path.to_string(),
            language,
        })
    }

    /// Parse a file's content, inferring the language from its extension.
    pub fn parse_for_path(source: &str, path: &str) -> Result<Self, Error> {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let language =
            Language::from_extension(ext).ok_or_else(|| Error::UnknownExtension(ext.into()))?;
        Self::parse(source, language, path)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn source_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn source_str(&self) -> &str {
        std::str::from_utf8(&self.source).unwrap_or("")
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }

    /// Whether the tree contains ERROR nodes.
    pub fn has_parse_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_mapping() {
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("go"), None);
    }

    #[test]
    fn test_parse_typescript() {
        let parsed =
            ParsedSource::parse("const x: number = 1;", Language::TypeScript, "a.ts").unwrap();
        assert_eq!(parsed.language(), Language::TypeScript);
        assert!(!parsed.has_parse_errors());
        assert_eq!(parsed.root().kind(), "program");
    }

    #[test]
    fn test_parse_for_path_unknown_extension() {
        let err = ParsedSource::parse_for_path("x", "main.xyz").unwrap_err();
        assert!(matches!(err, Error::UnknownExtension(_)));
    }

    #[test]
    fn test_partial_parse_still_returns_tree() {
        let parsed =
            ParsedSource::parse("function broken( {", Language::TypeScript, "b.ts").unwrap();
        assert!(parsed.has_parse_errors());
    }
}
