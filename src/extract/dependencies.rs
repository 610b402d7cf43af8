//! Dependency extraction: imports, re-exports, require, dynamic import.
//!
//! One depth-first pass over the tree recognizing four statement/expression
//! shapes. Non-literal arguments to `require(...)` and dynamic `import(...)`
//! are not recorded; they cannot be resolved statically.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Error;
use crate::extract::contract::{
    ExtractionRequest, Extractor, ExtractorConfig, ExtractorMetadata, OutputSchema, QualityMetrics,
    SchemaEnum, SourceLocation, ValidationResult,
};
use crate::language::Language;

/// The statement shape a dependency came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Import,
    Export,
    Require,
    Dynamic,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Import => "import",
            DependencyKind::Export => "export",
            DependencyKind::Require => "require",
            DependencyKind::Dynamic => "dynamic",
        }
    }
}

/// One import/export/require/dynamic-import site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyRecord {
    /// The module specifier string, unquoted.
    pub source: String,
    /// Bound names: default name, `* as ns`, or `original as alias` entries.
    pub specifiers: Vec<String>,
    pub kind: DependencyKind,
    pub is_type_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// All dependencies of one file, with counts derived from the record list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySet {
    pub file_path: String,
    pub dependencies: Vec<DependencyRecord>,
    pub import_count: usize,
    pub export_count: usize,
    pub require_count: usize,
    pub dynamic_import_count: usize,
    pub type_only_import_count: usize,
}

impl DependencySet {
    /// Build a set from records; every count is an exact filtered count
    /// over `dependencies`, never tracked independently.
    pub fn from_records(file_path: &str, dependencies: Vec<DependencyRecord>) -> Self {
        let count = |kind: DependencyKind| {
            dependencies.iter().filter(|d| d.kind == kind).count()
        };
        Self {
            file_path: file_path.to_string(),
            import_count: count(DependencyKind::Import),
            export_count: count(DependencyKind::Export),
            require_count: count(DependencyKind::Require),
            dynamic_import_count: count(DependencyKind::Dynamic),
            type_only_import_count: dependencies.iter().filter(|d| d.is_type_only).count(),
            dependencies,
        }
    }

    /// Distinct module sources, in first-seen order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.dependencies
            .iter()
            .filter(|d| seen.insert(d.source.as_str()))
            .map(|d| d.source.as_str())
            .collect()
    }
}

/// Strip surrounding quotes from a string-literal node's text.
pub(crate) fn unquote(raw: &str) -> String {
    raw.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}

/// Whether a node has a direct anonymous `type` keyword child.
pub(crate) fn has_type_keyword(node: Node) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "type");
    found
}

/// Collect bound names from an `import_clause` node.
///
/// Returns `(specifiers, any_specifier_type_only)`.
pub(crate) fn import_clause_specifiers(
    clause: Node,
    text: impl Fn(Node) -> String,
) -> (Vec<String>, bool) {
    let mut specifiers = Vec::new();
    let mut type_only = false;
    let mut cursor = clause.walk();

    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            // import foo from 'x'
            "identifier" => specifiers.push(text(child)),
            // import * as ns from 'x'
            "namespace_import" => {
                let mut inner = child.walk();
                let name = child
                    .named_children(&mut inner)
                    .find(|n| n.kind() == "identifier");
                if let Some(name) = name {
                    specifiers.push(format!("* as {}", text(name)));
                }
            }
            // import { a, b as c } from 'x'
            "named_imports" => {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    if has_type_keyword(spec) {
                        type_only = true;
                    }
                    let name = spec.child_by_field_name("name").map(&text);
                    let alias = spec.child_by_field_name("alias").map(&text);
                    match (name, alias) {
                        (Some(n), Some(a)) => specifiers.push(format!("{} as {}", n, a)),
                        (Some(n), None) => specifiers.push(n),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    (specifiers, type_only)
}

/// Extracts import/export dependencies from a parsed file.
pub struct DependencyExtractor {
    config: ExtractorConfig,
}

impl DependencyExtractor {
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
        }
    }

    fn walk(&self, node: Node, depth: usize, req: &ExtractionRequest<'_>, out: &mut Vec<DependencyRecord>) {
        if !req.options().within_depth(depth) {
            return;
        }

        match node.kind() {
            "import_statement" => {
                if let Some(record) = self.import_record(node, req) {
                    out.push(record);
                }
            }
            "export_statement" => {
                // Only export-with-source is a dependency; local exports
                // belong to the export extractor.
                if let Some(record) = self.reexport_record(node, req) {
                    out.push(record);
                }
            }
            "call_expression" => {
                if let Some(record) = self.call_record(node, req) {
                    out.push(record);
                }
            }
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, depth + 1, req, out);
        }
    }

    fn import_record(&self, node: Node, req: &ExtractionRequest<'_>) -> Option<DependencyRecord> {
        let source_node = node.child_by_field_name("source")?;
        let source = unquote(req.node_text(source_node));

        let mut is_type_only = has_type_keyword(node);
        let mut specifiers = Vec::new();

        let mut cursor = node.walk();
        if let Some(clause) = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "import_clause")
        {
            let (specs, spec_type_only) =
                import_clause_specifiers(clause, |n| req.node_text(n).to_string());
            specifiers = specs;
            is_type_only = is_type_only || spec_type_only;
        }

        Some(DependencyRecord {
            source,
            specifiers,
            kind: DependencyKind::Import,
            is_type_only,
            location: req.location(node),
        })
    }

    fn reexport_record(&self, node: Node, req: &ExtractionRequest<'_>) -> Option<DependencyRecord> {
        let source_node = node.child_by_field_name("source")?;
        let source = unquote(req.node_text(source_node));
        let is_type_only = has_type_keyword(node);

        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "*" => specifiers.push("*".to_string()),
                "namespace_export" => specifiers.push(req.node_text(child).to_string()),
                "export_clause" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let name = spec
                            .child_by_field_name("name")
                            .map(|n| req.node_text(n).to_string());
                        let alias = spec
                            .child_by_field_name("alias")
                            .map(|n| req.node_text(n).to_string());
                        match (name, alias) {
                            (Some(n), Some(a)) => specifiers.push(format!("{} as {}", n, a)),
                            (Some(n), None) => specifiers.push(n),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Some(DependencyRecord {
            source,
            specifiers,
            kind: DependencyKind::Export,
            is_type_only,
            location: req.location(node),
        })
    }

    fn call_record(&self, node: Node, req: &ExtractionRequest<'_>) -> Option<DependencyRecord> {
        let function = node.child_by_field_name("function")?;
        let kind = match function.kind() {
            "identifier" if req.node_text(function) == "require" => DependencyKind::Require,
            "import" => DependencyKind::Dynamic,
            _ => return None,
        };

        let arguments = node.child_by_field_name("arguments")?;
        let mut cursor = arguments.walk();
        // Only a literal string argument can be resolved statically.
        let first = arguments.named_children(&mut cursor).next()?;
        if first.kind() != "string" {
            return None;
        }

        Some(DependencyRecord {
            source: unquote(req.node_text(first)),
            specifiers: Vec::new(),
            kind,
            is_type_only: false,
            location: req.location(node),
        })
    }
}

impl Default for DependencyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for DependencyExtractor {
    type Output = DependencySet;

    fn name(&self) -> &'static str {
        "dependencies"
    }

    fn supports(&self, language: Language) -> bool {
        Language::all().contains(&language)
    }

    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<DependencySet, Error> {
        self.ensure_supported(request)?;

        let mut records = Vec::new();
        self.walk(request.parsed().root(), 0, request, &mut records);
        records.retain(|r| request.options().allows(&r.source));

        Ok(DependencySet::from_records(request.file_path(), records))
    }

    fn validate(&self, data: &DependencySet) -> ValidationResult {
        let mut result = ValidationResult::valid();

        let imports = data
            .dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Import)
            .count();
        if imports != data.import_count {
            result.add_error(format!(
                "importCount {} does not match dependency list ({})",
                data.import_count, imports
            ));
        }

        for dep in &data.dependencies {
            if dep.source.is_empty() {
                result.add_warning("dependency with empty source".to_string());
            }
        }

        result.quality = Some(QualityMetrics {
            completeness: 1.0,
            accuracy: if result.warnings.is_empty() { 1.0 } else { 0.8 },
            consistency: if result.is_valid { 1.0 } else { 0.0 },
            confidence: 0.95,
        });
        result
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "dependencies",
            version: "1.0.0",
            description: "Import/export/require/dynamic-import detection",
            supported_languages: Language::all().to_vec(),
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
            kind: "dependency_set",
            required_fields: vec!["filePath", "dependencies", "importCount", "exportCount"],
            classifications: vec![SchemaEnum {
                field: "kind",
                values: vec!["import", "export", "require", "dynamic"],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParsedSource;

    fn extract(source: &str) -> DependencySet {
        let parsed = ParsedSource::parse(source, Language::TypeScript, "test.ts").unwrap();
        let request = ExtractionRequest::with_defaults(&parsed);
        DependencyExtractor::new().extract(&request).unwrap()
    }

    #[test]
    fn test_static_import_shapes() {
        let set = extract(
            r#"
import express from 'express';
import * as fs from 'fs';
import { Request, Response as Res } from 'express';
"#,
        );

        assert_eq!(set.import_count, 3);
        assert_eq!(set.dependencies[0].specifiers, vec!["express"]);
        assert_eq!(set.dependencies[1].specifiers, vec!["* as fs"]);
        assert_eq!(
            set.dependencies[2].specifiers,
            vec!["Request", "Response as Res"]
        );
    }

    #[test]
    fn test_type_only_imports() {
        let set = extract(
            r#"
import type { Handler } from './types';
import { type Config, load } from './config';
import { plain } from './plain';
"#,
        );

        assert_eq!(set.type_only_import_count, 2);
        assert!(set.dependencies[0].is_type_only);
        assert!(set.dependencies[1].is_type_only);
        assert!(!set.dependencies[2].is_type_only);
    }

    #[test]
    fn test_require_and_dynamic_import() {
        let set = extract(
            r#"
const path = require('path');
const mod = await import('./lazy');
const skipped = require(dynamicName);
"#,
        );

        assert_eq!(set.require_count, 1);
        assert_eq!(set.dynamic_import_count, 1);
        assert_eq!(set.dependencies[0].source, "path");
        assert_eq!(set.dependencies[1].source, "./lazy");
        // Non-literal require argument is not recorded
        assert_eq!(set.dependencies.len(), 2);
    }

    #[test]
    fn test_reexport_with_source() {
        let set = extract(
            r#"
export { UserService } from './services';
export * from './types';
"#,
        );

        assert_eq!(set.export_count, 2);
        assert_eq!(set.dependencies[0].specifiers, vec!["UserService"]);
        assert_eq!(set.dependencies[1].specifiers, vec!["*"]);
    }

    #[test]
    fn test_local_export_is_not_a_dependency() {
        let set = extract("const a = 1;\nexport { a };\n");
        assert_eq!(set.export_count, 0);
        assert!(set.dependencies.is_empty());
    }

    #[test]
    fn test_counts_match_list() {
        let set = extract(
            r#"
import a from 'a';
import b from 'b';
export * from 'c';
const d = require('d');
"#,
        );

        assert_eq!(set.dependencies.len(), 4);
        assert_eq!(set.import_count, 2);
        assert_eq!(set.export_count, 1);
        assert_eq!(set.require_count, 1);
        assert_eq!(set.dynamic_import_count, 0);

        let extractor = DependencyExtractor::new();
        assert!(extractor.validate(&set).is_valid);
    }

    #[test]
    fn test_idempotent_output() {
        let source = "import a from 'a';\nconst b = require('b');\n";
        let first = serde_json::to_string(&extract(source)).unwrap();
        let second = serde_json::to_string(&extract(source)).unwrap();
        assert_eq!(first, second);
    }
}
