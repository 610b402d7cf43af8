//! Enhanced dependency extraction: import-alias resolution plus usage sites.
//!
//! Two passes over one tree. Pass 1 maps every locally-bound import name to
//! its `(source, original name)`. Pass 2 walks call expressions, member
//! access, and bare identifier references, resolving each through the map.
//! Identifiers consumed as a callee or member object are not double-counted
//! as plain references. The result directly supports dead-import detection.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Error;
use crate::extract::contract::{
    ExtractionRequest, Extractor, ExtractorConfig, ExtractorMetadata, OutputSchema, QualityMetrics,
    SchemaEnum, SourceLocation, ValidationResult,
};
use crate::extract::dependencies::{DependencyExtractor, DependencySet};
use crate::language::Language;

/// What a local import binding resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBinding {
    /// Module the binding came from.
    pub source: String,
    /// Exported name in that module: `default`, `*`, or the original name.
    pub original_name: String,
}

/// How an imported binding was used at a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Reference,
    Property,
    Call,
}

/// Accumulated usage of one `(source, method)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// The name as used at the site (local binding or accessed property).
    pub method_name: String,
    /// The name in the source module, from the import map.
    pub original_name: String,
    pub usage_kind: UsageKind,
    pub locations: Vec<SourceLocation>,
    pub call_count: usize,
    /// For member access through a binding: the local binding name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Argument text captured at call sites.
    pub call_arguments: Vec<String>,
}

/// Usage analysis for one file: the base dependency set plus resolved
/// usage records and unused-import lists, both keyed by module source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalysis {
    pub file_path: String,
    pub dependencies: DependencySet,
    /// Local binding name to its resolution.
    pub import_map: BTreeMap<String, ImportBinding>,
    /// Usage records per module source, sorted by method name.
    pub usages: BTreeMap<String, Vec<UsageRecord>>,
    /// Imported local names with zero usage sites, per module source.
    pub unused_imports: BTreeMap<String, Vec<String>>,
    pub total_usage_count: usize,
}

impl UsageAnalysis {
    /// Number of recorded usage sites for one module source.
    pub fn usage_count(&self, source: &str) -> usize {
        self.usages
            .get(source)
            .map(|records| records.iter().map(|r| r.locations.len()).sum())
            .unwrap_or(0)
    }
}

/// Per-extraction accumulator. Created fresh for every call; extractor
/// instances hold no cross-call state.
struct UsagePass<'a> {
    request: &'a ExtractionRequest<'a>,
    import_map: BTreeMap<String, ImportBinding>,
    /// Source order of bindings, for stable unused-import lists.
    binding_order: Vec<String>,
    /// (source, method) -> record.
    records: BTreeMap<(String, String), UsageRecord>,
    /// Local binding names with at least one usage.
    used_locals: HashSet<String>,
    /// Node ids already counted as callee or member object.
    consumed: HashSet<usize>,
}

impl<'a> UsagePass<'a> {
    fn new(request: &'a ExtractionRequest<'a>) -> Self {
        Self {
            request,
            import_map: BTreeMap::new(),
            binding_order: Vec::new(),
            records: BTreeMap::new(),
            used_locals: HashSet::new(),
            consumed: HashSet::new(),
        }
    }

    fn text(&self, node: Node) -> &str {
        self.request.node_text(node)
    }

    // Pass 1: import bindings.

    fn collect_bindings(&mut self, node: Node, depth: usize) {
        if !self.request.options().within_depth(depth) {
            return;
        }
        if node.kind() == "import_statement" {
            self.bind_import(node);
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_bindings(child, depth + 1);
        }
    }

    fn bind(&mut self, local: String, source: &str, original: &str) {
        if !self.import_map.contains_key(&local) {
            self.binding_order.push(local.clone());
        }
        self.import_map.insert(
            local,
            ImportBinding {
                source: source.to_string(),
                original_name: original.to_string(),
            },
        );
    }

    fn bind_import(&mut self, node: Node) {
        let source = match node.child_by_field_name("source") {
            Some(s) => super::dependencies::unquote(self.text(s)),
            None => return,
        };

        let mut cursor = node.walk();
        let clause = match node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "import_clause")
        {
            Some(c) => c,
            None => return, // bare `import 'module'`
        };

        let mut clause_cursor = clause.walk();
        for child in clause.named_children(&mut clause_cursor) {
            match child.kind() {
                "identifier" => {
                    let local = self.text(child).to_string();
                    self.bind(local, &source, "default");
                }
                "namespace_import" => {
                    let mut inner = child.walk();
                    let name = child
                        .named_children(&mut inner)
                        .find(|n| n.kind() == "identifier");
                    if let Some(name) = name {
                        let local = self.text(name).to_string();
                        self.bind(local, &source, "*");
                    }
                }
                "named_imports" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let original = match spec.child_by_field_name("name") {
                            Some(n) => self.text(n).to_string(),
                            None => continue,
                        };
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| self.text(a).to_string())
                            .unwrap_or_else(|| original.clone());
                        self.bind(local, &source, &original);
                    }
                }
                _ => {}
            }
        }
    }

    // Pass 2: usage sites.

    fn collect_usages(&mut self, node: Node, depth: usize) {
        if !self.request.options().within_depth(depth) {
            return;
        }
        match node.kind() {
            // Binding sites, not usage sites.
            "import_statement" => return,
            "call_expression" => self.visit_call(node),
            "member_expression" => self.visit_member(node),
            "identifier" => self.visit_identifier(node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_usages(child, depth + 1);
        }
    }

    fn visit_call(&mut self, node: Node) {
        let function = match node.child_by_field_name("function") {
            Some(f) => f,
            None => return,
        };
        let arguments = node
            .child_by_field_name("arguments")
            .map(|a| self.text(a).to_string());

        match function.kind() {
            "identifier" => {
                let local = self.text(function).to_string();
                if let Some(binding) = self.import_map.get(&local).cloned() {
                    self.consumed.insert(function.id());
                    self.record(
                        &binding.source,
                        local.clone(),
                        binding.original_name,
                        UsageKind::Call,
                        SourceLocation::from_node(function),
                        None,
                        arguments,
                    );
                    self.used_locals.insert(local);
                }
            }
            "member_expression" => {
                if let Some((root, method)) = self.member_chain(function) {
                    let local = self.text(root).to_string();
                    if let Some(binding) = self.import_map.get(&local).cloned() {
                        self.consumed.insert(function.id());
                        self.consumed.insert(root.id());
                        self.record(
                            &binding.source,
                            method,
                            binding.original_name,
                            UsageKind::Call,
                            SourceLocation::from_node(function),
                            Some(local.clone()),
                            arguments,
                        );
                        self.used_locals.insert(local);
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_member(&mut self, node: Node) {
        if self.consumed.contains(&node.id()) {
            return;
        }
        // Only the outermost node of a member chain produces a record.
        if let Some(parent) = node.parent() {
            if parent.kind() == "member_expression" {
                return;
            }
        }

        if let Some((root, property)) = self.member_chain(node) {
            let local = self.text(root).to_string();
            if let Some(binding) = self.import_map.get(&local).cloned() {
                self.consumed.insert(root.id());
                self.record(
                    &binding.source,
                    property,
                    binding.original_name,
                    UsageKind::Property,
                    SourceLocation::from_node(node),
                    Some(local.clone()),
                    None,
                );
                self.used_locals.insert(local);
            }
        }
    }

    fn visit_identifier(&mut self, node: Node) {
        if self.consumed.contains(&node.id()) {
            return;
        }
        let local = self.text(node).to_string();
        if let Some(binding) = self.import_map.get(&local).cloned() {
            self.record(
                &binding.source,
                local.clone(),
                binding.original_name,
                UsageKind::Reference,
                SourceLocation::from_node(node),
                None,
                None,
            );
            self.used_locals.insert(local);
        }
    }

    /// Resolve a member chain to its root identifier and the property
    /// accessed directly on it (`ns.helper.deep` -> (`ns`, `helper`)).
    fn member_chain<'t>(&self, node: Node<'t>) -> Option<(Node<'t>, String)> {
        let mut current = node;
        loop {
            let object = current.child_by_field_name("object")?;
            match object.kind() {
                "member_expression" | "subscript_expression" => current = object,
                "identifier" => {
                    let property = current.child_by_field_name("property")?;
                    return Some((object, self.text(property).to_string()));
                }
                _ => return None,
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        source: &str,
        method_name: String,
        original_name: String,
        kind: UsageKind,
        location: SourceLocation,
        context: Option<String>,
        arguments: Option<String>,
    ) {
        let key = (source.to_string(), method_name.clone());
        let entry = self.records.entry(key).or_insert_with(|| UsageRecord {
            method_name,
            original_name,
            usage_kind: kind,
            locations: Vec::new(),
            call_count: 0,
            context,
            call_arguments: Vec::new(),
        });

        entry.locations.push(location);
        if kind == UsageKind::Call {
            entry.call_count += 1;
            if let Some(args) = arguments {
                entry.call_arguments.push(args);
            }
        }
        // Call dominates property dominates reference.
        if kind > entry.usage_kind {
            entry.usage_kind = kind;
        }
    }
}

/// Extracts dependencies with alias-resolved usage tracking.
pub struct UsageExtractor {
    config: ExtractorConfig,
    dependencies: DependencyExtractor,
}

impl UsageExtractor {
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
            dependencies: DependencyExtractor::new(),
        }
    }
}

impl Default for UsageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for UsageExtractor {
    type Output = UsageAnalysis;

    fn name(&self) -> &'static str {
        "usage"
    }

    fn supports(&self, language: Language) -> bool {
        Language::all().contains(&language)
    }

    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<UsageAnalysis, Error> {
        self.ensure_supported(request)?;

        let dependencies = self.dependencies.extract(request)?;

        let mut pass = UsagePass::new(request);
        pass.collect_bindings(request.parsed().root(), 0);
        pass.collect_usages(request.parsed().root(), 0);

        // Group records per source, preserving BTreeMap method-name order.
        let mut usages: BTreeMap<String, Vec<UsageRecord>> = BTreeMap::new();
        let mut total_usage_count = 0;
        for ((source, _), mut record) in pass.records {
            if !request.options().include_locations {
                record.locations.clear();
            }
            total_usage_count += 1;
            usages.entry(source).or_default().push(record);
        }

        // Imported locals with no recorded usage, per source, in import order.
        let mut unused_imports: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for local in &pass.binding_order {
            if pass.used_locals.contains(local) {
                continue;
            }
            if let Some(binding) = pass.import_map.get(local) {
                unused_imports
                    .entry(binding.source.clone())
                    .or_default()
                    .push(local.clone());
            }
        }

        Ok(UsageAnalysis {
            file_path: request.file_path().to_string(),
            dependencies,
            import_map: pass.import_map,
            usages,
            unused_imports,
            total_usage_count,
        })
    }

    fn validate(&self, data: &UsageAnalysis) -> ValidationResult {
        let mut result = ValidationResult::valid();

        let record_count: usize = data.usages.values().map(|v| v.len()).sum();
        if record_count != data.total_usage_count {
            result.add_error(format!(
                "totalUsageCount {} does not match usage records ({})",
                data.total_usage_count, record_count
            ));
        }

        // Every usage source must be resolvable through the import map.
        for source in data.usages.keys() {
            if !data.import_map.values().any(|b| &b.source == source) {
                result.add_error(format!("usage recorded for unknown source {:?}", source));
            }
        }

        for record in data.usages.values().flatten() {
            if record.usage_kind == UsageKind::Call && record.call_count == 0 {
                result.add_warning(format!(
                    "call usage {:?} with zero call count",
                    record.method_name
                ));
            }
        }

        result.quality = Some(QualityMetrics {
            completeness: 1.0,
            accuracy: 0.9,
            consistency: if result.is_valid { 1.0 } else { 0.0 },
            confidence: 0.9,
        });
        result
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "usage",
            version: "1.0.0",
            description: "Import-alias resolution, usage-site tracking, unused-import detection",
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
            kind: "usage_analysis",
            required_fields: vec!["filePath", "importMap", "usages", "unusedImports"],
            classifications: vec![SchemaEnum {
                field: "usageKind",
                values: vec!["call", "property", "reference"],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ParsedSource;

    fn extract(source: &str) -> UsageAnalysis {
        let parsed = ParsedSource::parse(source, Language::TypeScript, "test.ts").unwrap();
        let request = ExtractionRequest::with_defaults(&parsed);
        UsageExtractor::new().extract(&request).unwrap()
    }

    #[test]
    fn test_unused_import_detection() {
        let analysis = extract("import { foo, bar as baz } from './utils';\nbaz();\n");

        assert_eq!(
            analysis.unused_imports.get("./utils"),
            Some(&vec!["foo".to_string()])
        );
        assert_eq!(analysis.usage_count("./utils"), 1);

        let records = &analysis.usages["./utils"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method_name, "baz");
        assert_eq!(records[0].original_name, "bar");
        assert_eq!(records[0].usage_kind, UsageKind::Call);
        assert_eq!(records[0].call_count, 1);
    }

    #[test]
    fn test_import_map_bindings() {
        let analysis = extract(
            r#"
import def from './a';
import * as ns from './b';
import { x, y as z } from './c';
"#,
        );

        assert_eq!(analysis.import_map["def"].original_name, "default");
        assert_eq!(analysis.import_map["ns"].original_name, "*");
        assert_eq!(analysis.import_map["x"].original_name, "x");
        assert_eq!(analysis.import_map["z"].original_name, "y");
        assert_eq!(analysis.import_map["z"].source, "./c");
    }

    #[test]
    fn test_namespace_member_call() {
        let analysis = extract("import * as fs from 'fs';\nfs.readFile('x');\n");

        let records = &analysis.usages["fs"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method_name, "readFile");
        assert_eq!(records[0].original_name, "*");
        assert_eq!(records[0].context.as_deref(), Some("fs"));
        assert_eq!(records[0].call_arguments, vec!["('x')"]);
        assert!(analysis.unused_imports.get("fs").is_none());
    }

    #[test]
    fn test_callee_not_double_counted_as_reference() {
        let analysis = extract("import { run } from './m';\nrun();\n");

        let records = &analysis.usages["./m"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].usage_kind, UsageKind::Call);
        assert_eq!(records[0].locations.len(), 1);
    }

    #[test]
    fn test_property_access_without_call() {
        let analysis = extract("import * as cfg from './config';\nconst v = cfg.value;\n");

        let records = &analysis.usages["./config"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method_name, "value");
        assert_eq!(records[0].usage_kind, UsageKind::Property);
        assert_eq!(records[0].call_count, 0);
    }

    #[test]
    fn test_bare_reference() {
        let analysis = extract("import { handler } from './h';\nconst h = handler;\n");

        let records = &analysis.usages["./h"];
        assert_eq!(records[0].usage_kind, UsageKind::Reference);
    }

    #[test]
    fn test_repeated_calls_accumulate() {
        let analysis = extract("import { f } from './m';\nf(1);\nf(2);\nf(3);\n");

        let records = &analysis.usages["./m"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].call_count, 3);
        assert_eq!(records[0].locations.len(), 3);
        assert_eq!(analysis.usage_count("./m"), 3);
    }

    #[test]
    fn test_max_depth_prunes_deep_usage_sites() {
        use crate::extract::contract::ExtractionOptions;

        let source =
            "import { f } from './m';\nfunction a() { function b() { function c() { f(); } } }\n";
        let parsed = ParsedSource::parse(source, Language::TypeScript, "test.ts").unwrap();

        let capped = ExtractionRequest::new(
            &parsed,
            ExtractionOptions {
                max_depth: Some(2),
                ..Default::default()
            },
        );
        let analysis = UsageExtractor::new().extract(&capped).unwrap();
        assert_eq!(analysis.total_usage_count, 0);
        assert_eq!(
            analysis.unused_imports.get("./m"),
            Some(&vec!["f".to_string()])
        );

        let full = ExtractionRequest::with_defaults(&parsed);
        let analysis = UsageExtractor::new().extract(&full).unwrap();
        assert_eq!(analysis.total_usage_count, 1);
    }

    #[test]
    fn test_validation_consistency() {
        let analysis = extract("import { f } from './m';\nf();\n");
        let extractor = UsageExtractor::new();
        assert!(extractor.validate(&analysis).is_valid);
    }
}
