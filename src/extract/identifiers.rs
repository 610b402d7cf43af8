//! Declared-identifier extraction.
//!
//! Single pass cataloging functions, methods, classes, interfaces, enums,
//! type aliases, and variable declarators. Export status comes from a typed
//! ancestor-chain walk to an `export_statement`, never from text matching.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Error;
use crate::extract::contract::{
    ExtractionRequest, Extractor, ExtractorConfig, ExtractorMetadata, OutputSchema, QualityMetrics,
    SchemaEnum, SourceLocation, ValidationResult,
};
use crate::extract::exports::Visibility;
use crate::language::Language;

/// Kind of declared identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierKind {
    Function,
    Class,
    Interface,
    Variable,
    Constant,
    Enum,
    Type,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Function => "function",
            IdentifierKind::Class => "class",
            IdentifierKind::Interface => "interface",
            IdentifierKind::Variable => "variable",
            IdentifierKind::Constant => "constant",
            IdentifierKind::Enum => "enum",
            IdentifierKind::Type => "type",
        }
    }
}

/// One declared identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierRecord {
    pub name: String,
    pub kind: IdentifierKind,
    pub visibility: Visibility,
    pub is_exported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    /// Comment text directly above the declaration, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// All declared identifiers of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierSet {
    pub file_path: String,
    pub identifiers: Vec<IdentifierRecord>,
    pub total_count: usize,
    pub exported_count: usize,
}

impl IdentifierSet {
    pub fn from_records(file_path: &str, identifiers: Vec<IdentifierRecord>) -> Self {
        Self {
            file_path: file_path.to_string(),
            total_count: identifiers.len(),
            exported_count: identifiers.iter().filter(|i| i.is_exported).count(),
            identifiers,
        }
    }

    /// Find an identifier by name.
    pub fn find(&self, name: &str) -> Option<&IdentifierRecord> {
        self.identifiers.iter().find(|i| i.name == name)
    }

    /// Iterate identifiers of one kind.
    pub fn by_kind(&self, kind: IdentifierKind) -> impl Iterator<Item = &IdentifierRecord> {
        self.identifiers.iter().filter(move |i| i.kind == kind)
    }
}

/// Walk ancestors until an export marker or the tree root. The ancestor
/// chain, not a flag on the node, is the source of truth.
fn is_exported(node: Node) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if ancestor.kind() == "export_statement" {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

fn has_keyword(node: Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == keyword);
    found
}

/// Comment immediately preceding a declaration, looked up at the statement
/// that carries it (export wrappers and declaration lists included).
fn leading_comment(node: Node, req: &ExtractionRequest<'_>) -> Option<String> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        match parent.kind() {
            "export_statement" | "lexical_declaration" | "variable_declaration" => {
                current = parent;
            }
            _ => break,
        }
    }
    let sibling = current.prev_named_sibling()?;
    if sibling.kind() == "comment" {
        Some(req.node_text(sibling).to_string())
    } else {
        None
    }
}

fn explicit_visibility(node: Node, req: &ExtractionRequest<'_>) -> Visibility {
    let mut cursor = node.walk();
    let modifier = node
        .children(&mut cursor)
        .find(|c| c.kind() == "accessibility_modifier");
    match modifier.map(|m| req.node_text(m)) {
        Some("public") => Visibility::Public,
        Some("private") => Visibility::Private,
        Some("protected") => Visibility::Protected,
        _ => Visibility::Default,
    }
}

/// Catalogs every named declaration in a file.
pub struct IdentifierExtractor {
    config: ExtractorConfig,
}

impl IdentifierExtractor {
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
        }
    }

    fn walk(
        &self,
        node: Node,
        depth: usize,
        req: &ExtractionRequest<'_>,
        out: &mut Vec<IdentifierRecord>,
    ) {
        if !req.options().within_depth(depth) {
            return;
        }

        if let Some(record) = self.record_for(node, req) {
            out.push(record);
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, depth + 1, req, out);
        }
    }

    fn record_for(&self, node: Node, req: &ExtractionRequest<'_>) -> Option<IdentifierRecord> {
        let (kind, name_node) = match node.kind() {
            "function_declaration" | "generator_function_declaration" | "method_definition" => {
                (IdentifierKind::Function, node.child_by_field_name("name")?)
            }
            "class_declaration" | "abstract_class_declaration" => {
                (IdentifierKind::Class, node.child_by_field_name("name")?)
            }
            "interface_declaration" => {
                (IdentifierKind::Interface, node.child_by_field_name("name")?)
            }
            "enum_declaration" => (IdentifierKind::Enum, node.child_by_field_name("name")?),
            "type_alias_declaration" => {
                (IdentifierKind::Type, node.child_by_field_name("name")?)
            }
            "variable_declarator" => {
                let kind = match node.parent() {
                    Some(parent) if has_keyword(parent, "const") => IdentifierKind::Constant,
                    _ => IdentifierKind::Variable,
                };
                (kind, node.child_by_field_name("name")?)
            }
            _ => return None,
        };

        let name = req.node_text(name_node).to_string();
        if !req.options().allows(&name) {
            return None;
        }

        let is_callable = kind == IdentifierKind::Function;
        Some(IdentifierRecord {
            name,
            kind,
            visibility: explicit_visibility(node, req),
            is_exported: is_exported(node),
            is_async: is_callable.then(|| has_keyword(node, "async")),
            is_static: (node.kind() == "method_definition").then(|| has_keyword(node, "static")),
            parameters: if is_callable {
                node.child_by_field_name("parameters")
                    .map(|p| req.node_text(p).to_string())
            } else {
                None
            },
            return_type: if is_callable {
                node.child_by_field_name("return_type")
                    .map(|r| req.node_text(r).trim_start_matches(':').trim().to_string())
            } else {
                None
            },
            documentation: if req.options().include_comments {
                leading_comment(node, req)
            } else {
                None
            },
            location: req.location(node),
        })
    }
}

impl Default for IdentifierExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for IdentifierExtractor {
    type Output = IdentifierSet;

    fn name(&self) -> &'static str {
        "identifiers"
    }

    fn supports(&self, language: Language) -> bool {
        Language::all().contains(&language)
    }

    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<IdentifierSet, Error> {
        self.ensure_supported(request)?;

        let mut records = Vec::new();
        self.walk(request.parsed().root(), 0, request, &mut records);

        Ok(IdentifierSet::from_records(request.file_path(), records))
    }

    fn validate(&self, data: &IdentifierSet) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if data.total_count != data.identifiers.len() {
            result.add_error(format!(
                "totalCount {} does not match identifier list ({})",
                data.total_count,
                data.identifiers.len()
            ));
        }

        let exported = data.identifiers.iter().filter(|i| i.is_exported).count();
        if exported != data.exported_count {
            result.add_error(format!(
                "exportedCount {} does not match identifier list ({})",
                data.exported_count, exported
            ));
        }

        for record in &data.identifiers {
            if record.name.is_empty() {
                result.add_warning("identifier with empty name".to_string());
            }
        }

        result.quality = Some(QualityMetrics {
            completeness: 1.0,
            accuracy: 0.95,
            consistency: if result.is_valid { 1.0 } else { 0.0 },
            confidence: 0.95,
        });
        result
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "identifiers",
            version: "1.0.0",
            description: "Declared-identifier catalog with visibility and export flags",
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
            kind: "identifier_set",
            required_fields: vec!["filePath", "identifiers", "totalCount", "exportedCount"],
            classifications: vec![SchemaEnum {
                field: "kind",
                values: vec![
                    "function",
                    "class",
                    "interface",
                    "variable",
                    "constant",
                    "enum",
                    "type",
                ],
            }],
        }
    }
}
