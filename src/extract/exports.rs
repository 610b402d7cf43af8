//! Export and class-structure extraction.
//!
//! Classifies every exported symbol into the nine export types and, for
//! classes, enumerates members with visibility, modifiers, and inheritance.
//! A class yields one class-level record plus one record per member; the
//! flat member records are derived from the `ClassDescriptor`, which is the
//! single source of truth.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Error;
use crate::extract::contract::{
    ExtractionRequest, Extractor, ExtractorConfig, ExtractorMetadata, OutputSchema, QualityMetrics,
    SchemaEnum, SourceLocation, ValidationResult,
};
use crate::language::Language;

/// Classification of an exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    Function,
    Class,
    Variable,
    Type,
    Enum,
    Default,
    ClassMethod,
    ClassProperty,
    ReExport,
}

/// Member visibility. `Default` means no explicit modifier was present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Default,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Default => "default",
        }
    }
}

/// One exported symbol (or class member of an exported class).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecord {
    pub name: String,
    pub export_type: ExportType,
    /// The syntactic form the export came from (`function`, `const`, ...).
    pub declaration_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_async: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_static: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
}

/// A method of an exported class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMethodInfo {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// A property of an exported class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPropertyInfo {
    pub name: String,
    pub visibility: Visibility,
    pub is_static: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Structural view of one exported class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDescriptor {
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    pub methods: Vec<ClassMethodInfo>,
    pub properties: Vec<ClassPropertyInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_class: Option<String>,
    pub implements_interfaces: Vec<String>,
    pub is_default_export: bool,
}

/// All exports of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSet {
    pub file_path: String,
    pub exports: Vec<ExportRecord>,
    pub classes: Vec<ClassDescriptor>,
    pub export_count: usize,
    pub re_export_count: usize,
}

impl ExportSet {
    pub fn from_records(
        file_path: &str,
        exports: Vec<ExportRecord>,
        classes: Vec<ClassDescriptor>,
    ) -> Self {
        Self {
            file_path: file_path.to_string(),
            export_count: exports.len(),
            re_export_count: exports
                .iter()
                .filter(|e| e.export_type == ExportType::ReExport)
                .count(),
            exports,
            classes,
        }
    }
}

fn has_keyword(node: Node, keyword: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == keyword);
    found
}

fn member_visibility(node: Node, text: impl Fn(Node) -> String) -> Visibility {
    let mut cursor = node.walk();
    let modifier = node
        .children(&mut cursor)
        .find(|c| c.kind() == "accessibility_modifier");
    match modifier.map(&text).as_deref() {
        Some("private") => Visibility::Private,
        Some("protected") => Visibility::Protected,
        // Explicit `public` and the TS default are the same thing for
        // class members.
        _ => Visibility::Public,
    }
}

fn strip_return_type(raw: &str) -> String {
    raw.trim_start_matches(':').trim().to_string()
}

/// Extracts export classifications and class structure.
pub struct ExportExtractor {
    config: ExtractorConfig,
}

impl ExportExtractor {
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
        exports: &mut Vec<ExportRecord>,
        classes: &mut Vec<ClassDescriptor>,
    ) {
        if !req.options().within_depth(depth) {
            return;
        }
        if node.kind() == "export_statement" {
            self.classify_export(node, depth, req, exports, classes);
            // Export statements do not nest.
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, depth + 1, req, exports, classes);
        }
    }

    fn classify_export(
        &self,
        node: Node,
        depth: usize,
        req: &ExtractionRequest<'_>,
        exports: &mut Vec<ExportRecord>,
        classes: &mut Vec<ClassDescriptor>,
    ) {
        // Any export with a source is a re-export, whole-module or named.
        if node.child_by_field_name("source").is_some() {
            exports.push(self.reexport_record(node, req));
            return;
        }

        let is_default = has_keyword(node, "default");

        if let Some(declaration) = node.child_by_field_name("declaration") {
            match declaration.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    exports.push(self.function_record(declaration, req, is_default));
                }
                "class_declaration" | "abstract_class_declaration" => {
                    let descriptor = self.class_descriptor(declaration, depth + 1, req, is_default);
                    self.push_class_records(&descriptor, declaration, req, is_default, exports);
                    classes.push(descriptor);
                }
                "lexical_declaration" | "variable_declaration" => {
                    self.variable_records(declaration, req, exports);
                }
                "interface_declaration" | "type_alias_declaration" => {
                    if let Some(name) = declaration.child_by_field_name("name") {
                        exports.push(ExportRecord {
                            name: req.node_text(name).to_string(),
                            export_type: ExportType::Type,
                            declaration_type: declaration.kind().to_string(),
                            location: req.location(declaration),
                            parent_class: None,
                            super_class: None,
                            is_async: None,
                            is_static: None,
                            visibility: None,
                            parameters: None,
                            return_type: None,
                        });
                    }
                }
                "enum_declaration" => {
                    if let Some(name) = declaration.child_by_field_name("name") {
                        exports.push(ExportRecord {
                            name: req.node_text(name).to_string(),
                            export_type: ExportType::Enum,
                            declaration_type: "enum".to_string(),
                            location: req.location(declaration),
                            parent_class: None,
                            super_class: None,
                            is_async: None,
                            is_static: None,
                            visibility: None,
                            parameters: None,
                            return_type: None,
                        });
                    }
                }
                _ => {}
            }
            return;
        }

        // export default <expression>
        if let Some(value) = node.child_by_field_name("value") {
            exports.push(ExportRecord {
                name: if value.kind() == "identifier" {
                    req.node_text(value).to_string()
                } else {
                    "default".to_string()
                },
                export_type: ExportType::Default,
                declaration_type: value.kind().to_string(),
                location: req.location(node),
                parent_class: None,
                super_class: None,
                is_async: None,
                is_static: None,
                visibility: None,
                parameters: None,
                return_type: None,
            });
            return;
        }

        // Local `export { a, b }` without a source. The nine-way enum has
        // no closer bucket than variable.
        let mut cursor = node.walk();
        let clause = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "export_clause");
        if let Some(clause) = clause {
            let mut inner = clause.walk();
            for spec in clause.named_children(&mut inner) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let name = spec
                    .child_by_field_name("alias")
                    .or_else(|| spec.child_by_field_name("name"));
                if let Some(name) = name {
                    exports.push(ExportRecord {
                        name: req.node_text(name).to_string(),
                        export_type: ExportType::Variable,
                        declaration_type: "export_specifier".to_string(),
                        location: req.location(spec),
                        parent_class: None,
                        super_class: None,
                        is_async: None,
                        is_static: None,
                        visibility: None,
                        parameters: None,
                        return_type: None,
                    });
                }
            }
        }
    }

    /// One record per export-with-source statement, named `*` for star
    /// re-exports and by the specifier list otherwise.
    fn reexport_record(&self, node: Node, req: &ExtractionRequest<'_>) -> ExportRecord {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "*" => names.push("*".to_string()),
                "namespace_export" => names.push(req.node_text(child).to_string()),
                "export_clause" => {
                    let mut inner = child.walk();
                    for spec in child.named_children(&mut inner) {
                        if spec.kind() != "export_specifier" {
                            continue;
                        }
                        let name = spec
                            .child_by_field_name("alias")
                            .or_else(|| spec.child_by_field_name("name"));
                        if let Some(name) = name {
                            names.push(req.node_text(name).to_string());
                        }
                    }
                }
                _ => {}
            }
        }

        ExportRecord {
            name: if names.is_empty() {
                "*".to_string()
            } else {
                names.join(", ")
            },
            export_type: ExportType::ReExport,
            declaration_type: "re_export".to_string(),
            location: req.location(node),
            parent_class: None,
            super_class: None,
            is_async: None,
            is_static: None,
            visibility: None,
            parameters: None,
            return_type: None,
        }
    }

    fn function_record(
        &self,
        declaration: Node,
        req: &ExtractionRequest<'_>,
        is_default: bool,
    ) -> ExportRecord {
        let name = declaration
            .child_by_field_name("name")
            .map(|n| req.node_text(n).to_string())
            .unwrap_or_else(|| "default".to_string());

        ExportRecord {
            name,
            export_type: if is_default {
                ExportType::Default
            } else {
                ExportType::Function
            },
            declaration_type: "function".to_string(),
            location: req.location(declaration),
            parent_class: None,
            super_class: None,
            is_async: Some(has_keyword(declaration, "async")),
            is_static: None,
            visibility: None,
            parameters: declaration
                .child_by_field_name("parameters")
                .map(|p| req.node_text(p).to_string()),
            return_type: declaration
                .child_by_field_name("return_type")
                .map(|r| strip_return_type(req.node_text(r))),
        }
    }

    fn variable_records(
        &self,
        declaration: Node,
        req: &ExtractionRequest<'_>,
        exports: &mut Vec<ExportRecord>,
    ) {
        let declaration_type = if has_keyword(declaration, "const") {
            "const"
        } else if has_keyword(declaration, "let") {
            "let"
        } else {
            "var"
        };

        let mut cursor = declaration.walk();
        for declarator in declaration.named_children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            if let Some(name) = declarator.child_by_field_name("name") {
                exports.push(ExportRecord {
                    name: req.node_text(name).to_string(),
                    export_type: ExportType::Variable,
                    declaration_type: declaration_type.to_string(),
                    location: req.location(declarator),
                    parent_class: None,
                    super_class: None,
                    is_async: None,
                    is_static: None,
                    visibility: None,
                    parameters: None,
                    return_type: None,
                });
            }
        }
    }

    fn class_descriptor(
        &self,
        declaration: Node,
        depth: usize,
        req: &ExtractionRequest<'_>,
        is_default: bool,
    ) -> ClassDescriptor {
        let class_name = declaration
            .child_by_field_name("name")
            .map(|n| req.node_text(n).to_string())
            .unwrap_or_else(|| "default".to_string());

        let mut super_class = None;
        let mut implements_interfaces = Vec::new();
        let mut cursor = declaration.walk();
        if let Some(heritage) = declaration
            .named_children(&mut cursor)
            .find(|c| c.kind() == "class_heritage")
        {
            let mut inner = heritage.walk();
            for clause in heritage.named_children(&mut inner) {
                match clause.kind() {
                    "extends_clause" => {
                        let mut c = clause.walk();
                        let value = clause.named_children(&mut c).next();
                        if let Some(value) = value {
                            super_class = Some(req.node_text(value).to_string());
                        }
                    }
                    "implements_clause" => {
                        let mut c = clause.walk();
                        for iface in clause.named_children(&mut c) {
                            implements_interfaces.push(req.node_text(iface).to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut methods = Vec::new();
        let mut properties = Vec::new();
        // Members sit two levels under the declaration (body, then member).
        let members_in_reach = req.options().within_depth(depth + 2);
        if let Some(body) = declaration.child_by_field_name("body").filter(|_| members_in_reach) {
            let mut body_cursor = body.walk();
            for member in body.named_children(&mut body_cursor) {
                match member.kind() {
                    "method_definition" => {
                        if let Some(name) = member.child_by_field_name("name") {
                            methods.push(ClassMethodInfo {
                                name: req.node_text(name).to_string(),
                                visibility: member_visibility(member, |n| {
                                    req.node_text(n).to_string()
                                }),
                                is_static: has_keyword(member, "static"),
                                is_async: has_keyword(member, "async"),
                                parameters: member
                                    .child_by_field_name("parameters")
                                    .map(|p| req.node_text(p).to_string()),
                                return_type: member
                                    .child_by_field_name("return_type")
                                    .map(|r| strip_return_type(req.node_text(r))),
                                location: req.location(member),
                            });
                        }
                    }
                    "public_field_definition" | "field_definition" => {
                        if let Some(name) = member.child_by_field_name("name") {
                            properties.push(ClassPropertyInfo {
                                name: req.node_text(name).to_string(),
                                visibility: member_visibility(member, |n| {
                                    req.node_text(n).to_string()
                                }),
                                is_static: has_keyword(member, "static"),
                                type_annotation: member
                                    .child_by_field_name("type")
                                    .map(|t| strip_return_type(req.node_text(t))),
                                location: req.location(member),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        ClassDescriptor {
            class_name,
            location: req.location(declaration),
            methods,
            properties,
            super_class,
            implements_interfaces,
            is_default_export: is_default,
        }
    }

    /// Derive the flat export records (class-level plus one per member)
    /// from the descriptor.
    fn push_class_records(
        &self,
        descriptor: &ClassDescriptor,
        declaration: Node,
        req: &ExtractionRequest<'_>,
        is_default: bool,
        exports: &mut Vec<ExportRecord>,
    ) {
        exports.push(ExportRecord {
            name: descriptor.class_name.clone(),
            export_type: if is_default {
                ExportType::Default
            } else {
                ExportType::Class
            },
            declaration_type: "class".to_string(),
            location: req.location(declaration),
            parent_class: None,
            super_class: descriptor.super_class.clone(),
            is_async: None,
            is_static: None,
            visibility: None,
            parameters: None,
            return_type: None,
        });

        for method in &descriptor.methods {
            exports.push(ExportRecord {
                name: method.name.clone(),
                export_type: ExportType::ClassMethod,
                declaration_type: "method".to_string(),
                location: method.location,
                parent_class: Some(descriptor.class_name.clone()),
                super_class: None,
                is_async: Some(method.is_async),
                is_static: Some(method.is_static),
                visibility: Some(method.visibility),
                parameters: method.parameters.clone(),
                return_type: method.return_type.clone(),
            });
        }

        for property in &descriptor.properties {
            exports.push(ExportRecord {
                name: property.name.clone(),
                export_type: ExportType::ClassProperty,
                declaration_type: "property".to_string(),
                location: property.location,
                parent_class: Some(descriptor.class_name.clone()),
                super_class: None,
                is_async: None,
                is_static: Some(property.is_static),
                visibility: Some(property.visibility),
                parameters: None,
                return_type: property.type_annotation.clone(),
            });
        }
    }
}

impl Default for ExportExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for ExportExtractor {
    type Output = ExportSet;

    fn name(&self) -> &'static str {
        "exports"
    }

    fn supports(&self, language: Language) -> bool {
        Language::all().contains(&language)
    }

    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<ExportSet, Error> {
        self.ensure_supported(request)?;

        let mut exports = Vec::new();
        let mut classes = Vec::new();
        self.walk(request.parsed().root(), 0, request, &mut exports, &mut classes);
        exports.retain(|e| request.options().allows(&e.name));

        Ok(ExportSet::from_records(
            request.file_path(),
            exports,
            classes,
        ))
    }

    fn validate(&self, data: &ExportSet) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if data.export_count != data.exports.len() {
            result.add_error(format!(
                "exportCount {} does not match export list ({})",
                data.export_count,
                data.exports.len()
            ));
        }

        // Every member record must reference a known class descriptor.
        for export in &data.exports {
            if let Some(parent) = &export.parent_class {
                if !data.classes.iter().any(|c| &c.class_name == parent) {
                    result.add_error(format!(
                        "member {:?} references unknown class {:?}",
                        export.name, parent
                    ));
                }
            }
        }

        // The flat view and the descriptors are derived from one source;
        // drift between them means construction went wrong.
        for class in &data.classes {
            let flat_methods = data
                .exports
                .iter()
                .filter(|e| {
                    e.export_type == ExportType::ClassMethod
                        && e.parent_class.as_deref() == Some(class.class_name.as_str())
                })
                .count();
            if flat_methods != class.methods.len() {
                result.add_error(format!(
                    "class {:?}: {} flat method records vs {} descriptor methods",
                    class.class_name,
                    flat_methods,
                    class.methods.len()
                ));
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
            name: "exports",
            version: "1.0.0",
            description: "Export classification and class-structure enumeration",
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
            kind: "export_set",
            required_fields: vec!["filePath", "exports", "classes", "exportCount"],
            classifications: vec![
                SchemaEnum {
                    field: "exportType",
                    values: vec![
                        "function",
                        "class",
                        "variable",
                        "type",
                        "enum",
                        "default",
                        "class_method",
                        "class_property",
                        "re_export",
                    ],
                },
                SchemaEnum {
                    field: "visibility",
                    values: vec!["public", "private", "protected", "default"],
                },
            ],
        }
    }
}
