//! Code-complexity extraction.
//!
//! Per function-like node, traversal is restricted to the function's own
//! body; nested function bodies are excluded from the parent's metrics and
//! produce their own records.
//!
//! - Cyclomatic: 1 + decision points (if, loops, switch, each case, catch,
//!   ternary); a logical `&&`/`||`/`??` adds the generic increment plus one
//!   more for the short-circuit branch.
//! - Cognitive: 1 + current nesting level per weighted construct, with
//!   stack-discipline nesting; binary logical operators add a flat 1.
//! - Max nesting depth: high-water mark over the same nesting-capable set.
//! - Lines of code: end line - start line + 1 of the function node.

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use crate::error::Error;
use crate::extract::contract::{
    ExtractionRequest, Extractor, ExtractorConfig, ExtractorMetadata, OutputSchema, QualityMetrics,
    SchemaEnum, SourceLocation, ValidationResult,
};
use crate::language::Language;

/// Complexity metrics for one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityRecord {
    pub function_name: String,
    pub cyclomatic_complexity: u32,
    pub cognitive_complexity: u32,
    pub max_nesting_depth: u32,
    pub lines_of_code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// File-level complexity aggregate. A file with no functions yields the
/// all-zero aggregate, not an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplexitySummary {
    pub file_path: String,
    pub functions: Vec<ComplexityRecord>,
    pub total_functions: usize,
    pub average_cyclomatic: f64,
    pub max_cyclomatic: u32,
    pub average_cognitive: f64,
    pub max_cognitive: u32,
    pub average_nesting: f64,
    pub max_nesting: u32,
    pub average_lines: f64,
    pub max_lines: u32,
    /// Functions with cyclomatic complexity above 10.
    pub high_complexity_count: usize,
    /// Functions with cyclomatic complexity above 20.
    pub very_high_complexity_count: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl FileComplexitySummary {
    pub fn from_records(file_path: &str, functions: Vec<ComplexityRecord>) -> Self {
        let n = functions.len();
        if n == 0 {
            return Self {
                file_path: file_path.to_string(),
                ..Default::default()
            };
        }

        let avg = |f: fn(&ComplexityRecord) -> u32| {
            round2(functions.iter().map(|r| f(r) as f64).sum::<f64>() / n as f64)
        };
        let max = |f: fn(&ComplexityRecord) -> u32| {
            functions.iter().map(f).max().unwrap_or(0)
        };

        Self {
            file_path: file_path.to_string(),
            total_functions: n,
            average_cyclomatic: avg(|r| r.cyclomatic_complexity),
            max_cyclomatic: max(|r| r.cyclomatic_complexity),
            average_cognitive: avg(|r| r.cognitive_complexity),
            max_cognitive: max(|r| r.cognitive_complexity),
            average_nesting: avg(|r| r.max_nesting_depth),
            max_nesting: max(|r| r.max_nesting_depth),
            average_lines: avg(|r| r.lines_of_code),
            max_lines: max(|r| r.lines_of_code),
            high_complexity_count: functions
                .iter()
                .filter(|r| r.cyclomatic_complexity > 10)
                .count(),
            very_high_complexity_count: functions
                .iter()
                .filter(|r| r.cyclomatic_complexity > 20)
                .count(),
            functions,
        }
    }

    /// Top-N functions by cyclomatic complexity, ties broken by position.
    pub fn hotspots(&self, n: usize) -> Vec<&ComplexityRecord> {
        let mut ranked: Vec<&ComplexityRecord> = self.functions.iter().collect();
        ranked.sort_by(|a, b| b.cyclomatic_complexity.cmp(&a.cyclomatic_complexity));
        ranked.truncate(n);
        ranked
    }
}

fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "generator_function"
            | "arrow_function"
            | "method_definition"
    )
}

fn is_decision_point(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "while_statement"
            | "do_statement"
            | "for_statement"
            | "for_in_statement"
            | "switch_statement"
            | "switch_case"
            | "catch_clause"
            | "ternary_expression"
    )
}

/// Constructs that both carry a cognitive weight and open a nesting level.
fn is_nesting_construct(kind: &str) -> bool {
    matches!(
        kind,
        "if_statement"
            | "while_statement"
            | "do_statement"
            | "for_statement"
            | "for_in_statement"
            | "switch_statement"
            | "catch_clause"
            | "ternary_expression"
    )
}

fn is_logical_operator(node: Node) -> bool {
    if node.kind() != "binary_expression" {
        return false;
    }
    matches!(
        node.child_by_field_name("operator").map(|o| o.kind()),
        Some("&&") | Some("||") | Some("??")
    )
}

#[derive(Default)]
struct BodyMetrics {
    decision_points: u32,
    cognitive: u32,
    max_depth: u32,
}

impl BodyMetrics {
    /// Walk one nesting scope. Nested function-like nodes are skipped
    /// entirely; they get their own records.
    fn walk(&mut self, node: Node, nesting: u32) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if is_function_like(child.kind()) {
                continue;
            }

            let kind = child.kind();
            if is_decision_point(kind) {
                self.decision_points += 1;
            }
            if is_logical_operator(child) {
                // Generic decision-point increment plus the short-circuit
                // branch, and a flat cognitive penalty.
                self.decision_points += 2;
                self.cognitive += 1;
            }

            if is_nesting_construct(kind) {
                self.cognitive += 1 + nesting;
                let entered = nesting + 1;
                if entered > self.max_depth {
                    self.max_depth = entered;
                }
                self.walk(child, entered);
            } else {
                self.walk(child, nesting);
            }
        }
    }
}

/// Computes cyclomatic/cognitive complexity, nesting, and LOC per function.
pub struct ComplexityExtractor {
    config: ExtractorConfig,
}

impl ComplexityExtractor {
    pub fn new() -> Self {
        Self {
            config: ExtractorConfig::default(),
        }
    }

    /// Discover function-like nodes. The depth cap bounds discovery only;
    /// a function within reach is always measured over its whole body.
    fn collect(
        &self,
        node: Node,
        depth: usize,
        req: &ExtractionRequest<'_>,
        out: &mut Vec<ComplexityRecord>,
    ) {
        if !req.options().within_depth(depth) {
            return;
        }
        if is_function_like(node.kind()) {
            if let Some(record) = self.function_record(node, req) {
                out.push(record);
            }
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect(child, depth + 1, req, out);
        }
    }

    fn function_record(
        &self,
        node: Node,
        req: &ExtractionRequest<'_>,
    ) -> Option<ComplexityRecord> {
        let name = function_name(node, req);
        if !req.options().allows(&name) {
            return None;
        }

        let mut metrics = BodyMetrics::default();
        if let Some(body) = node.child_by_field_name("body") {
            metrics.walk(body, 0);
        }

        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;

        Some(ComplexityRecord {
            function_name: name,
            cyclomatic_complexity: 1 + metrics.decision_points,
            cognitive_complexity: metrics.cognitive,
            max_nesting_depth: metrics.max_depth,
            lines_of_code: (end_line - start_line + 1) as u32,
            location: req.location(node),
        })
    }
}

/// Resolve a display name for a function-like node: its own name field,
/// the variable/property it is assigned to, or `<anonymous>`.
fn function_name(node: Node, req: &ExtractionRequest<'_>) -> String {
    if let Some(name) = node.child_by_field_name("name") {
        return req.node_text(name).to_string();
    }

    if let Some(parent) = node.parent() {
        match parent.kind() {
            "variable_declarator" | "pair" | "public_field_definition" | "field_definition" => {
                if let Some(name) = parent
                    .child_by_field_name("name")
                    .or_else(|| parent.child_by_field_name("key"))
                {
                    return req.node_text(name).to_string();
                }
            }
            "assignment_expression" => {
                if let Some(left) = parent.child_by_field_name("left") {
                    return req.node_text(left).to_string();
                }
            }
            _ => {}
        }
    }

    "<anonymous>".to_string()
}

impl Default for ComplexityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for ComplexityExtractor {
    type Output = FileComplexitySummary;

    fn name(&self) -> &'static str {
        "complexity"
    }

    fn supports(&self, language: Language) -> bool {
        Language::all().contains(&language)
    }

    fn extract(&self, request: &ExtractionRequest<'_>) -> Result<FileComplexitySummary, Error> {
        self.ensure_supported(request)?;

        let mut records = Vec::new();
        self.collect(request.parsed().root(), 0, request, &mut records);

        Ok(FileComplexitySummary::from_records(
            request.file_path(),
            records,
        ))
    }

    fn validate(&self, data: &FileComplexitySummary) -> ValidationResult {
        let mut result = ValidationResult::valid();

        if data.total_functions != data.functions.len() {
            result.add_error(format!(
                "totalFunctions {} does not match function list ({})",
                data.total_functions,
                data.functions.len()
            ));
        }

        for record in &data.functions {
            if record.cyclomatic_complexity < 1 {
                result.add_error(format!(
                    "function {:?} has cyclomatic complexity below 1",
                    record.function_name
                ));
            }
            if record.lines_of_code < 1 {
                result.add_error(format!(
                    "function {:?} has zero lines of code",
                    record.function_name
                ));
            }
        }

        let high = data
            .functions
            .iter()
            .filter(|r| r.cyclomatic_complexity > 10)
            .count();
        if high != data.high_complexity_count {
            result.add_error(format!(
                "highComplexityCount {} does not match function list ({})",
                data.high_complexity_count, high
            ));
        }

        result.quality = Some(QualityMetrics {
            completeness: 1.0,
            accuracy: 0.95,
            consistency: if result.is_valid { 1.0 } else { 0.0 },
            confidence: 0.9,
        });
        result
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "complexity",
            version: "1.0.0",
            description: "Cyclomatic/cognitive complexity, nesting depth, lines of code",
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
            kind: "complexity_summary",
            required_fields: vec![
                "filePath",
                "functions",
                "totalFunctions",
                "averageCyclomatic",
                "maxCyclomatic",
            ],
            classifications: vec![SchemaEnum {
                field: "functionName",
                values: vec![],
            }],
        }
    }
}
