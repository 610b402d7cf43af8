//! Query execution: compile, run, group captures, dispatch to processors.
//!
//! Failures are isolated per query: a pattern that does not compile or a
//! processor that errors records `{success: false, error}` for that query
//! only and execution continues with the rest of the set.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Query, QueryCursor};

use crate::extract::contract::SourceLocation;
use crate::extract::usage::ImportBinding;
use crate::language::ParsedSource;
use crate::query::config::{QueryCategory, QueryDefinition, QuerySet};

/// Owned snapshot of one captured node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedNode {
    pub kind: String,
    pub text: String,
    pub location: SourceLocation,
}

/// Captures of one query match, grouped by capture name.
#[derive(Debug, Clone, Default)]
pub struct QueryMatchCaptures {
    captures: BTreeMap<String, Vec<CapturedNode>>,
}

impl QueryMatchCaptures {
    pub fn get(&self, name: &str) -> &[CapturedNode] {
        self.captures.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&CapturedNode> {
        self.get(name).first()
    }
}

/// All matches of one query, with a flattened by-name view.
#[derive(Debug, Clone, Default)]
pub struct CaptureGroups {
    matches: Vec<QueryMatchCaptures>,
    node_count: usize,
}

impl CaptureGroups {
    pub fn matches(&self) -> &[QueryMatchCaptures] {
        &self.matches
    }

    /// Every captured node under the given name, across all matches.
    pub fn all(&self, name: &str) -> Vec<&CapturedNode> {
        self.matches.iter().flat_map(|m| m.get(name)).collect()
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }
}

/// Ephemeral state shared across the processors of one extraction call.
/// Created fresh per call, never stored or shared across files.
#[derive(Debug, Default)]
pub struct QueryExecutionContext {
    /// Local binding name to its import resolution.
    pub import_map: BTreeMap<String, ImportBinding>,
    /// Usage events accumulated by usage-category processors.
    pub usage_events: Vec<Value>,
    /// Module sources noted by import-category processors, first-seen order.
    pub import_sources: Vec<String>,
}

impl QueryExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip surrounding quotes from a string-literal's text.
    pub fn unquote(&self, raw: &str) -> String {
        crate::extract::dependencies::unquote(raw)
    }

    pub fn note_import_source(&mut self, source: &str) {
        if !self.import_sources.iter().any(|s| s == source) {
            self.import_sources.push(source.to_string());
        }
    }
}

/// Telemetry and results for one executed query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRunRecord {
    pub query_name: String,
    pub category: QueryCategory,
    pub success: bool,
    pub results: Vec<Value>,
    pub execution_time_ms: f64,
    pub node_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate statistics over one run of a query set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRunSummary {
    pub total_queries: usize,
    pub successful_queries: usize,
    pub failed_queries: usize,
    pub total_nodes: usize,
    pub avg_execution_time_ms: f64,
}

impl QueryRunSummary {
    fn from_records(records: &[QueryRunRecord]) -> Self {
        let total = records.len();
        let successful = records.iter().filter(|r| r.success).count();
        let total_time: f64 = records.iter().map(|r| r.execution_time_ms).sum();
        Self {
            total_queries: total,
            successful_queries: successful,
            failed_queries: total - successful,
            total_nodes: records.iter().map(|r| r.node_count).sum(),
            avg_execution_time_ms: if total == 0 {
                0.0
            } else {
                total_time / total as f64
            },
        }
    }
}

/// Query run records bucketed by category, plus summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizedQueryResults {
    pub imports: Vec<QueryRunRecord>,
    pub usage: Vec<QueryRunRecord>,
    pub jsx: Vec<QueryRunRecord>,
    pub summary: QueryRunSummary,
}

/// Full outcome of running a set: per-query records in priority order and
/// the shared context the processors built up.
pub struct QueryRunOutcome {
    pub records: Vec<QueryRunRecord>,
    pub context: QueryExecutionContext,
}

/// Runs query sets against parsed sources.
pub struct QueryExecutor;

impl QueryExecutor {
    /// Execute every enabled, language-applicable query in priority order.
    pub fn run_set(set: &QuerySet, parsed: &ParsedSource) -> QueryRunOutcome {
        let mut context = QueryExecutionContext::new();
        let mut records = Vec::new();

        for query in set.queries() {
            if !query.enabled || !query.applies_to(parsed.language()) {
                continue;
            }
            let record = Self::run_query(query, parsed, &mut context, set);
            records.push(record);
        }

        QueryRunOutcome { records, context }
    }

    /// Execute a set and bucket the records by category.
    pub fn run_categorized(set: &QuerySet, parsed: &ParsedSource) -> CategorizedQueryResults {
        let outcome = Self::run_set(set, parsed);
        let summary = QueryRunSummary::from_records(&outcome.records);

        let mut imports = Vec::new();
        let mut usage = Vec::new();
        let mut jsx = Vec::new();
        for record in outcome.records {
            match record.category {
                QueryCategory::Imports => imports.push(record),
                QueryCategory::Usage => usage.push(record),
                QueryCategory::Jsx => jsx.push(record),
            }
        }

        CategorizedQueryResults {
            imports,
            usage,
            jsx,
            summary,
        }
    }

    fn run_query(
        definition: &QueryDefinition,
        parsed: &ParsedSource,
        context: &mut QueryExecutionContext,
        set: &QuerySet,
    ) -> QueryRunRecord {
        let started = Instant::now();

        let failed = |error: String, started: Instant| {
            if set.settings().enable_fallback {
                debug!(query = %definition.name, error = %error, "query failed, continuing");
            } else {
                warn!(query = %definition.name, error = %error, "query failed");
            }
            QueryRunRecord {
                query_name: definition.name.clone(),
                category: definition.category,
                success: false,
                results: Vec::new(),
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                node_count: 0,
                error: Some(error),
            }
        };

        let query = match Query::new(parsed.language().grammar(), &definition.pattern) {
            Ok(q) => q,
            Err(e) => return failed(format!("pattern compilation failed: {}", e), started),
        };

        let groups = Self::collect_captures(&query, parsed);

        let results = match (definition.processor)(&groups, context) {
            Ok(results) => results,
            Err(e) => return failed(format!("processor failed: {}", e), started),
        };

        if set.settings().debug {
            debug!(
                query = %definition.name,
                matches = groups.matches().len(),
                results = results.len(),
                "query executed"
            );
        }

        QueryRunRecord {
            query_name: definition.name.clone(),
            category: definition.category,
            success: true,
            results,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            node_count: groups.node_count(),
            error: None,
        }
    }

    fn collect_captures(query: &Query, parsed: &ParsedSource) -> CaptureGroups {
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(query, parsed.root(), parsed.source_bytes());

        let mut groups = CaptureGroups::default();
        while let Some(m) = matches.next() {
            let mut match_captures = QueryMatchCaptures::default();
            for capture in m.captures {
                let name = query.capture_names()[capture.index as usize].to_string();
                match_captures.captures.entry(name).or_default().push(CapturedNode {
                    kind: capture.node.kind().to_string(),
                    text: parsed.node_text(capture.node).to_string(),
                    location: SourceLocation::from_node(capture.node),
                });
                groups.node_count += 1;
            }
            groups.matches.push(match_captures);
        }
        groups
    }
}
