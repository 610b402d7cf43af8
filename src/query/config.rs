//! Declarative pattern-query definitions and the set builder.
//!
//! A `QueryDefinition` binds a tree-sitter pattern to a processor closure.
//! The split keeps "what to look for" declarative and "how to interpret a
//! match" in code, so new fact types are added without touching traversal.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;
use crate::language::Language;
use crate::query::executor::{CaptureGroups, QueryExecutionContext};

/// Result bucket a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Imports,
    Usage,
    Jsx,
}

/// Interprets grouped captures into result values, updating shared
/// per-extraction context as a side effect.
pub type QueryProcessor =
    Arc<dyn Fn(&CaptureGroups, &mut QueryExecutionContext) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// One named pattern query.
#[derive(Clone)]
pub struct QueryDefinition {
    /// Unique within one configuration.
    pub name: String,
    pub description: String,
    /// Tree-sitter query text.
    pub pattern: String,
    pub category: QueryCategory,
    /// Languages the pattern compiles for. Empty means all supported.
    pub languages: Vec<Language>,
    /// Descending priority determines execution and merge order.
    pub priority: i32,
    pub enabled: bool,
    pub processor: QueryProcessor,
}

impl QueryDefinition {
    pub fn applies_to(&self, language: Language) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }
}

impl fmt::Debug for QueryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Global execution settings for a query set.
///
/// `enable_fallback` is the only setting the executor acts on directly: a
/// failed query is always recorded and execution continues, but with
/// fallback enabled the failure is logged at debug level instead of warn.
/// `enable_caching` and `timeout_ms` are advisory; they travel with the set
/// so an embedding caller can honor them when scheduling runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Treat per-query failures as recoverable and keep the log quiet.
    pub enable_fallback: bool,
    /// Advisory: callers may reuse run results keyed by source content.
    pub enable_caching: bool,
    pub debug: bool,
    /// Advisory per-run budget for embedding callers.
    pub timeout_ms: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            enable_fallback: true,
            enable_caching: false,
            debug: false,
            timeout_ms: 5_000,
        }
    }
}

/// An immutable, priority-ordered query configuration.
#[derive(Debug, Clone)]
pub struct QuerySet {
    queries: Vec<QueryDefinition>,
    settings: QuerySettings,
}

impl QuerySet {
    pub fn queries(&self) -> &[QueryDefinition] {
        &self.queries
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    pub fn get(&self, name: &str) -> Option<&QueryDefinition> {
        self.queries.iter().find(|q| q.name == name)
    }
}

/// Composes a `QuerySet`: start from a language's defaults (or empty), add,
/// remove, or disable queries by name, override settings, then build.
#[derive(Debug)]
pub struct QuerySetBuilder {
    queries: Vec<QueryDefinition>,
    settings: QuerySettings,
}

impl QuerySetBuilder {
    pub fn new() -> Self {
        Self {
            queries: Vec::new(),
            settings: QuerySettings::default(),
        }
    }

    /// Start from the built-in default set for one language.
    pub fn for_language(language: Language) -> Self {
        Self {
            queries: default_queries()
                .into_iter()
                .filter(|q| q.applies_to(language))
                .collect(),
            settings: QuerySettings::default(),
        }
    }

    pub fn add_query(mut self, query: QueryDefinition) -> Result<Self, Error> {
        if self.queries.iter().any(|q| q.name == query.name) {
            return Err(Error::DuplicateQuery(query.name));
        }
        self.queries.push(query);
        Ok(self)
    }

    pub fn remove_query(mut self, name: &str) -> Result<Self, Error> {
        let before = self.queries.len();
        self.queries.retain(|q| q.name != name);
        if self.queries.len() == before {
            return Err(Error::UnknownQuery(name.to_string()));
        }
        Ok(self)
    }

    pub fn disable_query(mut self, name: &str) -> Result<Self, Error> {
        match self.queries.iter_mut().find(|q| q.name == name) {
            Some(query) => {
                query.enabled = false;
                Ok(self)
            }
            None => Err(Error::UnknownQuery(name.to_string())),
        }
    }

    pub fn enable_query(mut self, name: &str) -> Result<Self, Error> {
        match self.queries.iter_mut().find(|q| q.name == name) {
            Some(query) => {
                query.enabled = true;
                Ok(self)
            }
            None => Err(Error::UnknownQuery(name.to_string())),
        }
    }

    /// Drop queries that do not apply to the target language.
    pub fn retain_language(mut self, language: Language) -> Self {
        self.queries.retain(|q| q.applies_to(language));
        self
    }

    pub fn enable_fallback(mut self, enabled: bool) -> Self {
        self.settings.enable_fallback = enabled;
        self
    }

    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.settings.enable_caching = enabled;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.settings.debug = enabled;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.settings.timeout_ms = timeout_ms;
        self
    }

    /// Normalize and freeze: queries sorted by descending priority, ties
    /// broken by name for deterministic execution order.
    pub fn build(mut self) -> QuerySet {
        self.queries
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
        QuerySet {
            queries: self.queries,
            settings: self.settings,
        }
    }
}

impl Default for QuerySetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The built-in query set: import sources, require/dynamic-import calls,
/// call/member usage, and JSX constructs for the grammars that have them.
pub fn default_queries() -> Vec<QueryDefinition> {
    vec![
        QueryDefinition {
            name: "import-sources".into(),
            description: "Static import statement sources".into(),
            pattern: "(import_statement source: (string) @source) @import".into(),
            category: QueryCategory::Imports,
            languages: Vec::new(),
            priority: 100,
            enabled: true,
            processor: Arc::new(|groups, ctx| {
                let mut results = Vec::new();
                for m in groups.matches() {
                    if let Some(source) = m.first("source") {
                        let unquoted = ctx.unquote(&source.text);
                        ctx.note_import_source(&unquoted);
                        results.push(json!({
                            "source": unquoted,
                            "location": source.location,
                        }));
                    }
                }
                Ok(results)
            }),
        },
        QueryDefinition {
            name: "require-calls".into(),
            description: "CommonJS require calls with literal arguments".into(),
            pattern: "(call_expression function: (identifier) @callee arguments: (arguments (string) @source)) @require"
                .into(),
            category: QueryCategory::Imports,
            languages: Vec::new(),
            priority: 90,
            enabled: true,
            processor: Arc::new(|groups, ctx| {
                let mut results = Vec::new();
                for m in groups.matches() {
                    // The callee filter lives here, not in the pattern;
                    // predicate application is the processor's job.
                    let callee = match m.first("callee") {
                        Some(c) if c.text == "require" => c,
                        _ => continue,
                    };
                    if let Some(source) = m.first("source") {
                        results.push(json!({
                            "source": ctx.unquote(&source.text),
                            "callee": callee.text,
                            "location": source.location,
                        }));
                    }
                }
                Ok(results)
            }),
        },
        QueryDefinition {
            name: "dynamic-imports".into(),
            description: "Dynamic import() calls with literal arguments".into(),
            pattern: "(call_expression function: (import) arguments: (arguments (string) @source)) @dynamic"
                .into(),
            category: QueryCategory::Imports,
            languages: Vec::new(),
            priority: 85,
            enabled: true,
            processor: Arc::new(|groups, ctx| {
                let mut results = Vec::new();
                for m in groups.matches() {
                    if let Some(source) = m.first("source") {
                        results.push(json!({
                            "source": ctx.unquote(&source.text),
                            "location": source.location,
                        }));
                    }
                }
                Ok(results)
            }),
        },
        QueryDefinition {
            name: "call-usage".into(),
            description: "Direct calls through identifiers".into(),
            pattern: "(call_expression function: (identifier) @callee) @call".into(),
            category: QueryCategory::Usage,
            languages: Vec::new(),
            priority: 70,
            enabled: true,
            processor: Arc::new(|groups, ctx| {
                let mut results = Vec::new();
                for m in groups.matches() {
                    if let Some(callee) = m.first("callee") {
                        let event = json!({
                            "callee": callee.text,
                            "resolved": ctx.import_map.contains_key(&callee.text),
                            "location": callee.location,
                        });
                        ctx.usage_events.push(event.clone());
                        results.push(event);
                    }
                }
                Ok(results)
            }),
        },
        QueryDefinition {
            name: "member-usage".into(),
            description: "Member access through identifiers".into(),
            pattern: "(member_expression object: (identifier) @object property: (property_identifier) @property) @member"
                .into(),
            category: QueryCategory::Usage,
            languages: Vec::new(),
            priority: 60,
            enabled: true,
            processor: Arc::new(|groups, ctx| {
                let mut results = Vec::new();
                for m in groups.matches() {
                    if let (Some(object), Some(property)) =
                        (m.first("object"), m.first("property"))
                    {
                        let event = json!({
                            "object": object.text,
                            "property": property.text,
                            "resolved": ctx.import_map.contains_key(&object.text),
                            "location": property.location,
                        });
                        ctx.usage_events.push(event.clone());
                        results.push(event);
                    }
                }
                Ok(results)
            }),
        },
        QueryDefinition {
            name: "jsx-elements".into(),
            description: "JSX opening elements".into(),
            pattern: "(jsx_opening_element name: (_) @tag) @jsx".into(),
            category: QueryCategory::Jsx,
            languages: vec![Language::Tsx, Language::JavaScript],
            priority: 40,
            enabled: true,
            processor: Arc::new(|groups, _ctx| {
                Ok(groups
                    .matches()
                    .iter()
                    .filter_map(|m| m.first("tag"))
                    .map(|tag| json!({ "tag": tag.text, "location": tag.location }))
                    .collect())
            }),
        },
        QueryDefinition {
            name: "jsx-self-closing".into(),
            description: "Self-closing JSX elements".into(),
            pattern: "(jsx_self_closing_element name: (_) @tag) @jsx".into(),
            category: QueryCategory::Jsx,
            languages: vec![Language::Tsx, Language::JavaScript],
            priority: 40,
            enabled: true,
            processor: Arc::new(|groups, _ctx| {
                Ok(groups
                    .matches()
                    .iter()
                    .filter_map(|m| m.first("tag"))
                    .map(|tag| json!({ "tag": tag.text, "location": tag.location }))
                    .collect())
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_from_language_defaults() {
        let set = QuerySetBuilder::for_language(Language::TypeScript).build();
        assert!(set.get("import-sources").is_some());
        // JSX queries do not apply to plain TypeScript.
        assert!(set.get("jsx-elements").is_none());

        let tsx = QuerySetBuilder::for_language(Language::Tsx).build();
        assert!(tsx.get("jsx-elements").is_some());
    }

    #[test]
    fn test_priority_ordering() {
        let set = QuerySetBuilder::for_language(Language::TypeScript).build();
        let priorities: Vec<i32> = set.queries().iter().map(|q| q.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
        assert_eq!(set.queries()[0].name, "import-sources");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let dup = QueryDefinition {
            name: "import-sources".into(),
            description: String::new(),
            pattern: "(import_statement) @i".into(),
            category: QueryCategory::Imports,
            languages: Vec::new(),
            priority: 1,
            enabled: true,
            processor: Arc::new(|_, _| Ok(Vec::new())),
        };
        let err = QuerySetBuilder::for_language(Language::TypeScript)
            .add_query(dup)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateQuery(_)));
    }

    #[test]
    fn test_remove_and_disable() {
        let set = QuerySetBuilder::for_language(Language::TypeScript)
            .remove_query("member-usage")
            .unwrap()
            .disable_query("call-usage")
            .unwrap()
            .build();

        assert!(set.get("member-usage").is_none());
        assert!(!set.get("call-usage").unwrap().enabled);
    }

    #[test]
    fn test_unknown_query_errors() {
        let err = QuerySetBuilder::new().remove_query("nope").unwrap_err();
        assert!(matches!(err, Error::UnknownQuery(_)));
    }

    #[test]
    fn test_settings_overrides() {
        let set = QuerySetBuilder::for_language(Language::TypeScript)
            .enable_fallback(false)
            .enable_caching(true)
            .debug(true)
            .timeout_ms(250)
            .build();

        assert!(!set.settings().enable_fallback);
        assert!(set.settings().enable_caching);
        assert!(set.settings().debug);
        assert_eq!(set.settings().timeout_ms, 250);
    }
}
