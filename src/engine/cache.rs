//! Content-addressed result cache.
//!
//! Reports are keyed by file path and guarded by a fingerprint of the
//! source bytes plus the extractor set that produced them. A stale
//! fingerprint is a miss, so edited files re-analyze without an explicit
//! invalidation step. Concurrent writers for the same path are resolved
//! last-writer-wins.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::engine::AnalysisReport;

/// Fingerprint of source content and the extractor set applied to it.
pub(crate) fn fingerprint(source: &[u8], extractor_names: &[String]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source);
    for name in extractor_names {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex().to_string()
}

struct CacheEntry {
    fingerprint: String,
    report: AnalysisReport,
}

struct CacheState {
    map: HashMap<String, CacheEntry>,
    /// Insertion order of paths, oldest first. Used for eviction.
    order: Vec<String>,
    hits: u64,
    misses: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Bounded cache of analysis reports.
pub struct ResultCache {
    max_entries: usize,
    state: RwLock<CacheState>,
}

impl ResultCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            state: RwLock::new(CacheState {
                map: HashMap::new(),
                order: Vec::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Look up a report. Only returns on an exact fingerprint match.
    pub fn get(&self, path: &str, fingerprint: &str) -> Option<AnalysisReport> {
        let mut state = self.state.write().unwrap();
        match state.map.get(path) {
            Some(entry) if entry.fingerprint == fingerprint => {
                let report = entry.report.clone();
                state.hits += 1;
                Some(report)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Store a report, evicting oldest-inserted entries past capacity.
    pub fn insert(&self, path: &str, fingerprint: String, report: AnalysisReport) {
        let mut state = self.state.write().unwrap();

        if !state.map.contains_key(path) {
            state.order.push(path.to_string());
        }
        state.map.insert(
            path.to_string(),
            CacheEntry {
                fingerprint,
                report,
            },
        );

        while state.map.len() > self.max_entries {
            let oldest = state.order.remove(0);
            state.map.remove(&oldest);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.read().unwrap();
        CacheStats {
            entries: state.map.len(),
            max_entries: self.max_entries,
            hits: state.hits,
            misses: state.misses,
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.write().unwrap();
        state.map.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use std::collections::BTreeMap;

    fn report(path: &str) -> AnalysisReport {
        AnalysisReport {
            file_path: path.to_string(),
            language: Language::TypeScript,
            extracted_data: BTreeMap::new(),
            validation: BTreeMap::new(),
            errors: BTreeMap::new(),
            from_cache: false,
            debug: None,
        }
    }

    #[test]
    fn test_fingerprint_varies_with_content_and_extractors() {
        let names = vec!["dependencies".to_string()];
        let a = fingerprint(b"const x = 1;", &names);
        let b = fingerprint(b"const x = 2;", &names);
        let c = fingerprint(b"const x = 1;", &["usage".to_string()]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, fingerprint(b"const x = 1;", &names));
    }

    #[test]
    fn test_stale_fingerprint_is_a_miss() {
        let cache = ResultCache::new(4);
        cache.insert("a.ts", "f1".into(), report("a.ts"));

        assert!(cache.get("a.ts", "f1").is_some());
        assert!(cache.get("a.ts", "f2").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_eviction_drops_oldest_inserted() {
        let cache = ResultCache::new(2);
        cache.insert("a.ts", "f".into(), report("a.ts"));
        cache.insert("b.ts", "f".into(), report("b.ts"));
        cache.insert("c.ts", "f".into(), report("c.ts"));

        assert!(cache.get("a.ts", "f").is_none());
        assert!(cache.get("b.ts", "f").is_some());
        assert!(cache.get("c.ts", "f").is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_reinsert_overwrites() {
        let cache = ResultCache::new(2);
        cache.insert("a.ts", "f1".into(), report("a.ts"));
        cache.insert("a.ts", "f2".into(), report("a.ts"));

        assert!(cache.get("a.ts", "f1").is_none());
        assert!(cache.get("a.ts", "f2").is_some());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::new(4);
        cache.insert("a.ts", "f".into(), report("a.ts"));
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert!(cache.get("a.ts", "f").is_none());
    }
}
