//! Integration tests for the analysis engine.
//!
//! These run realistic TypeScript and TSX modules through the full
//! pipeline and check cross-extractor consistency of the merged report.

use codefacts::extract::{
    ComplexityExtractor, DependencyExtractor, ExportExtractor, Extractor, UsageExtractor,
};
use codefacts::{
    AnalysisConfigBuilder, AnalysisEngine, AnalysisPreset, ExtractionRequest, Language,
    ParsedSource,
};

const SERVICE_TS: &str = r#"
import { fetchUser, parseProfile as parse } from './api';
import * as log from './log';
import type { Profile } from './types';
import config from './config';

const db = require('./db');

export const VERSION = '2.1.0';

export interface ServiceOptions {
    retries: number;
}

export default class UserService {
    private cache: Map<string, Profile> = new Map();

    constructor(private options: ServiceOptions) {}

    async load(id: string): Promise<Profile | null> {
        if (this.cache.has(id)) {
            return this.cache.get(id) ?? null;
        }
        const raw = await fetchUser(id);
        if (!raw) {
            log.warn('missing user', id);
            return null;
        }
        const profile = parse(raw);
        this.cache.set(id, profile);
        return profile;
    }

    evict(id: string): boolean {
        return this.cache.delete(id);
    }
}

export function retries(options: ServiceOptions): number {
    let n = 0;
    for (let i = 0; i < options.retries; i++) {
        if (i % 2 === 0 && i > 0) {
            n++;
        }
    }
    return n;
}

export { fetchUser } from './api';
"#;

fn analyze(source: &str, path: &str) -> codefacts::AnalysisReport {
    let engine = AnalysisEngine::with_builtins();
    let config = AnalysisConfigBuilder::new().build();
    engine.analyze_source(source, path, &config).unwrap()
}

#[test]
fn test_full_report_over_service_module() {
    let report = analyze(SERVICE_TS, "service.ts");

    assert_eq!(report.language, Language::TypeScript);
    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert_eq!(report.extracted_data.len(), 5);
    for (name, result) in &report.validation {
        assert!(result.is_valid, "{} failed validation: {:?}", name, result.errors);
    }
}

#[test]
fn test_dependency_edges() {
    let report = analyze(SERVICE_TS, "service.ts");
    let deps = &report.extracted_data["dependencies"];

    // Four imports, one require, one re-export.
    assert_eq!(deps["importCount"], 4);
    assert_eq!(deps["requireCount"], 1);
    assert_eq!(deps["exportCount"], 1);
    assert_eq!(deps["typeOnlyImportCount"], 1);

    let sources: Vec<&str> = deps["dependencies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["source"].as_str().unwrap())
        .collect();
    assert!(sources.contains(&"./api"));
    assert!(sources.contains(&"./db"));
    assert!(sources.contains(&"./types"));
}

#[test]
fn test_usage_resolution_through_aliases() {
    let report = analyze(SERVICE_TS, "service.ts");
    let usage = &report.extracted_data["usage"];

    let api_usages = usage["usages"]["./api"].as_array().unwrap();
    let parse_usage = api_usages
        .iter()
        .find(|u| u["methodName"] == "parse")
        .expect("aliased import should be tracked under its local name");
    assert_eq!(parse_usage["originalName"], "parseProfile");
    assert_eq!(parse_usage["usageKind"], "call");
    assert_eq!(parse_usage["callCount"], 1);

    // Namespace member access resolves to the namespace's module.
    let log_usages = usage["usages"]["./log"].as_array().unwrap();
    assert!(log_usages.iter().any(|u| u["methodName"] == "warn"));

    // The default import is never used.
    let unused = usage["unusedImports"]["./config"].as_array().unwrap();
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0], "config");
}

#[test]
fn test_export_surface_and_class_structure() {
    let report = analyze(SERVICE_TS, "service.ts");
    let exports = &report.extracted_data["exports"];

    let records = exports["exports"].as_array().unwrap();
    let names: Vec<&str> = records
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"VERSION"));
    assert!(names.contains(&"ServiceOptions"));
    assert!(names.contains(&"UserService"));
    assert!(names.contains(&"retries"));

    assert_eq!(exports["reExportCount"], 1);

    let classes = exports["classes"].as_array().unwrap();
    assert_eq!(classes.len(), 1);
    let service = &classes[0];
    assert_eq!(service["className"], "UserService");
    assert_eq!(service["isDefaultExport"], true);
    let methods = service["methods"].as_array().unwrap();
    assert!(methods.iter().any(|m| m["name"] == "load"));
    assert!(methods.iter().any(|m| m["name"] == "evict"));
}

#[test]
fn test_complexity_summary() {
    let report = analyze(SERVICE_TS, "service.ts");
    let complexity = &report.extracted_data["complexity"];

    let functions = complexity["functions"].as_array().unwrap();
    let load = functions
        .iter()
        .find(|f| f["functionName"] == "load")
        .unwrap();
    // Two ifs and one ?? on top of the base path.
    assert!(load["cyclomaticComplexity"].as_u64().unwrap() >= 4);

    let retries = functions
        .iter()
        .find(|f| f["functionName"] == "retries")
        .unwrap();
    assert!(retries["maxNestingDepth"].as_u64().unwrap() >= 2);

    assert_eq!(
        complexity["totalFunctions"].as_u64().unwrap() as usize,
        functions.len()
    );
}

#[test]
fn test_analysis_is_deterministic() {
    let engine = AnalysisEngine::with_builtins();
    let config = AnalysisConfigBuilder::new().with_cache(false).build();

    let first = engine
        .analyze_source(SERVICE_TS, "service.ts", &config)
        .unwrap();
    let second = engine
        .analyze_source(SERVICE_TS, "service.ts", &config)
        .unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[test]
fn test_tsx_module() {
    let source = r#"
import React from 'react';
import { Button } from './button';

export function Toolbar(): JSX.Element {
    return (
        <div className="toolbar">
            <Button label="save" />
        </div>
    );
}
"#;
    let report = analyze(source, "toolbar.tsx");

    assert_eq!(report.language, Language::Tsx);
    assert!(report.errors.is_empty());

    let usage = &report.extracted_data["usage"];
    // JSX component usage counts as a reference to the import.
    assert!(usage["importMap"]["Button"]["source"] == "./button");
}

#[test]
fn test_preset_controls_extractor_set() {
    let engine = AnalysisEngine::with_builtins();
    let config = AnalysisConfigBuilder::new()
        .with_preset(AnalysisPreset::Fast)
        .build();
    let report = engine
        .analyze_source(SERVICE_TS, "service.ts", &config)
        .unwrap();

    let keys: Vec<&String> = report.extracted_data.keys().collect();
    assert_eq!(keys, vec!["dependencies", "identifiers"]);
}

#[test]
fn test_cache_shared_across_calls() {
    let engine = AnalysisEngine::with_builtins();
    let config = AnalysisConfigBuilder::new().build();

    let first = engine
        .analyze_source(SERVICE_TS, "service.ts", &config)
        .unwrap();
    let second = engine
        .analyze_source(SERVICE_TS, "service.ts", &config)
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(engine.cache_stats().hits, 1);
}

#[test]
fn test_extractors_run_standalone() {
    let parsed = ParsedSource::parse(SERVICE_TS, Language::TypeScript, "service.ts").unwrap();
    let request = ExtractionRequest::with_defaults(&parsed);

    let deps = DependencyExtractor::new().extract(&request).unwrap();
    let usage = UsageExtractor::new().extract(&request).unwrap();
    let exports = ExportExtractor::new().extract(&request).unwrap();
    let complexity = ComplexityExtractor::new().extract(&request).unwrap();

    // The usage extractor embeds the same dependency pass.
    assert_eq!(deps.dependencies.len(), usage.dependencies.dependencies.len());
    assert_eq!(exports.export_count, exports.exports.len());
    assert!(complexity.total_functions >= 3);
}

#[test]
fn test_unknown_extension_is_an_error() {
    let engine = AnalysisEngine::with_builtins();
    let config = AnalysisConfigBuilder::new().build();
    assert!(engine
        .analyze_source("x = 1", "script.py", &config)
        .is_err());
}
