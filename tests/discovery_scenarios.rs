//! End-to-end discovery over fixture projects.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use endpoint_indexer::{
    ChannelSource, DiscoveryEngine, DiscoveryError, EngineConfig, Framework, HttpMethod,
};

fn write(root: &Path, name: &str, content: &str) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn engine_with(config: EngineConfig) -> DiscoveryEngine {
    DiscoveryEngine::with_source(config, Arc::new(ChannelSource::new()))
}

fn engine() -> DiscoveryEngine {
    engine_with(EngineConfig::default())
}

const EXPRESS_APP: &str = r#"const express = require('express');
const app = express();

app.get('/', (req, res) => res.send('ok'));
app.post('/users', createUser);
app.get('/users/:id', getUser);

app.listen(3000);
"#;

fn express_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", r#"{"name":"api","dependencies":{"express":"^4.18.2"}}"#);
    write(dir.path(), "src/app.js", EXPRESS_APP);
    dir
}

#[tokio::test]
async fn test_three_literal_routes() {
    let dir = express_project();
    let endpoints = engine().discover(dir.path()).await.unwrap();

    let routes: Vec<_> = endpoints
        .iter()
        .map(|e| (e.method, e.path.as_str()))
        .collect();
    assert_eq!(
        routes,
        vec![
            (HttpMethod::Get, "/"),
            (HttpMethod::Get, "/users/:id"),
            (HttpMethod::Post, "/users"),
        ]
    );
    assert!(endpoints.iter().all(|e| e.framework == Framework::Express));
    assert!(endpoints.iter().all(|e| e.handler.file == "src/app.js"));
    assert_eq!(endpoints[1].parameters(), vec!["id".to_string()]);

    let by_line: Vec<u32> = endpoints.iter().map(|e| e.handler.line).collect();
    assert_eq!(by_line, vec![4, 6, 5]);
}

#[tokio::test]
async fn test_repeated_discovery_is_deterministic() {
    let dir = express_project();
    let engine = engine();

    let first = engine.discover(dir.path()).await.unwrap();
    let second = engine.discover(dir.path()).await.unwrap();
    assert_eq!(first, second);

    // A fresh engine over the same files produces the same ids and order
    let third = self::engine().discover(dir.path()).await.unwrap();
    let ids = |list: &[endpoint_indexer::Endpoint]| -> Vec<String> {
        list.iter().map(|e| e.id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&third));
}

#[tokio::test]
async fn test_manifest_persisted_form() {
    let dir = express_project();
    engine().discover(dir.path()).await.unwrap();

    let raw = fs::read_to_string(dir.path().join(".endpoint-indexer/manifest.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["version"], "1.0.0");
    assert!(json["last_updated"].is_string());
    assert_eq!(json["statistics"]["total"], 3);
    assert_eq!(json["statistics"]["by_method"]["GET"], 2);
    assert_eq!(json["statistics"]["by_method"]["POST"], 1);
    assert!(json["statistics"]["by_method"].get("DELETE").is_none());

    let first = &json["endpoints"][0];
    assert_eq!(first["method"], "GET");
    assert_eq!(first["path"], "/");
    assert_eq!(first["file"], "src/app.js");
    assert_eq!(first["line"], 4);
    assert_eq!(first["framework"], "express");
    assert!(first["confidence"].as_f64().unwrap() <= 1.0);
    assert!(first["last_seen"].is_string());
}

#[tokio::test]
async fn test_monorepo_with_two_frameworks() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "web/package.json", r#"{"dependencies":{"express":"^4"}}"#);
    write(
        dir.path(),
        "web/server.js",
        "const app = require('express')();\napp.get('/status', status);\n",
    );
    write(dir.path(), "api/requirements.txt", "fastapi==0.110.0\nuvicorn\n");
    write(
        dir.path(),
        "api/main.py",
        "from fastapi import FastAPI\n\napp = FastAPI()\n\n@app.get(\"/items/{item_id}\")\ndef read_item(item_id: int):\n    return {}\n",
    );

    let engine = engine();
    let detections = engine.detections(dir.path()).await.unwrap();
    let mut frameworks: Vec<Framework> = detections.iter().map(|d| d.framework).collect();
    frameworks.sort();
    assert_eq!(frameworks, vec![Framework::Express, Framework::FastApi]);
    assert!(detections
        .iter()
        .all(|d| (0.0..=1.0).contains(&d.confidence) && d.signals.iter().all(|s| (0.0..=1.0).contains(&s.confidence))));

    let endpoints = engine.discover(dir.path()).await.unwrap();
    let tagged: Vec<_> = endpoints
        .iter()
        .map(|e| (e.framework, e.path.as_str(), e.handler.file.as_str()))
        .collect();
    assert_eq!(
        tagged,
        vec![
            (Framework::FastApi, "/items/{item_id}", "api/main.py"),
            (Framework::Express, "/status", "web/server.js"),
        ]
    );
    assert_eq!(endpoints[0].handler.handler.as_deref(), Some("read_item"));
}

#[tokio::test]
async fn test_same_route_in_two_files_is_kept_twice() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "package.json", r#"{"dependencies":{"express":"^4"}}"#);
    write(dir.path(), "a.js", "const app = require('express')();\napp.get('/health', a);\n");
    write(dir.path(), "b.js", "const app = require('express')();\napp.get('/health', b);\n");

    let endpoints = engine().discover(dir.path()).await.unwrap();
    let files: Vec<_> = endpoints.iter().map(|e| e.handler.file.as_str()).collect();
    assert_eq!(files, vec!["a.js", "b.js"]);
    assert_ne!(endpoints[0].id, endpoints[1].id);
}

#[tokio::test]
async fn test_watch_exclude_from_project_config() {
    let dir = express_project();
    write(
        dir.path(),
        "legacy/old.js",
        "const app = require('express')();\napp.delete('/old', drop);\n",
    );
    write(
        dir.path(),
        "endpoint-indexer.json",
        r#"{ "watch": { "exclude": ["legacy/**"] } }"#,
    );

    let endpoints = engine().discover(dir.path()).await.unwrap();
    assert_eq!(endpoints.len(), 3);
    assert!(endpoints.iter().all(|e| !e.handler.file.starts_with("legacy/")));
}

#[tokio::test]
async fn test_oversized_file_is_skipped_not_fatal() {
    let dir = express_project();
    let mut big = String::from("const app = require('express')();\n");
    for i in 0..400 {
        big.push_str(&format!("app.get('/generated/{}', h);\n", i));
    }
    write(dir.path(), "src/generated.js", &big);

    let mut config = EngineConfig::default();
    config.max_file_bytes = 4 * 1024;
    let endpoints = engine_with(config).discover(dir.path()).await.unwrap();
    assert_eq!(endpoints.len(), 3);
}

#[tokio::test]
async fn test_invalid_root_fails_with_scan_error() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("file.txt");
    fs::write(&file, "not a directory").unwrap();

    let engine = engine();
    assert!(matches!(
        engine.discover(dir.path().join("missing")).await,
        Err(DiscoveryError::Scan { .. })
    ));
    assert!(matches!(engine.discover(&file).await, Err(DiscoveryError::Scan { .. })));
}

#[tokio::test]
async fn test_corrupt_manifest_surfaces_io_error() {
    let dir = express_project();
    write(dir.path(), ".endpoint-indexer/manifest.json", "{ definitely not json");

    match engine().read_manifest(dir.path()) {
        Err(DiscoveryError::ManifestIo { reason, .. }) => assert!(reason.contains("corrupt")),
        other => panic!("expected ManifestIo, got {:?}", other.map(|m| m.is_some())),
    }
}

#[tokio::test]
async fn test_discovery_replaces_corrupt_manifest() {
    let dir = express_project();
    write(dir.path(), ".endpoint-indexer/manifest.json", "{ definitely not json");

    let engine = engine();
    let endpoints = engine.discover(dir.path()).await.unwrap();
    assert_eq!(endpoints.len(), 3);
    let manifest = engine.read_manifest(dir.path()).unwrap().unwrap();
    assert_eq!(manifest.statistics.total, 3);
}
