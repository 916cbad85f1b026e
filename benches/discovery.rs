//! Benchmarks for discovery over a synthetic project.
//!
//! Run with: `cargo bench --bench discovery`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use endpoint_indexer::engine::Analyzer;
use endpoint_indexer::frameworks::{Framework, FrameworkDetection, Signal, SignalKind};
use endpoint_indexer::{EngineConfig, RouteMatcher};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Project sizes, in route files
const PROJECT_SIZES: &[usize] = &[10, 100];

const ROUTES_PER_FILE: usize = 20;

fn route_file(index: usize) -> String {
    let mut src = String::from("const express = require('express');\nconst router = express.Router();\n\n");
    for route in 0..ROUTES_PER_FILE {
        src.push_str(&format!(
            "// Route {route} of module {index}\nrouter.get('/m{index}/items/{route}/:id', getItem{route});\nrouter.post('/m{index}/items/{route}', createItem{route});\n"
        ));
    }
    src.push_str("\nmodule.exports = router;\n");
    src
}

fn synthetic_project(files: usize) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("package.json"),
        r#"{"name":"bench","dependencies":{"express":"^4.18.2"}}"#,
    )
    .expect("Failed to write package.json");
    for i in 0..files {
        let path = dir.path().join(format!("src/routes/module_{}.js", i));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, route_file(i)).unwrap();
    }
    dir
}

fn bench_full_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_discovery");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(20);

    let analyzer = Analyzer::new(&EngineConfig::default());
    for &size in PROJECT_SIZES {
        let project = synthetic_project(size);
        let root = project.path().to_path_buf();
        group.bench_with_input(BenchmarkId::from_parameter(size), &root, |b, root| {
            b.iter(|| {
                let analysis = analyzer.analyze_project(black_box(root)).unwrap();
                let report = analyzer
                    .extract_all(&analysis, &CancellationToken::new())
                    .unwrap();
                assert_eq!(report.endpoints.len(), size * ROUTES_PER_FILE * 2);
                report
            })
        });
    }
    group.finish();
}

fn bench_single_file_match(c: &mut Criterion) {
    let matcher = RouteMatcher::new(&EngineConfig::default());
    let detection = FrameworkDetection {
        root: PathBuf::from("/bench"),
        framework: Framework::Express,
        confidence: 0.9,
        signals: vec![Signal::new(SignalKind::Dependency, "express", 0.9, "package.json")],
    };
    let src = route_file(0);
    let relative = Path::new("src/routes/module_0.js");
    let file = Path::new("/bench/src/routes/module_0.js");

    c.bench_function("match_single_file", |b| {
        b.iter(|| {
            matcher
                .match_source(
                    relative,
                    file,
                    black_box(&src),
                    std::slice::from_ref(&detection),
                    &CancellationToken::new(),
                )
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_full_discovery, bench_single_file_match);
criterion_main!(benches);
