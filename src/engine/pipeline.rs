//! Scanner → Detector → Matcher → Extractor.
//!
//! Runs synchronously; callers on the async side go through
//! `spawn_blocking`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, ProjectConfig};
use crate::error::{DiscoveryError, Result};
use crate::extractor::{Endpoint, EndpointExtractor};
use crate::frameworks::{DetectionOutcome, FrameworkDetection, FrameworkDetector};
use crate::matcher::{MatchFailure, ParseError, RawMatch, RouteMatcher};
use crate::scanner::{check_root, IgnoreRules, PathFilter, ScanResult, ScanRoot, Scanner};

/// Layout and detections of one project, cached between reparses.
#[derive(Debug, Clone)]
pub struct ProjectAnalysis {
    pub scan: ScanResult,
    pub detections: BTreeMap<PathBuf, DetectionOutcome>,
    pub config: ProjectConfig,
    pub filter: PathFilter,
    pub ignore: IgnoreRules,
}

impl ProjectAnalysis {
    pub fn root(&self) -> &Path {
        &self.scan.project.path
    }

    /// Accepted detections of one scan root.
    pub fn detections_for(&self, root: &Path) -> &[FrameworkDetection] {
        self.detections
            .get(root)
            .map(|d| d.accepted.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_detections(&self) -> Vec<FrameworkDetection> {
        self.detections
            .values()
            .flat_map(|d| d.accepted.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub endpoints: Vec<Endpoint>,
    pub errors: Vec<ParseError>,
    /// Set when cancellation stopped the run; `endpoints` is then partial
    pub cancelled: bool,
    pub files: usize,
}

pub struct Analyzer {
    scanner: Scanner,
    detector: FrameworkDetector,
    matcher: RouteMatcher,
    /// Worker pools keyed by thread count, built on first use
    pools: Mutex<HashMap<usize, Arc<rayon::ThreadPool>>>,
}

impl Analyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scanner: Scanner::new(config.state_dir.clone()),
            detector: FrameworkDetector::new(config),
            matcher: RouteMatcher::new(config),
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn analyze_project(&self, root: &Path) -> Result<ProjectAnalysis> {
        check_root(root)?;
        let config = ProjectConfig::load(root)?;
        let filter = PathFilter::new(root, &config.watch)?;
        let scan = self.scanner.scan(root, &config.watch)?;
        for warning in &scan.warnings {
            warn!(
                "Scan warning{}: {}",
                warning
                    .path
                    .as_ref()
                    .map(|p| format!(" at {}", p.display()))
                    .unwrap_or_default(),
                warning.message
            );
        }

        let detections = scan
            .roots
            .iter()
            .map(|r| (r.path.clone(), self.detector.detect(r)))
            .collect();

        Ok(ProjectAnalysis {
            scan,
            detections,
            config,
            filter,
            ignore: IgnoreRules::new(root),
        })
    }

    /// Re-reads the descriptors of `root` and runs detection again.
    /// Returns true when the accepted framework set changed.
    pub fn redetect(&self, analysis: &mut ProjectAnalysis, root: &Path) -> bool {
        let Some(scan_root) = analysis.scan.roots.iter_mut().find(|r| r.path == root) else {
            return false;
        };
        scan_root.reload_descriptors(self.scanner.registry());
        let outcome = self.detector.detect(scan_root);

        let before = analysis
            .detections
            .get(root)
            .map(|d| d.frameworks())
            .unwrap_or_default();
        let changed = before != outcome.frameworks();
        if changed {
            info!(
                "Frameworks of {} changed: {:?} -> {:?}",
                root.display(),
                before,
                outcome.frameworks()
            );
        }
        analysis.detections.insert(root.to_path_buf(), outcome);
        changed
    }

    /// Matches every file of the project.
    pub fn extract_all(
        &self,
        analysis: &ProjectAnalysis,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let work: Vec<(&ScanRoot, &Path)> = analysis
            .scan
            .roots
            .iter()
            .flat_map(|r| r.files.iter().map(move |f| (r, f.as_path())))
            .collect();
        self.run(analysis, work, cancel)
    }

    /// Matches only `files`. Files that no longer exist contribute nothing.
    pub fn extract_files(
        &self,
        analysis: &ProjectAnalysis,
        files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let work: Vec<(&ScanRoot, &Path)> = files
            .iter()
            .filter(|f| f.is_file())
            .filter_map(|f| analysis.scan.root_for(f).map(|r| (r, f.as_path())))
            .collect();
        self.run(analysis, work, cancel)
    }

    fn run(
        &self,
        analysis: &ProjectAnalysis,
        work: Vec<(&ScanRoot, &Path)>,
        cancel: &CancellationToken,
    ) -> Result<ExtractionReport> {
        let pool = self.pool(analysis.config.parser.parallelism)?;

        let results: Vec<std::result::Result<Vec<RawMatch>, MatchFailure>> = pool.install(|| {
            work.par_iter()
                .map(|(scan_root, file)| {
                    if cancel.is_cancelled() {
                        return Err(MatchFailure::Cancelled);
                    }
                    self.matcher.match_file(
                        &scan_root.path,
                        file,
                        analysis.detections_for(&scan_root.path),
                        cancel,
                    )
                })
                .collect()
        });

        let mut report = ExtractionReport {
            files: work.len(),
            ..Default::default()
        };
        let mut raw = Vec::new();
        for result in results {
            match result {
                Ok(matches) => raw.extend(matches),
                Err(MatchFailure::Parse(error)) => {
                    warn!("Skipping file: {}", error);
                    report.errors.push(error);
                }
                Err(MatchFailure::Cancelled) => report.cancelled = true,
            }
        }
        if report.cancelled {
            debug!("Extraction for {} cancelled", analysis.root().display());
            return Ok(report);
        }

        let extractor = EndpointExtractor::new(analysis.root());
        report.endpoints = extractor.extract(raw, Utc::now());
        debug!(
            "Extracted {} endpoints from {} files ({} skipped)",
            report.endpoints.len(),
            report.files,
            report.errors.len()
        );
        Ok(report)
    }

    fn pool(&self, parallelism: Option<usize>) -> Result<Arc<rayon::ThreadPool>> {
        let threads = parallelism
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1);
        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pool) = pools.get(&threads) {
            return Ok(pool.clone());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("endpoint-matcher-{}", i))
            .build()
            .map_err(|e| DiscoveryError::Engine(format!("Failed to build worker pool: {}", e)))?;
        let pool = Arc::new(pool);
        pools.insert(threads, pool.clone());
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ParseErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn express_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", r#"{"dependencies":{"express":"^4.18.0"}}"#);
        write(
            dir.path(),
            "app.js",
            "const express = require('express');\nconst app = express();\napp.get('/', home);\napp.post('/users', createUser);\n",
        );
        dir
    }

    #[test]
    fn test_analyze_and_extract_all() {
        let dir = express_project();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let analysis = analyzer.analyze_project(dir.path()).unwrap();
        assert_eq!(analysis.all_detections().len(), 1);

        let report = analyzer
            .extract_all(&analysis, &CancellationToken::new())
            .unwrap();
        assert!(!report.cancelled);
        assert!(report.errors.is_empty());
        let routes: Vec<_> = report
            .endpoints
            .iter()
            .map(|e| (e.method.as_str(), e.path.as_str(), e.file()))
            .collect();
        assert_eq!(routes, vec![("GET", "/", "app.js"), ("POST", "/users", "app.js")]);
    }

    #[test]
    fn test_extract_files_skips_missing() {
        let dir = express_project();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let analysis = analyzer.analyze_project(dir.path()).unwrap();

        let report = analyzer
            .extract_files(
                &analysis,
                &[dir.path().join("gone.js")],
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(report.files, 0);
        assert!(report.endpoints.is_empty());
    }

    #[test]
    fn test_cancelled_extraction_reports_cancelled() {
        let dir = express_project();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let analysis = analyzer.analyze_project(dir.path()).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = analyzer.extract_all(&analysis, &cancel).unwrap();
        assert!(report.cancelled);
        assert!(report.endpoints.is_empty());
    }

    #[test]
    fn test_timed_out_files_are_reported_not_fatal() {
        let dir = express_project();
        write(
            dir.path(),
            "routes/admin.js",
            "const app = require('express')();\napp.delete('/admin', drop);\n",
        );
        let mut config = EngineConfig::default();
        config.file_budget = std::time::Duration::ZERO;
        let analyzer = Analyzer::new(&config);
        let analysis = analyzer.analyze_project(dir.path()).unwrap();

        let report = analyzer
            .extract_all(&analysis, &CancellationToken::new())
            .unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.files, 2);
        assert!(report.endpoints.is_empty());
        let mut timed_out: Vec<_> = report
            .errors
            .iter()
            .filter(|e| matches!(e.kind, ParseErrorKind::TimedOut { .. }))
            .map(|e| e.file.clone())
            .collect();
        timed_out.sort();
        assert_eq!(
            timed_out,
            vec![dir.path().join("app.js"), dir.path().join("routes/admin.js")]
        );
    }

    #[test]
    fn test_unreadable_file_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "web/package.json", r#"{"dependencies":{"express":"^4"}}"#);
        write(dir.path(), "web/server.js", "const app = require('express')();\napp.get('/ok', ok);\n");
        let analyzer = Analyzer::new(&EngineConfig::default());
        let analysis = analyzer.analyze_project(dir.path()).unwrap();

        // A file that vanished after the scan fails on its own
        fs::write(dir.path().join("web/extra.js"), "app.get('/gone', g);\n").unwrap();
        let mut stale = analysis.clone();
        let extra = dir.path().join("web/extra.js");
        stale.scan.root_for_mut(&extra).unwrap().files.push(extra.clone());
        fs::remove_file(&extra).unwrap();

        let report = analyzer
            .extract_all(&stale, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0].kind, ParseErrorKind::Unreadable { .. }));
        assert_eq!(report.endpoints.len(), 1);
        assert_eq!(report.endpoints[0].path, "/ok");
    }

    #[test]
    fn test_worker_pool_is_reused() {
        let dir = express_project();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let analysis = analyzer.analyze_project(dir.path()).unwrap();

        let first = analyzer.pool(analysis.config.parser.parallelism).unwrap();
        for _ in 0..3 {
            analyzer
                .extract_all(&analysis, &CancellationToken::new())
                .unwrap();
        }
        let second = analyzer.pool(analysis.config.parser.parallelism).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(analyzer.pools.lock().unwrap().len(), 1);

        let two = analyzer.pool(Some(2)).unwrap();
        assert_eq!(two.current_num_threads(), 2);
    }

    #[test]
    fn test_redetect_after_descriptor_edit() {
        let dir = express_project();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let mut analysis = analyzer.analyze_project(dir.path()).unwrap();

        write(dir.path(), "package.json", r#"{"dependencies":{"lodash":"^4"}}"#);
        write(dir.path(), "app.js", "module.exports = {};\n");
        let root = dir.path().to_path_buf();
        assert!(analyzer.redetect(&mut analysis, &root));
        assert!(analysis.detections_for(&root).is_empty());
    }

    #[test]
    fn test_invalid_root_is_scan_error() {
        let dir = TempDir::new().unwrap();
        let analyzer = Analyzer::new(&EngineConfig::default());
        let result = analyzer.analyze_project(&dir.path().join("missing"));
        assert!(matches!(result, Err(DiscoveryError::Scan { .. })));
    }
}
