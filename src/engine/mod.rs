//! The discovery engine: an explicit context owning per-project stores,
//! cached analyses and watch sessions.

pub mod events;
pub mod pipeline;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{DiscoveryError, Result};
use crate::extractor::Endpoint;
use crate::frameworks::FrameworkDetection;
use crate::manifest::{Manifest, ManifestStore, MergeQueueHandle, MergeScope};
use crate::scanner::check_root;
use crate::watch::coordinator::Coordinator;
use crate::watch::{
    ChangeSource, NotifySource, SessionInfo, SessionRegistry, SessionState, WatchSession,
};

pub use events::EngineEvent;
pub use pipeline::{Analyzer, ExtractionReport, ProjectAnalysis};

/// Per-project state shared by discovery runs and the project's watch session.
pub(crate) struct ProjectState {
    pub root: PathBuf,
    pub store: Arc<ManifestStore>,
    pub queue: MergeQueueHandle,
    analysis: RwLock<AnalysisSlot>,
}

/// The cached analysis and how many times it has been replaced.
#[derive(Default)]
struct AnalysisSlot {
    generation: u64,
    analysis: Option<Arc<ProjectAnalysis>>,
}

impl ProjectState {
    fn new(root: PathBuf, store: Arc<ManifestStore>) -> Self {
        let queue = MergeQueueHandle::new(store.clone());
        Self {
            root,
            store,
            queue,
            analysis: RwLock::new(AnalysisSlot::default()),
        }
    }

    pub fn analysis(&self) -> Option<Arc<ProjectAnalysis>> {
        self.snapshot().0
    }

    /// The cached analysis together with its generation.
    pub fn snapshot(&self) -> (Option<Arc<ProjectAnalysis>>, u64) {
        let slot = self.analysis.read().unwrap_or_else(PoisonError::into_inner);
        (slot.analysis.clone(), slot.generation)
    }

    /// Installs a freshly scanned analysis unconditionally.
    pub fn set_analysis(&self, analysis: Arc<ProjectAnalysis>) {
        let mut slot = self.analysis.write().unwrap_or_else(PoisonError::into_inner);
        slot.generation += 1;
        slot.analysis = Some(analysis);
    }

    /// Installs an analysis derived from generation `base`. Fails when
    /// another analysis was installed in between.
    pub fn replace_analysis(&self, base: u64, analysis: Arc<ProjectAnalysis>) -> bool {
        let mut slot = self.analysis.write().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != base {
            return false;
        }
        slot.generation += 1;
        slot.analysis = Some(analysis);
        true
    }
}

struct EngineInner {
    config: EngineConfig,
    analyzer: Arc<Analyzer>,
    projects: Mutex<HashMap<PathBuf, Arc<ProjectState>>>,
    sessions: SessionRegistry,
    events: broadcast::Sender<EngineEvent>,
    /// Serializes `start_watching` so two callers cannot both start a session
    start_lock: tokio::sync::Mutex<()>,
    source: Arc<dyn ChangeSource>,
}

/// Entry point for discovery and watching. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct DiscoveryEngine {
    inner: Arc<EngineInner>,
}

impl DiscoveryEngine {
    /// Engine watching through the OS file watcher.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_source(config, Arc::new(NotifySource))
    }

    pub fn with_source(config: EngineConfig, source: Arc<dyn ChangeSource>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(EngineInner {
                analyzer: Arc::new(Analyzer::new(&config)),
                config,
                projects: Mutex::new(HashMap::new()),
                sessions: SessionRegistry::new(),
                events,
                start_lock: tokio::sync::Mutex::new(()),
                source,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Runs a full discovery of `root`, commits the manifest and returns
    /// the endpoint list.
    pub async fn discover(&self, root: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
        let root = canonical_root(root.as_ref())?;
        let project = self.project(&root);
        self.discover_project(&project).await
    }

    async fn discover_project(&self, project: &Arc<ProjectState>) -> Result<Vec<Endpoint>> {
        let analyzer = self.inner.analyzer.clone();
        let root = project.root.clone();
        let (analysis, report) = tokio::task::spawn_blocking(move || -> Result<_> {
            let analysis = analyzer.analyze_project(&root)?;
            let report = analyzer.extract_all(&analysis, &CancellationToken::new())?;
            Ok((analysis, report))
        })
        .await
        .map_err(|e| DiscoveryError::Engine(format!("Discovery task failed: {}", e)))??;

        project.set_analysis(Arc::new(analysis));
        let outcome = project
            .queue
            .merge(MergeScope::All, report.endpoints, true)
            .await?;

        info!(
            "Discovered {} endpoints in {} ({} files, {} skipped)",
            outcome.manifest.endpoints.len(),
            project.root.display(),
            report.files,
            report.errors.len()
        );
        let endpoints = outcome.manifest.endpoints.clone();
        if outcome.committed {
            let _ = self.inner.events.send(EngineEvent::EndpointsUpdated {
                root: project.root.clone(),
                endpoints: endpoints.clone(),
            });
        }
        Ok(endpoints)
    }

    /// Starts watching `root`, returning the session id. An already active
    /// session for the root is returned as is.
    pub async fn start_watching(&self, root: impl AsRef<Path>) -> Result<String> {
        let root = canonical_root(root.as_ref())?;
        let _guard = self.inner.start_lock.lock().await;

        if let Some(existing) = self.inner.sessions.active_for(&root) {
            debug!("Reusing session {} for {}", existing.id, root.display());
            return Ok(existing.id.clone());
        }

        let project = self.project(&root);
        if project.analysis().is_none() {
            self.discover_project(&project).await?;
        }

        let initial = self.inner.source.open(&root);
        let state = match &initial {
            Ok(_) => SessionState::Watching,
            Err(e) => {
                warn!("Could not watch {}: {}", root.display(), e);
                SessionState::Error
            }
        };
        let session = Arc::new(WatchSession::new(root.clone(), state));

        let coordinator = Coordinator {
            analyzer: self.inner.analyzer.clone(),
            config: self.inner.config.clone(),
            project,
            events: self.inner.events.clone(),
            source: self.inner.source.clone(),
            session: session.clone(),
        };
        session.attach(tokio::spawn(coordinator.run(initial)));
        self.inner.sessions.register(session.clone());

        info!("Started session {} for {}", session.id, root.display());
        Ok(session.id.clone())
    }

    /// Stops a session and waits for its in-flight work to wind down.
    /// Unknown or already stopped sessions are ignored.
    pub async fn stop_watching(&self, session_id: &str) {
        let Some(session) = self.inner.sessions.get(session_id) else {
            debug!("stop_watching: unknown session {}", session_id);
            return;
        };
        let task = session.deactivate();
        self.inner.sessions.remove(session_id);
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Session {} ended abnormally: {}", session_id, e);
            }
            info!("Stopped session {} for {}", session_id, session.root.display());
        }
    }

    /// The last committed manifest of `root`, `None` if none exists yet.
    pub fn read_manifest(&self, root: impl AsRef<Path>) -> Result<Option<Arc<Manifest>>> {
        let root = canonical_root(root.as_ref())?;
        let known = self
            .projects()
            .get(&root)
            .map(|p| p.store.clone());
        match known {
            Some(store) => store.read(),
            None => ManifestStore::new(self.inner.config.manifest_path(&root)).read(),
        }
    }

    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.inner.sessions.get(session_id).map(|s| s.state())
    }

    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.inner.sessions.list()
    }

    /// Accepted framework detections from the cached analysis of `root`,
    /// analysing the project first if needed.
    pub async fn detections(&self, root: impl AsRef<Path>) -> Result<Vec<FrameworkDetection>> {
        let root = canonical_root(root.as_ref())?;
        let project = self.project(&root);
        if let Some(analysis) = project.analysis() {
            return Ok(analysis.all_detections());
        }

        let analyzer = self.inner.analyzer.clone();
        let analysis = tokio::task::spawn_blocking(move || analyzer.analyze_project(&root))
            .await
            .map_err(|e| DiscoveryError::Engine(format!("Analysis task failed: {}", e)))??;
        let detections = analysis.all_detections();
        project.set_analysis(Arc::new(analysis));
        Ok(detections)
    }

    /// Stops every session and closes the merge queues.
    pub async fn shutdown(&self) {
        for session in self.inner.sessions.drain() {
            if let Some(task) = session.deactivate() {
                let _ = task.await;
            }
        }
        let projects: Vec<Arc<ProjectState>> = self.projects().drain().map(|(_, p)| p).collect();
        for project in projects {
            let _ = project.queue.shutdown().await;
        }
        info!("Engine shut down");
    }

    fn project(&self, root: &Path) -> Arc<ProjectState> {
        self.projects()
            .entry(root.to_path_buf())
            .or_insert_with(|| {
                let store = Arc::new(ManifestStore::new(self.inner.config.manifest_path(root)));
                Arc::new(ProjectState::new(root.to_path_buf(), store))
            })
            .clone()
    }

    fn projects(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<ProjectState>>> {
        self.inner
            .projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Validates `root` and resolves it to the key used for stores and sessions.
fn canonical_root(root: &Path) -> Result<PathBuf> {
    check_root(root)?;
    root.canonicalize()
        .map_err(|e| DiscoveryError::scan(root, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::ChannelSource;
    use std::fs;
    use tempfile::TempDir;

    fn engine() -> DiscoveryEngine {
        DiscoveryEngine::with_source(EngineConfig::default(), Arc::new(ChannelSource::new()))
    }

    fn express_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies":{"express":"^4.18.0"}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("app.js"),
            "const app = require('express')();\napp.get('/', home);\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_discover_writes_manifest() {
        let dir = express_project();
        let engine = engine();

        let endpoints = engine.discover(dir.path()).await.unwrap();
        assert_eq!(endpoints.len(), 1);

        let manifest = engine.read_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(manifest.endpoints, endpoints);
        assert!(dir.path().join(".endpoint-indexer/manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_discover_invalid_root() {
        let dir = TempDir::new().unwrap();
        let result = engine().discover(dir.path().join("nope")).await;
        assert!(matches!(result, Err(DiscoveryError::Scan { .. })));
    }

    #[tokio::test]
    async fn test_read_manifest_before_discovery() {
        let dir = express_project();
        assert!(engine().read_manifest(dir.path()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_watching_is_idempotent_per_root() {
        let dir = express_project();
        let engine = engine();

        let first = engine.start_watching(dir.path()).await.unwrap();
        let second = engine.start_watching(dir.path()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.active_sessions().len(), 1);
        assert_eq!(engine.session_state(&first), Some(SessionState::Watching));

        engine.stop_watching(&first).await;
        assert!(engine.active_sessions().is_empty());
        assert_eq!(engine.session_state(&first), None);

        let third = engine.start_watching(dir.path()).await.unwrap();
        assert_ne!(first, third);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_superseded_analysis_is_not_installed() {
        let dir = express_project();
        let engine = engine();
        engine.discover(dir.path()).await.unwrap();

        let root = canonical_root(dir.path()).unwrap();
        let project = engine.project(&root);
        let (base, generation) = project.snapshot();
        let base = base.unwrap();

        // A full discovery lands while work derived from `base` is in flight
        engine.discover(dir.path()).await.unwrap();
        assert!(!project.replace_analysis(generation, base.clone()));
        let (installed, current) = project.snapshot();
        assert_eq!(current, generation + 1);
        assert!(!Arc::ptr_eq(&installed.unwrap(), &base));

        assert!(project.replace_analysis(current, base.clone()));
        assert!(Arc::ptr_eq(&project.analysis().unwrap(), &base));
    }

    #[tokio::test]
    async fn test_detections_without_discovery() {
        let dir = express_project();
        let detections = engine().detections(dir.path()).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert!(detections[0].confidence >= 0.5 && detections[0].confidence <= 1.0);
    }
}
