//! Incremental reparse coordinator.
//!
//! One coordinator task runs per watch session. It debounces change
//! notifications per path, reparses the smallest affected scope and submits
//! the result to the project's merge queue. A broken change stream is
//! reopened with exponential backoff.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, CONFIG_FILE_JSON, CONFIG_FILE_TOML};
use crate::dependencies::is_descriptor;
use crate::engine::{Analyzer, EngineEvent, ExtractionReport, ProjectAnalysis, ProjectState};
use crate::error::{DiscoveryError, Result};
use crate::extractor::{relative_key, Endpoint};
use crate::frameworks::Framework;
use crate::manifest::{EndpointDiff, MergeScope};
use crate::scanner::ignore_rules::GIT_EXCLUDE;
use crate::scanner::{is_in_skipped_dir, is_source_file, IgnoreRules};

use super::session::{SessionState, WatchSession};
use super::source::{ChangeKind, ChangeNotification, ChangeSource, ChangeStream, SourceEvent};

pub(crate) struct Coordinator {
    pub analyzer: Arc<Analyzer>,
    pub config: EngineConfig,
    pub project: Arc<ProjectState>,
    pub events: broadcast::Sender<EngineEvent>,
    pub source: Arc<dyn ChangeSource>,
    pub session: Arc<WatchSession>,
}

struct Pending {
    kind: ChangeKind,
    deadline: Instant,
    notification: ChangeNotification,
}

enum Step {
    Cancelled,
    Event(Option<SourceEvent>),
    Due,
}

/// What a batch of notifications touches.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Affected {
    SourceFile,
    /// A deleted directory that held source files
    Directory,
    Descriptor,
    /// A framework marker file or directory (or an ancestor of one) of the
    /// given scan root
    Marker(PathBuf),
    /// Project configuration or ignore rules
    Config,
}

/// Result of reparsing one batch, ready to merge.
struct Reparse {
    analysis: ProjectAnalysis,
    report: ExtractionReport,
    scope: MergeScope,
}

impl Coordinator {
    pub async fn run(self, initial: Result<ChangeStream>) {
        let cancel = self.session.cancel_token();
        let root = self.project.root.clone();
        let mut failure = String::new();
        let mut stream = match initial {
            Ok(stream) => Some(stream),
            Err(e) => {
                failure = e.to_string();
                None
            }
        };
        let mut pending: HashMap<PathBuf, Pending> = HashMap::new();

        info!("Watching {} (session {})", root.display(), self.session.id);

        loop {
            if stream.is_none() {
                match self.reconnect(&failure, &cancel).await {
                    Some(reopened) => {
                        stream = Some(reopened);
                        // Notifications may have been lost while disconnected
                        pending.clear();
                        self.full_rescan(Vec::new(), &cancel).await;
                    }
                    None => break,
                }
            }
            let Some(active) = stream.as_mut() else {
                continue;
            };

            let deadline = pending.values().map(|p| p.deadline).min();
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                event = active.next() => Step::Event(event),
                _ = sleep_until(deadline) => Step::Due,
            };

            match step {
                Step::Cancelled => break,
                Step::Event(Some(SourceEvent::Change(notification))) => {
                    if self.classify(&notification).is_some() {
                        self.record(&mut pending, notification);
                    }
                }
                Step::Event(Some(SourceEvent::Rescan)) => {
                    warn!("Change events for {} were dropped; rescanning", root.display());
                    pending.clear();
                    self.full_rescan(Vec::new(), &cancel).await;
                }
                Step::Event(Some(SourceEvent::Failed(reason))) => {
                    warn!("Change source for {} failed: {}", root.display(), reason);
                    failure = reason;
                    stream = None;
                }
                Step::Event(None) => {
                    warn!("Change source for {} closed", root.display());
                    failure = "change stream closed".to_string();
                    stream = None;
                }
                Step::Due => {
                    let now = Instant::now();
                    let mut due: Vec<ChangeNotification> = Vec::new();
                    pending.retain(|_, p| {
                        if p.deadline <= now {
                            let mut notification = p.notification.clone();
                            notification.kind = p.kind;
                            due.push(notification);
                            false
                        } else {
                            true
                        }
                    });
                    due.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                    self.process(due, &cancel).await;
                }
            }
        }

        debug!("Coordinator for {} stopped", root.display());
    }

    /// Debounces per path: each notification resets the path's timer.
    fn record(&self, pending: &mut HashMap<PathBuf, Pending>, notification: ChangeNotification) {
        let deadline = Instant::now() + self.config.debounce;
        match pending.get_mut(&notification.path) {
            Some(entry) => {
                entry.kind = coalesce(entry.kind, notification.kind);
                entry.deadline = deadline;
                entry.notification.timestamp = notification.timestamp;
            }
            None => {
                pending.insert(
                    notification.path.clone(),
                    Pending {
                        kind: notification.kind,
                        deadline,
                        notification,
                    },
                );
            }
        }
    }

    /// `None` for notifications the engine does not care about. Paths a
    /// full walk would skip are dropped here as well.
    fn classify(&self, notification: &ChangeNotification) -> Option<Affected> {
        let root = &self.project.root;
        let path = &notification.path;
        if !path.starts_with(root) {
            return None;
        }
        if path == &root.join(CONFIG_FILE_JSON) || path == &root.join(CONFIG_FILE_TOML) {
            return Some(Affected::Config);
        }
        let skipped = is_in_skipped_dir(root, path, &self.config.state_dir);
        if IgnoreRules::is_ignore_file(path) && (!skipped || path == &root.join(GIT_EXCLUDE)) {
            return Some(Affected::Config);
        }
        if skipped {
            return None;
        }

        let analysis = self.project.analysis();
        if let Some(analysis) = analysis.as_ref() {
            let is_dir = notification.kind != ChangeKind::Deleted && path.is_dir();
            if analysis.ignore.is_ignored(path, is_dir) {
                return None;
            }
        }
        if is_descriptor(path) {
            return Some(Affected::Descriptor);
        }
        if is_source_file(path) {
            let included = analysis
                .as_ref()
                .map(|a| a.filter.matches(path))
                .unwrap_or(true);
            return included.then_some(Affected::SourceFile);
        }
        if notification.kind == ChangeKind::Deleted {
            let held_files = analysis
                .as_ref()
                .map(|a| {
                    a.scan
                        .roots
                        .iter()
                        .flat_map(|r| r.files.iter())
                        .any(|f| f.starts_with(path))
                })
                .unwrap_or(false);
            if held_files {
                return Some(Affected::Directory);
            }
        }
        analysis
            .as_ref()
            .and_then(|a| marker_root(a, path))
            .map(Affected::Marker)
    }

    async fn process(&self, batch: Vec<ChangeNotification>, cancel: &CancellationToken) {
        let classified: Vec<(ChangeNotification, Affected)> = batch
            .into_iter()
            .filter_map(|n| self.classify(&n).map(|a| (n, a)))
            .collect();
        if classified.is_empty() {
            return;
        }

        let (analysis, generation) = self.project.snapshot();
        let Some(analysis) = analysis else {
            self.full_rescan(classified, cancel).await;
            return;
        };

        let needs_full = !analysis.config.parser.incremental_enabled
            || classified.iter().any(|(n, affected)| match affected {
                Affected::Config => true,
                // A new or vanished descriptor reshapes the root layout
                Affected::Descriptor => {
                    n.kind != ChangeKind::Modified || !analysis.scan.is_known_descriptor(&n.path)
                }
                _ => false,
            });
        if needs_full {
            self.full_rescan(classified, cancel).await;
            return;
        }

        debug!(
            "Reparsing {} change(s) under {}",
            classified.len(),
            self.project.root.display()
        );
        let analyzer = self.analyzer.clone();
        let token = cancel.clone();
        let work: Vec<(PathBuf, ChangeKind, Affected)> = classified
            .iter()
            .map(|(n, a)| (n.path.clone(), n.kind, a.clone()))
            .collect();
        let base = (*analysis).clone();
        let result = tokio::task::spawn_blocking(move || reparse(&analyzer, base, &work, &token))
            .await
            .unwrap_or_else(|e| Err(DiscoveryError::Engine(format!("Reparse task failed: {}", e))));

        match result {
            Ok(reparse) => {
                if !self.commit(reparse, &classified, Some(generation), cancel).await {
                    debug!(
                        "Analysis of {} was replaced during a reparse; rescanning",
                        self.project.root.display()
                    );
                    self.full_rescan(classified, cancel).await;
                }
            }
            Err(e) => warn!("Reparse of {} failed: {}", self.project.root.display(), e),
        }
    }

    async fn full_rescan(
        &self,
        notifications: Vec<(ChangeNotification, Affected)>,
        cancel: &CancellationToken,
    ) {
        info!("Rescanning {}", self.project.root.display());
        let analyzer = self.analyzer.clone();
        let root = self.project.root.clone();
        let token = cancel.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<Reparse> {
            let analysis = analyzer.analyze_project(&root)?;
            let report = analyzer.extract_all(&analysis, &token)?;
            Ok(Reparse {
                analysis,
                report,
                scope: MergeScope::All,
            })
        })
        .await
        .unwrap_or_else(|e| Err(DiscoveryError::Engine(format!("Rescan task failed: {}", e))));

        match result {
            Ok(reparse) => {
                self.commit(reparse, &notifications, None, cancel).await;
            }
            Err(e) => warn!("Rescan of {} failed: {}", self.project.root.display(), e),
        }
    }

    /// Installs the reparse and merges its endpoints. `base` is the
    /// generation an incremental reparse started from, `None` for a full
    /// rescan. Returns false when `base` went stale and nothing was merged.
    async fn commit(
        &self,
        reparse: Reparse,
        notifications: &[(ChangeNotification, Affected)],
        base: Option<u64>,
        cancel: &CancellationToken,
    ) -> bool {
        if reparse.report.cancelled || cancel.is_cancelled() {
            debug!("Discarding cancelled reparse of {}", self.project.root.display());
            return true;
        }
        let analysis = Arc::new(reparse.analysis);
        match base {
            Some(generation) => {
                if !self.project.replace_analysis(generation, analysis) {
                    return false;
                }
            }
            None => self.project.set_analysis(analysis),
        }
        let full = base.is_none();

        let outcome = match self
            .project
            .queue
            .merge(reparse.scope, reparse.report.endpoints, false)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Merge for {} failed: {}", self.project.root.display(), e);
                return true;
            }
        };

        let root = &self.project.root;
        for (notification, affected) in notifications {
            let diff = match affected {
                Affected::SourceFile if !full => {
                    let key = relative_key(root, &notification.path);
                    restrict(&outcome.diff, |file| file == key)
                }
                Affected::Directory if !full => {
                    let prefix = format!("{}/", relative_key(root, &notification.path));
                    restrict(&outcome.diff, |file| file.starts_with(&prefix))
                }
                _ => outcome.diff.clone(),
            };
            let _ = self.events.send(EngineEvent::FileChanged {
                root: root.clone(),
                source: notification.path.clone(),
                kind: notification.kind,
                diff,
                timestamp: notification.timestamp,
            });
        }

        if outcome.committed {
            info!(
                "Endpoints of {} updated: {} total (+{} -{} ~{})",
                root.display(),
                outcome.manifest.endpoints.len(),
                outcome.diff.added.len(),
                outcome.diff.removed.len(),
                outcome.diff.modified.len()
            );
            let _ = self.events.send(EngineEvent::EndpointsUpdated {
                root: root.clone(),
                endpoints: outcome.manifest.endpoints.clone(),
            });
        }
        true
    }

    /// Reopens the change stream with backoff. `None` when cancelled or
    /// when every retry failed; in the latter case the session goes idle
    /// and a `WatchFailed` event is sent.
    async fn reconnect(&self, reason: &str, cancel: &CancellationToken) -> Option<ChangeStream> {
        let root = &self.project.root;
        let retry = &self.config.retry;
        self.session.set_state(SessionState::Error);

        let mut last_error = reason.to_string();
        let mut delay = retry.base_delay;
        for attempt in 1..=retry.max_retries {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            match self.source.open(root) {
                Ok(stream) => {
                    info!("Reconnected change source for {} (attempt {})", root.display(), attempt);
                    self.session.set_state(SessionState::Watching);
                    return Some(stream);
                }
                Err(e) => {
                    warn!(
                        "Watch retry {}/{} for {} failed: {}",
                        attempt,
                        retry.max_retries,
                        root.display(),
                        e
                    );
                    last_error = e.to_string();
                }
            }
            delay = retry.next_delay(delay);
        }

        warn!("Giving up on watching {}: {}", root.display(), last_error);
        self.session.set_state(SessionState::Idle);
        let _ = self.events.send(EngineEvent::WatchFailed {
            session_id: self.session.id.clone(),
            root: root.clone(),
            error: last_error,
        });
        None
    }
}

/// Reparses the files touched by `changes` on top of `analysis`.
///
/// Every scan root touched by a change is detected again, since code-pattern
/// signals and marker directories depend on its files as much as on its
/// descriptors. A root whose framework set changes is matched again in
/// full.
fn reparse(
    analyzer: &Analyzer,
    mut analysis: ProjectAnalysis,
    changes: &[(PathBuf, ChangeKind, Affected)],
    cancel: &CancellationToken,
) -> Result<Reparse> {
    let project_root = analysis.root().to_path_buf();
    let mut files: BTreeSet<PathBuf> = BTreeSet::new();
    let mut scope: BTreeSet<String> = BTreeSet::new();
    let mut touched: BTreeSet<PathBuf> = BTreeSet::new();

    for (path, kind, affected) in changes {
        match affected {
            Affected::Descriptor => {
                if let Some(root) = path.parent() {
                    touched.insert(root.to_path_buf());
                }
                continue;
            }
            Affected::Marker(root) => {
                touched.insert(root.clone());
                continue;
            }
            _ => {}
        }

        match kind {
            ChangeKind::Deleted => {
                for scan_root in analysis.scan.roots.iter_mut() {
                    let before = scan_root.files.len();
                    scan_root.files.retain(|f| {
                        let gone = f.starts_with(path);
                        if gone {
                            scope.insert(relative_key(&project_root, f));
                        }
                        !gone
                    });
                    if scan_root.files.len() != before {
                        touched.insert(scan_root.path.clone());
                    }
                }
            }
            ChangeKind::Created | ChangeKind::Modified => {
                if let Some(scan_root) = analysis.scan.root_for_mut(path) {
                    if let Err(pos) = scan_root.files.binary_search(path) {
                        scan_root.files.insert(pos, path.clone());
                    }
                    touched.insert(scan_root.path.clone());
                }
                files.insert(path.clone());
            }
        }
        scope.insert(relative_key(&project_root, path));
    }

    for root in &touched {
        if analyzer.redetect(&mut analysis, root) {
            let current = root_files(&analysis, root);
            scope.extend(current.iter().map(|f| relative_key(&project_root, f)));
            files.extend(current);
        }
    }

    let files: Vec<PathBuf> = files.into_iter().collect();
    let report = analyzer.extract_files(&analysis, &files, cancel)?;
    Ok(Reparse {
        analysis,
        report,
        scope: MergeScope::Files(scope),
    })
}

/// The scan root whose framework markers `path` is, or contains.
fn marker_root(analysis: &ProjectAnalysis, path: &Path) -> Option<PathBuf> {
    analysis.scan.roots.iter().find_map(|root| {
        let relative = path.strip_prefix(&root.path).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Framework::all()
            .iter()
            .flat_map(|f| f.structural_markers().iter())
            .any(|(marker, _)| Path::new(marker).starts_with(relative))
            .then(|| root.path.clone())
    })
}

/// Files owned by the scan root at exactly `root`.
fn root_files(analysis: &ProjectAnalysis, root: &Path) -> Vec<PathBuf> {
    analysis
        .scan
        .roots
        .iter()
        .find(|r| r.path == root)
        .map(|r| r.files.clone())
        .unwrap_or_default()
}

fn restrict(diff: &EndpointDiff, keep: impl Fn(&str) -> bool) -> EndpointDiff {
    let pick = |endpoints: &[Endpoint]| -> Vec<Endpoint> {
        endpoints.iter().filter(|e| keep(e.file())).cloned().collect()
    };
    EndpointDiff {
        added: pick(&diff.added),
        removed: pick(&diff.removed),
        modified: pick(&diff.modified),
    }
}

fn coalesce(previous: ChangeKind, next: ChangeKind) -> ChangeKind {
    match (previous, next) {
        (ChangeKind::Created, ChangeKind::Modified) => ChangeKind::Created,
        (ChangeKind::Deleted, ChangeKind::Created) => ChangeKind::Modified,
        (_, next) => next,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{HandlerRef, HttpMethod};
    use crate::frameworks::Framework;
    use chrono::Utc;

    fn endpoint(path: &str, file: &str) -> Endpoint {
        Endpoint {
            id: Endpoint::compute_id(HttpMethod::Get, path, file),
            method: HttpMethod::Get,
            path: path.to_string(),
            handler: HandlerRef {
                file: file.to_string(),
                line: 1,
                column: 1,
                handler: None,
            },
            documentation: None,
            framework: Framework::Express,
            confidence: 0.95,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_coalesce_kinds() {
        assert_eq!(coalesce(ChangeKind::Created, ChangeKind::Modified), ChangeKind::Created);
        assert_eq!(coalesce(ChangeKind::Modified, ChangeKind::Deleted), ChangeKind::Deleted);
        assert_eq!(coalesce(ChangeKind::Deleted, ChangeKind::Created), ChangeKind::Modified);
        assert_eq!(coalesce(ChangeKind::Modified, ChangeKind::Modified), ChangeKind::Modified);
    }

    #[test]
    fn test_restrict_diff_to_file() {
        let diff = EndpointDiff {
            added: vec![endpoint("/a", "a.js"), endpoint("/b", "b.js")],
            removed: vec![endpoint("/old", "routes/old.js")],
            modified: vec![],
        };
        let only_a = restrict(&diff, |f| f == "a.js");
        assert_eq!(only_a.added.len(), 1);
        assert!(only_a.removed.is_empty());

        let routes = restrict(&diff, |f| f.starts_with("routes/"));
        assert_eq!(routes.removed.len(), 1);
        assert!(routes.added.is_empty());
    }
}
