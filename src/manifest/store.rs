//! Manifest persistence with snapshot reads.
//!
//! Writers go through [`super::MergeQueueHandle`]; readers take the last
//! committed `Arc<Manifest>` without waiting on an in-flight merge.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{DiscoveryError, Result};
use crate::extractor::{dedup, sort_endpoints, Endpoint};

use super::{EndpointDiff, Manifest, MergeScope};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub diff: EndpointDiff,
    pub manifest: Arc<Manifest>,
    /// False when nothing changed and the persisted file was left alone
    pub committed: bool,
}

#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    snapshot: RwLock<Option<Arc<Manifest>>>,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last committed manifest, loading the persisted one on first access.
    /// `Ok(None)` when no manifest exists yet.
    pub fn read(&self) -> Result<Option<Arc<Manifest>>> {
        if let Some(current) = self.current() {
            return Ok(Some(current));
        }
        let Some(loaded) = self.load()? else {
            return Ok(None);
        };
        let loaded = Arc::new(loaded);
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        // A merge may have committed while the file was being read
        Ok(Some(slot.get_or_insert(loaded).clone()))
    }

    /// In-memory snapshot only.
    pub fn current(&self) -> Option<Arc<Manifest>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reads the persisted manifest. A missing file is `Ok(None)`; an
    /// unreadable or corrupt one is a `ManifestIo` error.
    pub fn load(&self) -> Result<Option<Manifest>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DiscoveryError::manifest_io(&self.path, e)),
        };
        let manifest: Manifest = serde_json::from_str(&raw)
            .map_err(|e| DiscoveryError::manifest_io(&self.path, format!("corrupt manifest: {}", e)))?;
        Ok(Some(manifest))
    }

    /// Replaces every endpoint attributed to `scope` with `incoming`.
    ///
    /// Endpoints whose content is unchanged keep their previous `last_seen`.
    /// Without `force`, an empty diff commits nothing. The snapshot only moves
    /// after the new document is on disk.
    pub fn apply_merge(
        &self,
        scope: &MergeScope,
        incoming: Vec<Endpoint>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let base = match self.read() {
            Ok(base) => base,
            Err(e) => {
                warn!("Replacing unreadable manifest: {}", e);
                None
            }
        };
        let empty: &[Endpoint] = &[];
        let base_endpoints = base.as_ref().map(|m| m.endpoints.as_slice()).unwrap_or(empty);

        let previous: Vec<&Endpoint> = base_endpoints
            .iter()
            .filter(|e| scope.contains(e.file()))
            .collect();

        let mut incoming = dedup(incoming);
        for endpoint in &mut incoming {
            if let Some(old) = previous.iter().find(|old| old.id == endpoint.id) {
                if old.same_content(endpoint) {
                    endpoint.last_seen = old.last_seen;
                }
            }
        }
        let diff = EndpointDiff::compute(previous.iter().copied(), incoming.iter());

        if let Some(base) = &base {
            if diff.is_empty() && !force {
                debug!("Merge into {} changed nothing", self.path.display());
                return Ok(MergeOutcome {
                    diff,
                    manifest: base.clone(),
                    committed: false,
                });
            }
        }

        let mut endpoints: Vec<Endpoint> = base_endpoints
            .iter()
            .filter(|e| !scope.contains(e.file()))
            .cloned()
            .chain(incoming)
            .collect();
        endpoints = dedup(endpoints);
        sort_endpoints(&mut endpoints);

        let manifest = Arc::new(Manifest::new(endpoints, now));
        self.persist(&manifest)?;
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(manifest.clone());

        debug!(
            "Committed manifest {} (+{} -{} ~{})",
            self.path.display(),
            diff.added.len(),
            diff.removed.len(),
            diff.modified.len()
        );
        Ok(MergeOutcome {
            diff,
            manifest,
            committed: true,
        })
    }

    /// Write-to-temporary then rename.
    fn persist(&self, manifest: &Manifest) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| DiscoveryError::manifest_io(&self.path, "manifest path has no parent"))?;
        fs::create_dir_all(dir).map_err(|e| DiscoveryError::manifest_io(dir, e))?;

        let json = serde_json::to_vec_pretty(manifest)?;
        let tmp = dir.join(format!(".manifest-{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, &json) {
            let _ = fs::remove_file(&tmp);
            return Err(DiscoveryError::manifest_io(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(DiscoveryError::manifest_io(&self.path, e));
        }
        Ok(())
    }
}
