use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::Endpoint;
use crate::manifest::EndpointDiff;
use crate::watch::ChangeKind;

/// Broadcast to every subscriber of a [`super::DiscoveryEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// Full endpoint list after a committed merge
    EndpointsUpdated {
        root: PathBuf,
        endpoints: Vec<Endpoint>,
    },
    FileChanged {
        root: PathBuf,
        source: PathBuf,
        kind: ChangeKind,
        diff: EndpointDiff,
        timestamp: DateTime<Utc>,
    },
    /// The change source could not be reopened; the session is idle
    WatchFailed {
        session_id: String,
        root: PathBuf,
        error: String,
    },
}

impl EngineEvent {
    pub fn root(&self) -> &PathBuf {
        match self {
            EngineEvent::EndpointsUpdated { root, .. }
            | EngineEvent::FileChanged { root, .. }
            | EngineEvent::WatchFailed { root, .. } => root,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::EndpointsUpdated { .. } => "endpoints-updated",
            EngineEvent::FileChanged { .. } => "file-changed",
            EngineEvent::WatchFailed { .. } => "watch-failed",
        }
    }
}
