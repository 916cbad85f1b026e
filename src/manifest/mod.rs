//! Persisted endpoint manifest: document model, diffs, store and merge queue.

pub mod diff;
pub mod merge_queue;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extractor::Endpoint;

pub use diff::EndpointDiff;
pub use merge_queue::MergeQueueHandle;
pub use store::{ManifestStore, MergeOutcome};

pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    /// Only methods with at least one endpoint appear
    pub by_method: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn from_endpoints(endpoints: &[Endpoint]) -> Self {
        let mut by_method = BTreeMap::new();
        for endpoint in endpoints {
            *by_method
                .entry(endpoint.method.as_str().to_string())
                .or_insert(0) += 1;
        }
        Self {
            total: endpoints.len(),
            by_method,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub last_updated: DateTime<Utc>,
    pub endpoints: Vec<Endpoint>,
    pub statistics: Statistics,
}

impl Manifest {
    /// Builds a manifest whose statistics match `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>, last_updated: DateTime<Utc>) -> Self {
        let statistics = Statistics::from_endpoints(&endpoints);
        Self {
            version: MANIFEST_VERSION.to_string(),
            last_updated,
            endpoints,
            statistics,
        }
    }

    pub fn endpoints_in(&self, scope: &MergeScope) -> Vec<&Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| scope.contains(e.file()))
            .collect()
    }

    pub fn find(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// What a merge replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeScope {
    All,
    /// Handler files, as stored in [`crate::extractor::HandlerRef::file`]
    Files(BTreeSet<String>),
}

impl MergeScope {
    pub fn file(file: impl Into<String>) -> Self {
        MergeScope::Files(BTreeSet::from([file.into()]))
    }

    pub fn contains(&self, file: &str) -> bool {
        match self {
            MergeScope::All => true,
            MergeScope::Files(files) => files.contains(file),
        }
    }
}
