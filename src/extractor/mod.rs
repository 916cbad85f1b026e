//! Raw route matches to canonical endpoints.

pub mod endpoint;
pub mod normalize;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::matcher::RawMatch;

pub use endpoint::{path_parameters, Endpoint, HandlerRef, HttpMethod};
pub use normalize::{dedup, normalize_path, sort_endpoints};

#[derive(Debug, Clone)]
pub struct EndpointExtractor {
    project_root: PathBuf,
}

impl EndpointExtractor {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Handler file key: relative to the project root, `/`-separated.
    pub fn relative_file(&self, file: &Path) -> String {
        relative_key(&self.project_root, file)
    }

    pub fn to_endpoint(&self, raw: RawMatch, now: DateTime<Utc>) -> Endpoint {
        let method = HttpMethod::parse_lenient(&raw.method);
        let path = normalize_path(&raw.path);
        let file = self.relative_file(&raw.file);
        Endpoint {
            id: Endpoint::compute_id(method, &path, &file),
            method,
            path,
            handler: HandlerRef {
                file,
                line: raw.line,
                column: raw.column,
                handler: raw.handler,
            },
            documentation: raw.documentation,
            framework: raw.framework,
            confidence: raw.confidence.clamp(0.0, 1.0),
            last_seen: now,
        }
    }

    /// Normalizes, deduplicates and orders a batch of matches.
    pub fn extract(&self, raw: Vec<RawMatch>, now: DateTime<Utc>) -> Vec<Endpoint> {
        let endpoints = raw.into_iter().map(|m| self.to_endpoint(m, now)).collect();
        let mut endpoints = dedup(endpoints);
        sort_endpoints(&mut endpoints);
        endpoints
    }
}

pub fn relative_key(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
