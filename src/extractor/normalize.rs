//! Path normalization, deduplication and canonical ordering.

use std::collections::HashMap;

use super::endpoint::Endpoint;

/// Leading `/` ensured, repeated and trailing slashes removed. Parameter
/// syntax is left as written.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "*" {
        return "/*".to_string();
    }
    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Collapses repeats of (method, path, file), keeping the higher confidence
/// and then the earliest position. Same (method, path) from different files
/// are kept apart.
pub fn dedup(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut kept: Vec<Endpoint> = Vec::with_capacity(endpoints.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for endpoint in endpoints {
        match index.get(&endpoint.id) {
            Some(&at) => {
                if prefer(&endpoint, &kept[at]) {
                    kept[at] = endpoint;
                }
            }
            None => {
                index.insert(endpoint.id.clone(), kept.len());
                kept.push(endpoint);
            }
        }
    }
    kept
}

fn prefer(candidate: &Endpoint, current: &Endpoint) -> bool {
    if candidate.confidence != current.confidence {
        return candidate.confidence > current.confidence;
    }
    (candidate.handler.line, candidate.handler.column) < (current.handler.line, current.handler.column)
}

/// Method, then path, then file, then line and column.
pub fn sort_endpoints(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| {
        a.method
            .cmp(&b.method)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.handler.file.cmp(&b.handler.file))
            .then_with(|| a.handler.line.cmp(&b.handler.line))
            .then_with(|| a.handler.column.cmp(&b.handler.column))
    });
}
