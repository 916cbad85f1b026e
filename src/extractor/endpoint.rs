use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::frameworks::Framework;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn all() -> &'static [HttpMethod] {
        &[
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
            HttpMethod::Head,
            HttpMethod::Options,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            "HEAD" => Some(HttpMethod::Head),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Unrecognized methods (`all`, `any`, `route`) fall back to `GET`.
    pub fn parse_lenient(s: &str) -> Self {
        Self::parse(s).unwrap_or(HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a route is declared. `file` is relative to the project root with
/// `/` separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRef {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(flatten)]
    pub handler: HandlerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub framework: Framework,
    pub confidence: f64,
    pub last_seen: DateTime<Utc>,
}

impl Endpoint {
    /// Stable id over (method, path, handler file).
    pub fn compute_id(method: HttpMethod, path: &str, file: &str) -> String {
        let key = format!("{}\0{}\0{}", method.as_str(), path, file);
        format!("{:016x}", xxh3_64(key.as_bytes()))
    }

    pub fn file(&self) -> &str {
        &self.handler.file
    }

    /// Equal in everything except `last_seen`.
    pub fn same_content(&self, other: &Endpoint) -> bool {
        self.id == other.id
            && self.method == other.method
            && self.path == other.path
            && self.handler == other.handler
            && self.documentation == other.documentation
            && self.framework == other.framework
            && self.confidence == other.confidence
    }

    /// Parameter names in the path template, in order. Understands `:id`,
    /// `:slug*`, `{id}`, `{id:int}`, `{id?}`, `<int:id>` and `[id]`.
    pub fn parameters(&self) -> Vec<String> {
        path_parameters(&self.path)
    }
}

pub fn path_parameters(path: &str) -> Vec<String> {
    let mut params = Vec::new();
    for segment in path.split('/') {
        let name = if let Some(rest) = segment.strip_prefix(':') {
            Some(rest.trim_end_matches(['*', '?', '+']))
        } else if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner.split(':').next().unwrap_or(inner).trim_end_matches('?'))
        } else if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            Some(inner.rsplit(':').next().unwrap_or(inner))
        } else if let Some(inner) = segment.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner.trim_start_matches('[').trim_end_matches(']').trim_start_matches("..."))
        } else {
            None
        };
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            params.push(name.to_string());
        }
    }
    params
}
