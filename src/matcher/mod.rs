//! Route pattern matching over tokenized source files.

pub mod convention;
pub mod lexer;
pub mod prefix;
pub mod template;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EngineConfig;
use crate::frameworks::{Framework, FrameworkDetection, Language, PatternKind, RoutePattern};

use lexer::{Lexed, Lexer};
use prefix::{join_paths, Prefixes};
use template::{match_at, Capture};

/// Start positions tried between budget and cancellation checks
const CHECK_INTERVAL: usize = 512;

/// A route as found in source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMatch {
    pub pattern: &'static str,
    pub framework: Framework,
    /// As written, e.g. `get`, `GET`, `any`
    pub method: String,
    /// As written, with same-file prefixes joined
    pub path: String,
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub handler: Option<String>,
    pub documentation: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseErrorKind {
    Unreadable { reason: String },
    TooLarge { bytes: u64, limit: u64 },
    TimedOut { budget_ms: u64 },
}

/// A single file that could not be matched. Never fatal to the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub file: PathBuf,
    #[serde(flatten)]
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::Unreadable { reason } => {
                write!(f, "{}: unreadable ({})", self.file.display(), reason)
            }
            ParseErrorKind::TooLarge { bytes, limit } => write!(
                f,
                "{}: {} bytes exceeds the {} byte limit",
                self.file.display(),
                bytes,
                limit
            ),
            ParseErrorKind::TimedOut { budget_ms } => {
                write!(f, "{}: exceeded {}ms budget", self.file.display(), budget_ms)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFailure {
    Parse(ParseError),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RouteMatcher {
    file_budget: Duration,
    max_file_bytes: u64,
}

impl RouteMatcher {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            file_budget: config.file_budget,
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// Matches one file of `scan_root` against every pattern of the given
    /// detections. Files no pattern applies to are not read.
    pub fn match_file(
        &self,
        scan_root: &Path,
        file: &Path,
        detections: &[FrameworkDetection],
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>, MatchFailure> {
        let relative = file.strip_prefix(scan_root).unwrap_or(file);
        let applicable = applicable_patterns(relative, detections);
        if applicable.is_empty() {
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(MatchFailure::Cancelled);
        }

        let parse_error = |kind| {
            MatchFailure::Parse(ParseError {
                file: file.to_path_buf(),
                kind,
            })
        };
        let bytes = fs::metadata(file)
            .map_err(|e| parse_error(ParseErrorKind::Unreadable { reason: e.to_string() }))?
            .len();
        if bytes > self.max_file_bytes {
            return Err(parse_error(ParseErrorKind::TooLarge {
                bytes,
                limit: self.max_file_bytes,
            }));
        }
        let raw = fs::read(file)
            .map_err(|e| parse_error(ParseErrorKind::Unreadable { reason: e.to_string() }))?;
        let content = String::from_utf8_lossy(&raw);

        self.match_content(relative, file, &content, &applicable, cancel)
    }

    /// Matches already-loaded content. `relative` is the file's path below
    /// its scan root.
    pub fn match_source(
        &self,
        relative: &Path,
        file: &Path,
        content: &str,
        detections: &[FrameworkDetection],
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>, MatchFailure> {
        let applicable = applicable_patterns(relative, detections);
        self.match_content(relative, file, content, &applicable, cancel)
    }

    fn match_content(
        &self,
        relative: &Path,
        file: &Path,
        content: &str,
        applicable: &[(Framework, &'static RoutePattern)],
        cancel: &CancellationToken,
    ) -> Result<Vec<RawMatch>, MatchFailure> {
        let Some(language) = relative
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::for_extension)
        else {
            return Ok(Vec::new());
        };

        let deadline = Instant::now() + self.file_budget;
        let check = || -> Result<(), MatchFailure> {
            if cancel.is_cancelled() {
                return Err(MatchFailure::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(MatchFailure::Parse(ParseError {
                    file: file.to_path_buf(),
                    kind: ParseErrorKind::TimedOut {
                        budget_ms: self.file_budget.as_millis() as u64,
                    },
                }));
            }
            Ok(())
        };

        let lexed = Lexer::tokenize(content, language);
        let mut prefixes: Vec<(Framework, Prefixes)> = Vec::new();
        let mut matches = Vec::new();

        for (framework, pattern) in applicable {
            check()?;
            let emit = Emitter {
                framework: *framework,
                pattern: *pattern,
                file,
                lexed: &lexed,
            };
            match pattern.kind {
                PatternKind::Template(template) | PatternKind::Resource(template) => {
                    if !prefixes.iter().any(|(f, _)| f == framework) {
                        let rules = framework.pattern_set().prefixes;
                        prefixes.push((*framework, Prefixes::collect(rules, &lexed.tokens)));
                    }
                    let file_prefixes = prefixes
                        .iter()
                        .find(|(f, _)| f == framework)
                        .map(|(_, p)| p);

                    for start in 0..lexed.tokens.len() {
                        if start % CHECK_INTERVAL == 0 {
                            check()?;
                        }
                        let Some(capture) = match_at(template, &lexed.tokens, start) else {
                            continue;
                        };
                        let Some(raw_path) = capture.path.as_deref() else {
                            continue;
                        };
                        let path = match file_prefixes {
                            Some(p) => p.apply(capture.receiver.as_deref(), capture.start, raw_path),
                            None => raw_path.to_string(),
                        };
                        if matches!(pattern.kind, PatternKind::Resource(_)) {
                            emit.resource(&capture, &path, &mut matches);
                        } else {
                            emit.template(&capture, &path, &mut matches);
                        }
                    }
                }
                PatternKind::Convention(kind) => {
                    let Some(path) = convention::route_path(kind, relative) else {
                        continue;
                    };
                    for route in convention::routes(kind, &lexed) {
                        matches.push(RawMatch {
                            pattern: pattern.name,
                            framework: *framework,
                            method: route.method,
                            path: path.clone(),
                            file: file.to_path_buf(),
                            line: route.line,
                            column: route.column,
                            handler: route.handler,
                            documentation: lexed.documentation_above(route.line),
                            confidence: pattern.base_confidence,
                        });
                    }
                }
            }
        }

        debug!("{} route matches in {}", matches.len(), file.display());
        Ok(matches)
    }
}

fn applicable_patterns(
    relative: &Path,
    detections: &[FrameworkDetection],
) -> Vec<(Framework, &'static RoutePattern)> {
    detections
        .iter()
        .flat_map(|d| {
            d.patterns()
                .patterns
                .iter()
                .filter(|p| p.applies_to(relative))
                .map(move |p| (d.framework, p))
        })
        .collect()
}

struct Emitter<'a> {
    framework: Framework,
    pattern: &'static RoutePattern,
    file: &'a Path,
    lexed: &'a Lexed,
}

impl Emitter<'_> {
    fn raw(&self, method: String, path: String, token: usize, handler: Option<String>) -> RawMatch {
        let (line, column) = self
            .lexed
            .tokens
            .get(token)
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        RawMatch {
            pattern: self.pattern.name,
            framework: self.framework,
            method,
            path,
            file: self.file.to_path_buf(),
            line,
            column,
            handler,
            documentation: self.documentation(token),
            confidence: self.pattern.base_confidence,
        }
    }

    /// Comments directly above the line holding `token`
    fn documentation(&self, token: usize) -> Option<String> {
        let line = self.lexed.tokens.get(token)?.line;
        self.lexed.documentation_above(line)
    }

    fn template(&self, capture: &Capture, path: &str, out: &mut Vec<RawMatch>) {
        for route in capture.routes() {
            out.push(self.raw(route.method, path.to_string(), route.token, route.handler));
        }
        // Chain entries document from the declaration start
        if !capture.chain.is_empty() {
            let doc = self.documentation(capture.start);
            let added = capture.chain.len();
            let len = out.len();
            for raw in &mut out[len - added..] {
                if raw.documentation.is_none() {
                    raw.documentation = doc.clone();
                }
            }
        }
    }

    fn resource(&self, capture: &Capture, path: &str, out: &mut Vec<RawMatch>) {
        let api_only = capture.method.as_deref() == Some("apiResource");
        let controller = capture.handler.as_deref().map(controller_name);
        let (base, param) = resource_base(path);

        for (action, method, suffix, web_only) in RESOURCE_ACTIONS {
            if api_only && *web_only {
                continue;
            }
            let route_path = suffix.replace("{param}", &format!("{{{}}}", param));
            let handler = controller.as_ref().map(|c| format!("{}@{}", c, action));
            out.push(self.raw(
                method.to_string(),
                join_paths(&base, &route_path),
                capture.start,
                handler,
            ));
        }
    }
}

/// (action, method, path suffix, web-only)
const RESOURCE_ACTIONS: &[(&str, &str, &str, bool)] = &[
    ("index", "GET", "", false),
    ("create", "GET", "create", true),
    ("store", "POST", "", false),
    ("show", "GET", "{param}", false),
    ("edit", "GET", "{param}/edit", true),
    ("update", "PUT", "{param}", false),
    ("update", "PATCH", "{param}", false),
    ("destroy", "DELETE", "{param}", false),
];

/// `App\Http\Controllers\PhotoController::class` → `PhotoController`
fn controller_name(handler: &str) -> String {
    let name = handler.strip_suffix("::class").unwrap_or(handler);
    name.rsplit('\\').next().unwrap_or(name).to_string()
}

/// Base path and member parameter for a resource name. Nested resources
/// (`photos.comments`) place the parent's parameter between segments.
fn resource_base(name: &str) -> (String, String) {
    let (prefix, resource) = match name.rfind('/') {
        Some(at) => (&name[..=at], &name[at + 1..]),
        None => ("", name),
    };
    let parts: Vec<&str> = resource.split('.').filter(|p| !p.is_empty()).collect();
    let mut base = prefix.to_string();
    for (i, part) in parts.iter().enumerate() {
        base = join_paths(&base, part);
        if i + 1 < parts.len() {
            base = join_paths(&base, &format!("{{{}}}", singular(part)));
        }
    }
    let param = parts.last().map(|p| singular(p)).unwrap_or_default();
    (base, param)
}

fn singular(word: &str) -> String {
    let word = word.replace('-', "_");
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if word.ends_with("ss") {
        word
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word
    }
}
