//! Supported web frameworks and their detection.
//!
//! The framework set is closed: every variant of [`Framework`] carries its
//! dependency markers, structural markers and route pattern set.

pub mod detector;
pub mod patterns;
pub mod probes;
pub mod scoring;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dependencies::Ecosystem;

pub use detector::{DetectionOutcome, FrameworkDetector};
pub use patterns::{PatternKind, PatternSet, RoutePattern};
pub use scoring::{aggregate_confidence, ScoringTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Express,
    #[serde(rename = "nextjs")]
    NextJs,
    #[serde(rename = "fastapi")]
    FastApi,
    Flask,
    Laravel,
    Gin,
    Axum,
    Actix,
}

/// Source language a framework is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    JavaScript,
    Python,
    Php,
    Go,
    Rust,
}

impl Language {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::JavaScript => &["js", "mjs", "cjs", "jsx", "ts", "tsx"],
            Language::Python => &["py"],
            Language::Php => &["php"],
            Language::Go => &["go"],
            Language::Rust => &["rs"],
        }
    }

    pub fn for_extension(ext: &str) -> Option<Self> {
        [
            Language::JavaScript,
            Language::Python,
            Language::Php,
            Language::Go,
            Language::Rust,
        ]
        .into_iter()
        .find(|lang| lang.extensions().contains(&ext))
    }
}

impl Framework {
    pub fn all() -> &'static [Framework] {
        &[
            Framework::Express,
            Framework::NextJs,
            Framework::FastApi,
            Framework::Flask,
            Framework::Laravel,
            Framework::Gin,
            Framework::Axum,
            Framework::Actix,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Express => "express",
            Framework::NextJs => "nextjs",
            Framework::FastApi => "fastapi",
            Framework::Flask => "flask",
            Framework::Laravel => "laravel",
            Framework::Gin => "gin",
            Framework::Axum => "axum",
            Framework::Actix => "actix",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Framework::Express => "Express",
            Framework::NextJs => "Next.js",
            Framework::FastApi => "FastAPI",
            Framework::Flask => "Flask",
            Framework::Laravel => "Laravel",
            Framework::Gin => "Gin",
            Framework::Axum => "Axum",
            Framework::Actix => "Actix Web",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "express" | "expressjs" => Some(Framework::Express),
            "nextjs" | "next" | "next.js" => Some(Framework::NextJs),
            "fastapi" => Some(Framework::FastApi),
            "flask" => Some(Framework::Flask),
            "laravel" => Some(Framework::Laravel),
            "gin" => Some(Framework::Gin),
            "axum" => Some(Framework::Axum),
            "actix" | "actix-web" | "actix_web" => Some(Framework::Actix),
            _ => None,
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Framework::Express | Framework::NextJs => Language::JavaScript,
            Framework::FastApi | Framework::Flask => Language::Python,
            Framework::Laravel => Language::Php,
            Framework::Gin => Language::Go,
            Framework::Axum | Framework::Actix => Language::Rust,
        }
    }

    /// Dependency names that signal this framework
    pub fn dependency_markers(&self) -> &'static [(Ecosystem, &'static str)] {
        match self {
            Framework::Express => &[(Ecosystem::Npm, "express")],
            Framework::NextJs => &[(Ecosystem::Npm, "next")],
            Framework::FastApi => &[(Ecosystem::Python, "fastapi")],
            Framework::Flask => &[(Ecosystem::Python, "flask")],
            Framework::Laravel => &[(Ecosystem::Composer, "laravel/framework")],
            Framework::Gin => &[(Ecosystem::Go, "github.com/gin-gonic/gin")],
            Framework::Axum => &[(Ecosystem::Cargo, "axum")],
            Framework::Actix => &[(Ecosystem::Cargo, "actix-web")],
        }
    }

    /// Paths relative to a scan root whose presence signals this framework
    pub fn structural_markers(&self) -> &'static [(&'static str, SignalKind)] {
        match self {
            Framework::NextJs => &[
                ("next.config.js", SignalKind::ConfigFile),
                ("next.config.mjs", SignalKind::ConfigFile),
                ("next.config.ts", SignalKind::ConfigFile),
                ("pages/api", SignalKind::Directory),
                ("src/pages/api", SignalKind::Directory),
                ("app/api", SignalKind::Directory),
                ("src/app/api", SignalKind::Directory),
            ],
            Framework::Laravel => &[
                ("artisan", SignalKind::ConfigFile),
                ("app/Http/Controllers", SignalKind::Directory),
                ("routes", SignalKind::Directory),
            ],
            _ => &[],
        }
    }

    /// Route patterns and prefix rules for this framework.
    pub fn pattern_set(&self) -> &'static PatternSet {
        patterns::pattern_set(*self)
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Dependency,
    ConfigFile,
    Directory,
    CodePattern,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Dependency => "dependency",
            SignalKind::ConfigFile => "config_file",
            SignalKind::Directory => "directory",
            SignalKind::CodePattern => "code_pattern",
        }
    }
}

/// One piece of evidence for a framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    /// What was observed, e.g. the dependency name or the matched idiom
    pub value: String,
    pub confidence: f64,
    pub source: PathBuf,
}

impl Signal {
    pub fn new(
        kind: SignalKind,
        value: impl Into<String>,
        confidence: f64,
        source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameworkDetection {
    pub root: PathBuf,
    pub framework: Framework,
    pub confidence: f64,
    pub signals: Vec<Signal>,
}

impl FrameworkDetection {
    pub fn patterns(&self) -> &'static PatternSet {
        self.framework.pattern_set()
    }
}
