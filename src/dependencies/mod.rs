//! Dependency descriptor parsing.
//!
//! Framework detection relies on the dependencies a project declares. This
//! module reads the descriptor files of each supported ecosystem:
//! - `package.json` (npm/yarn/pnpm)
//! - `requirements.txt` and `pyproject.toml` (Python)
//! - `composer.json` (PHP)
//! - `go.mod` (Go)
//! - `Cargo.toml` (Rust)

pub mod cargo;
pub mod composer;
pub mod gomod;
pub mod npm;
pub mod parser;
pub mod python;

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Supported package ecosystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ecosystem {
    Npm,
    Python,
    Composer,
    Go,
    Cargo,
}

impl Ecosystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Python => "python",
            Ecosystem::Composer => "composer",
            Ecosystem::Go => "go",
            Ecosystem::Cargo => "cargo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "npm" | "node" | "nodejs" => Some(Ecosystem::Npm),
            "python" | "pip" | "py" => Some(Ecosystem::Python),
            "composer" | "php" => Some(Ecosystem::Composer),
            "go" | "golang" => Some(Ecosystem::Go),
            "cargo" | "rust" => Some(Ecosystem::Cargo),
            _ => None,
        }
    }

    /// Returns the descriptor file names for this ecosystem
    pub fn manifest_names(&self) -> &'static [&'static str] {
        match self {
            Ecosystem::Npm => &["package.json"],
            Ecosystem::Python => &["requirements.txt", "pyproject.toml"],
            Ecosystem::Composer => &["composer.json"],
            Ecosystem::Go => &["go.mod"],
            Ecosystem::Cargo => &["Cargo.toml"],
        }
    }

    pub fn all() -> &'static [Ecosystem] {
        &[
            Ecosystem::Npm,
            Ecosystem::Python,
            Ecosystem::Composer,
            Ecosystem::Go,
            Ecosystem::Cargo,
        ]
    }
}

/// Returns true if the file name is a dependency descriptor of any ecosystem.
pub fn is_descriptor(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| {
            Ecosystem::all()
                .iter()
                .any(|e| e.manifest_names().contains(&name))
        })
        .unwrap_or(false)
}

/// A declared dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Name of the dependency (e.g., "express", "laravel/framework")
    pub name: String,
    /// Version requirement as written in the descriptor
    pub version: String,
    pub ecosystem: Ecosystem,
    /// Whether this is a development dependency
    pub is_dev: bool,
}

impl Dependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            is_dev: false,
        }
    }

    pub fn with_dev(mut self, is_dev: bool) -> Self {
        self.is_dev = is_dev;
        self
    }
}

/// Contents of one parsed descriptor file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorInfo {
    /// Package name, when the descriptor declares one
    pub name: Option<String>,
    pub ecosystem: Ecosystem,
    /// Path to the descriptor file
    pub manifest_path: String,
    pub dependencies: Vec<Dependency>,
    /// The descriptor declares a multi-package workspace
    pub declares_workspace: bool,
}

impl DescriptorInfo {
    pub fn new(ecosystem: Ecosystem, manifest_path: impl Into<String>) -> Self {
        Self {
            name: None,
            ecosystem,
            manifest_path: manifest_path.into(),
            dependencies: Vec::new(),
            declares_workspace: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<Dependency>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_workspace(mut self, declares_workspace: bool) -> Self {
        self.declares_workspace = declares_workspace;
        self
    }

    /// Looks up a dependency by name. Python names compare case-insensitively
    /// with `-`/`_` folded, as pip does.
    pub fn find(&self, name: &str) -> Option<&Dependency> {
        match self.ecosystem {
            Ecosystem::Python => {
                let wanted = normalize_python_name(name);
                self.dependencies
                    .iter()
                    .find(|d| normalize_python_name(&d.name) == wanted)
            }
            _ => self.dependencies.iter().find(|d| d.name == name),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

fn normalize_python_name(name: &str) -> String {
    name.to_lowercase().replace(['_', '.'], "-")
}

pub use cargo::CargoParser;
pub use composer::ComposerParser;
pub use gomod::GoModParser;
pub use npm::NpmParser;
pub use parser::{DescriptorParser, DescriptorRegistry};
pub use python::PythonParser;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_as_str() {
        assert_eq!(Ecosystem::Npm.as_str(), "npm");
        assert_eq!(Ecosystem::Python.as_str(), "python");
        assert_eq!(Ecosystem::Composer.as_str(), "composer");
        assert_eq!(Ecosystem::Go.as_str(), "go");
        assert_eq!(Ecosystem::Cargo.as_str(), "cargo");
    }

    #[test]
    fn test_ecosystem_from_str() {
        assert_eq!(Ecosystem::from_str("node"), Some(Ecosystem::Npm));
        assert_eq!(Ecosystem::from_str("PIP"), Some(Ecosystem::Python));
        assert_eq!(Ecosystem::from_str("php"), Some(Ecosystem::Composer));
        assert_eq!(Ecosystem::from_str("golang"), Some(Ecosystem::Go));
        assert_eq!(Ecosystem::from_str("rust"), Some(Ecosystem::Cargo));
        assert_eq!(Ecosystem::from_str("maven"), None);
    }

    #[test]
    fn test_is_descriptor() {
        assert!(is_descriptor(Path::new("/a/package.json")));
        assert!(is_descriptor(Path::new("svc/requirements.txt")));
        assert!(is_descriptor(Path::new("go.mod")));
        assert!(!is_descriptor(Path::new("src/app.js")));
        assert!(!is_descriptor(Path::new("package-lock.json")));
    }

    #[test]
    fn test_python_lookup_is_normalized() {
        let info = DescriptorInfo::new(Ecosystem::Python, "requirements.txt").with_dependencies(
            vec![Dependency::new("Flask_Cors", "", Ecosystem::Python)],
        );
        assert!(info.has("flask-cors"));
        assert!(!info.has("flask"));
    }

    #[test]
    fn test_npm_lookup_is_exact() {
        let info = DescriptorInfo::new(Ecosystem::Npm, "package.json")
            .with_dependencies(vec![Dependency::new("express", "^4", Ecosystem::Npm)]);
        assert!(info.has("express"));
        assert!(!info.has("Express"));
    }
}
