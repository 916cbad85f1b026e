//! Project scanning.
//!
//! A scan walks the project tree once and splits it into [`ScanRoot`]s: the
//! project root plus every directory holding a dependency descriptor. Each
//! candidate source file belongs to the nearest such directory above it.

pub mod ignore_rules;
pub mod walker;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::dependencies::{DescriptorInfo, DescriptorRegistry};
use crate::error::{DiscoveryError, Result};

pub use ignore_rules::IgnoreRules;
pub use walker::{check_root, FileWalker, WalkOutput};
pub use workspace::{WorkspaceDetector, WorkspaceType};

/// Extensions of files the route matchers understand
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "jsx", "ts", "tsx", "py", "php", "go", "rs",
];

/// Directories never descended into
pub const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "vendor",
    "dist",
    "build",
    ".next",
    "__pycache__",
    "venv",
    ".venv",
    ".git",
];

pub fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SOURCE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// True when any component of `path` below `root` is a skipped directory
/// or the engine's state directory.
pub fn is_in_skipped_dir(root: &Path, path: &Path, state_dir: &str) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut components: Vec<_> = relative.components().collect();
    components.pop();
    components.iter().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name == state_dir || SKIP_DIRS.contains(&name.as_ref())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Single,
    Monorepo,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Single => "single",
            ProjectKind::Monorepo => "monorepo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoot {
    pub path: PathBuf,
    pub kind: ProjectKind,
    /// Analysis roots below `path`
    pub sub_roots: Vec<PathBuf>,
}

/// One analysis unit: a directory, its descriptors and its source files.
#[derive(Debug, Clone)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub descriptor_files: Vec<PathBuf>,
    pub descriptors: Vec<DescriptorInfo>,
    pub files: Vec<PathBuf>,
}

impl ScanRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            descriptor_files: Vec::new(),
            descriptors: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Re-reads every descriptor file, returning warnings for the ones that
    /// could not be parsed.
    pub fn reload_descriptors(&mut self, registry: &DescriptorRegistry) -> Vec<ScanWarning> {
        let mut warnings = Vec::new();
        self.descriptor_files.retain(|p| p.is_file());
        self.descriptors = self
            .descriptor_files
            .iter()
            .filter_map(|path| match registry.parse(path)? {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!("Skipping descriptor {}: {}", path.display(), err);
                    warnings.push(ScanWarning::new(Some(path.clone()), err.to_string()));
                    None
                }
            })
            .collect();
        warnings
    }

    /// Path of `file` relative to this root.
    pub fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        file.strip_prefix(&self.path).unwrap_or(file)
    }
}

/// Non-fatal problem met during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl ScanWarning {
    pub fn new(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }

    pub(crate) fn from_walk_error(root: &Path, err: &ignore::Error) -> Self {
        fn error_path(err: &ignore::Error) -> Option<PathBuf> {
            match err {
                ignore::Error::WithPath { path, .. } => Some(path.clone()),
                ignore::Error::WithDepth { err, .. } => error_path(err),
                ignore::Error::WithLineNumber { err, .. } => error_path(err),
                ignore::Error::Loop { child, .. } => Some(child.clone()),
                _ => None,
            }
        }
        Self::new(
            error_path(err).or_else(|| Some(root.to_path_buf())),
            err.to_string(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub project: ProjectRoot,
    pub workspace: WorkspaceType,
    /// Sorted by path; the project root comes first
    pub roots: Vec<ScanRoot>,
    pub warnings: Vec<ScanWarning>,
}

impl ScanResult {
    /// The deepest scan root containing `path`.
    pub fn root_for(&self, path: &Path) -> Option<&ScanRoot> {
        self.roots
            .iter()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
    }

    pub fn root_for_mut(&mut self, path: &Path) -> Option<&mut ScanRoot> {
        self.roots
            .iter_mut()
            .filter(|r| path.starts_with(&r.path))
            .max_by_key(|r| r.path.components().count())
    }

    pub fn total_files(&self) -> usize {
        self.roots.iter().map(|r| r.files.len()).sum()
    }

    /// True when `path` is one of the descriptors that shaped this layout.
    pub fn is_known_descriptor(&self, path: &Path) -> bool {
        self.roots
            .iter()
            .any(|r| r.descriptor_files.iter().any(|d| d == path))
    }
}

/// Include/exclude globs evaluated against project-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PathFilter {
    pub fn new(root: &Path, watch: &WatchConfig) -> Result<Self> {
        let compile = |patterns: &[String]| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        DiscoveryError::Config(format!("invalid watch glob '{}': {}", p, e))
                    })
                })
                .collect()
        };
        Ok(Self {
            root: root.to_path_buf(),
            include: compile(&watch.include)?,
            exclude: compile(&watch.exclude)?,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let included = self.include.is_empty()
            || self.include.iter().any(|p| p.matches_path_with(relative, options));
        included
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_path_with(relative, options))
    }
}

pub struct Scanner {
    registry: DescriptorRegistry,
    state_dir: String,
}

impl Scanner {
    pub fn new(state_dir: impl Into<String>) -> Self {
        Self {
            registry: DescriptorRegistry::with_defaults(),
            state_dir: state_dir.into(),
        }
    }

    pub fn registry(&self) -> &DescriptorRegistry {
        &self.registry
    }

    pub fn scan(&self, root: &Path, watch: &WatchConfig) -> Result<ScanResult> {
        let filter = PathFilter::new(root, watch)?;
        let walker = FileWalker::new(filter, self.state_dir.clone());
        let output = walker.walk(root)?;
        let mut warnings = output.warnings;

        // Every descriptor directory becomes a scan root
        let mut roots: BTreeMap<PathBuf, ScanRoot> = BTreeMap::new();
        roots.insert(root.to_path_buf(), ScanRoot::new(root));
        for descriptor in &output.descriptors {
            let Some(dir) = descriptor.parent() else { continue };
            roots
                .entry(dir.to_path_buf())
                .or_insert_with(|| ScanRoot::new(dir))
                .descriptor_files
                .push(descriptor.clone());
        }
        for scan_root in roots.values_mut() {
            warnings.extend(scan_root.reload_descriptors(&self.registry));
        }

        let dirs: Vec<PathBuf> = roots.keys().cloned().collect();
        for file in output.sources {
            let owner = dirs
                .iter()
                .filter(|d| file.starts_with(d))
                .max_by_key(|d| d.components().count());
            if let Some(scan_root) = owner.and_then(|d| roots.get_mut(d)) {
                scan_root.files.push(file);
            }
        }

        let workspace = roots
            .get(root)
            .map(|r| WorkspaceDetector::detect(root, &r.descriptors))
            .unwrap_or(WorkspaceType::SingleProject);
        let nested = roots
            .values()
            .filter(|r| r.path != root && !r.descriptor_files.is_empty())
            .count();
        let kind = if workspace.is_workspace() || nested >= 2 {
            ProjectKind::Monorepo
        } else {
            ProjectKind::Single
        };

        let roots: Vec<ScanRoot> = roots.into_values().collect();
        let project = ProjectRoot {
            path: root.to_path_buf(),
            kind,
            sub_roots: roots
                .iter()
                .filter(|r| r.path != root)
                .map(|r| r.path.clone())
                .collect(),
        };

        info!(
            "Scanned {} ({}): {} roots, {} files, {} warnings",
            root.display(),
            kind.as_str(),
            roots.len(),
            roots.iter().map(|r| r.files.len()).sum::<usize>(),
            warnings.len()
        );
        for scan_root in &roots {
            debug!(
                "Scan root {}: {} descriptors, {} files",
                scan_root.path.display(),
                scan_root.descriptors.len(),
                scan_root.files.len()
            );
        }

        Ok(ScanResult {
            project,
            workspace,
            roots,
            warnings,
        })
    }
}
