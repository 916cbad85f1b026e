use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::warn;

use crate::dependencies::is_descriptor;
use crate::error::{DiscoveryError, Result};

use super::{is_source_file, PathFilter, ScanWarning, SKIP_DIRS};

/// Files found by one walk of a project tree.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub sources: Vec<PathBuf>,
    pub descriptors: Vec<PathBuf>,
    pub warnings: Vec<ScanWarning>,
}

pub struct FileWalker {
    filter: PathFilter,
    state_dir: String,
}

impl FileWalker {
    pub fn new(filter: PathFilter, state_dir: impl Into<String>) -> Self {
        Self {
            filter,
            state_dir: state_dir.into(),
        }
    }

    pub fn walk(&self, root: &Path) -> Result<WalkOutput> {
        check_root(root)?;

        let mut output = WalkOutput::default();
        let state_dir = self.state_dir.clone();

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .ignore(true)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir || entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                name != state_dir.as_str() && !SKIP_DIRS.contains(&name.as_ref())
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    output.warnings.push(ScanWarning::from_walk_error(root, &err));
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if is_descriptor(path) {
                // Descriptors shape the root layout even when excluded from matching
                output.descriptors.push(path.to_path_buf());
            } else if is_source_file(path) && self.filter.matches(path) {
                output.sources.push(path.to_path_buf());
            }
        }

        output.sources.sort();
        output.descriptors.sort();
        Ok(output)
    }
}

/// Fails unless `root` is an existing, readable directory.
pub fn check_root(root: &Path) -> Result<()> {
    let metadata = std::fs::metadata(root)
        .map_err(|e| DiscoveryError::scan(root, format!("cannot access root: {}", e)))?;
    if !metadata.is_dir() {
        return Err(DiscoveryError::scan(root, "root is not a directory"));
    }
    std::fs::read_dir(root)
        .map_err(|e| DiscoveryError::scan(root, format!("root is not readable: {}", e)))?;
    Ok(())
}
