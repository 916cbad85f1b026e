//! Workspace declaration detection.

use std::path::Path;

use crate::dependencies::{DescriptorInfo, Ecosystem};

/// Workspace flavor declared at a project root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceType {
    NpmWorkspace,
    PnpmWorkspace,
    Lerna,
    Nx,
    CargoWorkspace,
    GoWorkspace,
    SingleProject,
}

impl WorkspaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceType::NpmWorkspace => "npm",
            WorkspaceType::PnpmWorkspace => "pnpm",
            WorkspaceType::Lerna => "lerna",
            WorkspaceType::Nx => "nx",
            WorkspaceType::CargoWorkspace => "cargo",
            WorkspaceType::GoWorkspace => "go",
            WorkspaceType::SingleProject => "single",
        }
    }

    pub fn is_workspace(&self) -> bool {
        !matches!(self, WorkspaceType::SingleProject)
    }
}

pub struct WorkspaceDetector;

impl WorkspaceDetector {
    /// Detects the workspace type at `root`, given the descriptors already
    /// parsed from that directory.
    pub fn detect(root: &Path, root_descriptors: &[DescriptorInfo]) -> WorkspaceType {
        if let Some(info) = root_descriptors.iter().find(|i| i.declares_workspace) {
            return match info.ecosystem {
                Ecosystem::Cargo => WorkspaceType::CargoWorkspace,
                _ => WorkspaceType::NpmWorkspace,
            };
        }

        let markers = [
            ("pnpm-workspace.yaml", WorkspaceType::PnpmWorkspace),
            ("lerna.json", WorkspaceType::Lerna),
            ("nx.json", WorkspaceType::Nx),
            ("go.work", WorkspaceType::GoWorkspace),
        ];
        markers
            .iter()
            .find(|(name, _)| root.join(name).is_file())
            .map(|(_, kind)| *kind)
            .unwrap_or(WorkspaceType::SingleProject)
    }
}
