//! package.json reader.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DiscoveryError, Result};

use super::parser::DescriptorParser;
use super::{Dependency, DescriptorInfo, Ecosystem};

pub struct NpmParser;

impl NpmParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NpmParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser for NpmParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo> {
        let pkg: PackageJson = serde_json::from_str(content).map_err(|e| DiscoveryError::Parse {
            path: path.to_path_buf(),
            reason: format!("Invalid package.json: {}", e),
        })?;

        let mut deps = Vec::new();
        let groups = [
            (pkg.dependencies, false),
            (pkg.dev_dependencies, true),
            (pkg.peer_dependencies, false),
            (pkg.optional_dependencies, false),
        ];
        for (group, is_dev) in groups {
            let Some(group) = group else { continue };
            let mut entries: Vec<_> = group.into_iter().collect();
            entries.sort();
            for (name, version) in entries {
                deps.push(Dependency::new(name, version, Ecosystem::Npm).with_dev(is_dev));
            }
        }

        let mut info = DescriptorInfo::new(Ecosystem::Npm, path.to_string_lossy())
            .with_dependencies(deps)
            .with_workspace(pkg.workspaces.is_some());
        if let Some(name) = pkg.name {
            info = info.with_name(name);
        }
        Ok(info)
    }
}

/// Minimal representation of package.json
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    name: Option<String>,
    #[serde(default)]
    dependencies: Option<HashMap<String, String>>,
    #[serde(default)]
    dev_dependencies: Option<HashMap<String, String>>,
    #[serde(default)]
    peer_dependencies: Option<HashMap<String, String>>,
    #[serde(default)]
    optional_dependencies: Option<HashMap<String, String>>,
    /// Array form or yarn's `{ "packages": [...] }` form
    #[serde(default)]
    workspaces: Option<serde_json::Value>,
}
