//! Cargo.toml reader.

use std::path::Path;

use crate::error::{DiscoveryError, Result};

use super::parser::DescriptorParser;
use super::{Dependency, DescriptorInfo, Ecosystem};

pub struct CargoParser;

impl CargoParser {
    pub fn new() -> Self {
        Self
    }

    /// Parses a dependencies table from Cargo.toml.
    fn parse_dependencies_table(table: &toml::Value, is_dev: bool) -> Vec<Dependency> {
        let Some(map) = table.as_table() else {
            return Vec::new();
        };

        map.iter()
            .map(|(name, value)| {
                let version = match value {
                    // dependency = "1.0"
                    toml::Value::String(v) => v.clone(),
                    // dependency = { version = "1.0", features = [...] }
                    toml::Value::Table(t) => t
                        .get("version")
                        .and_then(|v| v.as_str())
                        .unwrap_or("*")
                        .to_string(),
                    _ => "*".to_string(),
                };
                // `package = "..."` renames keep the real crate name visible
                let real_name = value
                    .get("package")
                    .and_then(|v| v.as_str())
                    .unwrap_or(name);
                Dependency::new(real_name, version, Ecosystem::Cargo).with_dev(is_dev)
            })
            .collect()
    }
}

impl Default for CargoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser for CargoParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo> {
        let toml_value: toml::Value =
            content
                .parse()
                .map_err(|e: toml::de::Error| DiscoveryError::Parse {
                    path: path.to_path_buf(),
                    reason: format!("Invalid Cargo.toml: {}", e),
                })?;

        let mut deps = Vec::new();
        if let Some(dependencies) = toml_value.get("dependencies") {
            deps.extend(Self::parse_dependencies_table(dependencies, false));
        }
        if let Some(dev_dependencies) = toml_value.get("dev-dependencies") {
            deps.extend(Self::parse_dependencies_table(dev_dependencies, true));
        }
        // Workspace roots often pin framework versions here
        if let Some(ws_deps) = toml_value
            .get("workspace")
            .and_then(|w| w.get("dependencies"))
        {
            deps.extend(Self::parse_dependencies_table(ws_deps, false));
        }

        let mut info = DescriptorInfo::new(Ecosystem::Cargo, path.to_string_lossy())
            .with_dependencies(deps)
            .with_workspace(toml_value.get("workspace").is_some());
        if let Some(name) = toml_value
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
        {
            info = info.with_name(name);
        }
        Ok(info)
    }
}
