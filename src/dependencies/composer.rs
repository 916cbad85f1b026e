//! composer.json reader.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DiscoveryError, Result};

use super::parser::DescriptorParser;
use super::{Dependency, DescriptorInfo, Ecosystem};

pub struct ComposerParser;

impl ComposerParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ComposerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser for ComposerParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Composer
    }

    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo> {
        let composer: ComposerJson =
            serde_json::from_str(content).map_err(|e| DiscoveryError::Parse {
                path: path.to_path_buf(),
                reason: format!("Invalid composer.json: {}", e),
            })?;

        let deps = composer
            .require
            .into_iter()
            .map(|(name, version)| Dependency::new(name, version, Ecosystem::Composer))
            .chain(composer.require_dev.into_iter().map(|(name, version)| {
                Dependency::new(name, version, Ecosystem::Composer).with_dev(true)
            }))
            .collect();

        let info = DescriptorInfo::new(Ecosystem::Composer, path.to_string_lossy())
            .with_dependencies(deps);
        Ok(match composer.name {
            Some(name) => info.with_name(name),
            None => info,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ComposerJson {
    name: Option<String>,
    #[serde(default)]
    require: BTreeMap<String, String>,
    #[serde(default, rename = "require-dev")]
    require_dev: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_composer_json() {
        let content = r#"
{
    "name": "laravel/laravel",
    "require": {
        "php": "^8.1",
        "laravel/framework": "^10.10"
    },
    "require-dev": {
        "phpunit/phpunit": "^10.1"
    }
}
"#;
        let info = ComposerParser::new()
            .parse_content(content, Path::new("composer.json"))
            .unwrap();

        assert_eq!(info.name.as_deref(), Some("laravel/laravel"));
        assert!(info.has("laravel/framework"));
        assert!(info.find("phpunit/phpunit").unwrap().is_dev);
    }

    #[test]
    fn test_parse_empty_composer_json() {
        let info = ComposerParser::new()
            .parse_content("{}", Path::new("composer.json"))
            .unwrap();
        assert!(info.dependencies.is_empty());
    }
}
