//! requirements.txt and pyproject.toml reader.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DiscoveryError, Result};

use super::parser::DescriptorParser;
use super::{Dependency, DescriptorInfo, Ecosystem};

/// `name[extras] <op> version ; marker`
static REQUIREMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)\s*(?:\[[^\]]*\])?\s*([^;#]*)")
        .expect("invalid requirement pattern")
});

pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_requirement(line: &str) -> Option<Dependency> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            return None;
        }
        let caps = REQUIREMENT.captures(line)?;
        let name = caps.get(1)?.as_str();
        let version = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        Some(Dependency::new(name, version, Ecosystem::Python))
    }

    fn parse_requirements_txt(content: &str) -> Vec<Dependency> {
        content.lines().filter_map(Self::parse_requirement).collect()
    }

    fn parse_pyproject(content: &str, path: &Path) -> Result<(Option<String>, Vec<Dependency>)> {
        let value: toml::Value =
            content
                .parse()
                .map_err(|e: toml::de::Error| DiscoveryError::Parse {
                    path: path.to_path_buf(),
                    reason: format!("Invalid pyproject.toml: {}", e),
                })?;

        let mut deps = Vec::new();
        let mut name = None;

        // PEP 621
        if let Some(project) = value.get("project") {
            name = project.get("name").and_then(|v| v.as_str()).map(String::from);
            if let Some(list) = project.get("dependencies").and_then(|v| v.as_array()) {
                deps.extend(
                    list.iter()
                        .filter_map(|v| v.as_str())
                        .filter_map(Self::parse_requirement),
                );
            }
        }

        // Poetry
        if let Some(poetry) = value.get("tool").and_then(|t| t.get("poetry")) {
            if name.is_none() {
                name = poetry.get("name").and_then(|v| v.as_str()).map(String::from);
            }
            if let Some(table) = poetry.get("dependencies").and_then(|v| v.as_table()) {
                for (dep_name, spec) in table {
                    if dep_name == "python" {
                        continue;
                    }
                    let version = match spec {
                        toml::Value::String(v) => v.clone(),
                        toml::Value::Table(t) => t
                            .get("version")
                            .and_then(|v| v.as_str())
                            .unwrap_or("*")
                            .to_string(),
                        _ => "*".to_string(),
                    };
                    deps.push(Dependency::new(dep_name, version, Ecosystem::Python));
                }
            }
        }

        Ok((name, deps))
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser for PythonParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo> {
        let is_pyproject = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n == "pyproject.toml")
            .unwrap_or(false);

        let info = DescriptorInfo::new(Ecosystem::Python, path.to_string_lossy());
        if is_pyproject {
            let (name, deps) = Self::parse_pyproject(content, path)?;
            let info = info.with_dependencies(deps);
            Ok(match name {
                Some(name) => info.with_name(name),
                None => info,
            })
        } else {
            Ok(info.with_dependencies(Self::parse_requirements_txt(content)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_requirements_txt() {
        let content = "\
# web
Flask==3.0.0
fastapi>=0.100 ; python_version >= '3.8'
uvicorn[standard]
-r dev.txt

gunicorn  # server
";
        let info = PythonParser::new()
            .parse_content(content, Path::new("requirements.txt"))
            .unwrap();

        assert_eq!(info.dependencies.len(), 4);
        assert!(info.has("flask"));
        assert_eq!(info.find("fastapi").unwrap().version, ">=0.100");
        assert!(info.has("uvicorn"));
        assert!(info.has("gunicorn"));
    }

    #[test]
    fn test_parse_pep621_pyproject() {
        let content = r#"
[project]
name = "service"
dependencies = ["fastapi>=0.110", "pydantic"]
"#;
        let info = PythonParser::new()
            .parse_content(content, Path::new("pyproject.toml"))
            .unwrap();

        assert_eq!(info.name.as_deref(), Some("service"));
        assert!(info.has("fastapi"));
        assert!(info.has("pydantic"));
    }

    #[test]
    fn test_parse_poetry_pyproject() {
        let content = r#"
[tool.poetry]
name = "legacy"

[tool.poetry.dependencies]
python = "^3.11"
flask = "^3.0"
"#;
        let info = PythonParser::new()
            .parse_content(content, Path::new("pyproject.toml"))
            .unwrap();

        assert_eq!(info.dependencies.len(), 1);
        assert!(info.has("Flask"));
    }
}
