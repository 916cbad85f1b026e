//! go.mod reader.

use std::path::Path;

use crate::error::Result;

use super::parser::DescriptorParser;
use super::{Dependency, DescriptorInfo, Ecosystem};

pub struct GoModParser;

impl GoModParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_require_line(line: &str) -> Option<Dependency> {
        let line = line.split("//").next()?.trim();
        let mut parts = line.split_whitespace();
        let module = parts.next()?;
        let version = parts.next().unwrap_or("");
        if module == ")" || module.is_empty() {
            return None;
        }
        Some(Dependency::new(module, version, Ecosystem::Go))
    }
}

impl Default for GoModParser {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorParser for GoModParser {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo> {
        let mut name = None;
        let mut deps = Vec::new();
        let mut in_block = false;

        for raw in content.lines() {
            let line = raw.trim();
            if in_block {
                if line.starts_with(')') {
                    in_block = false;
                } else if let Some(dep) = Self::parse_require_line(line) {
                    deps.push(dep);
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("module ") {
                name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("require") {
                let rest = rest.trim();
                if rest.starts_with('(') {
                    in_block = true;
                } else if let Some(dep) = Self::parse_require_line(rest) {
                    deps.push(dep);
                }
            }
        }

        let info =
            DescriptorInfo::new(Ecosystem::Go, path.to_string_lossy()).with_dependencies(deps);
        Ok(match name {
            Some(name) => info.with_name(name),
            None => info,
        })
    }
}
