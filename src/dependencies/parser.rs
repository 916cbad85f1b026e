//! Descriptor parser trait and registry.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::Result;

use super::{DescriptorInfo, Ecosystem};

/// Trait for reading dependency descriptors of a specific ecosystem.
pub trait DescriptorParser: Send + Sync {
    /// Returns the ecosystem this parser handles.
    fn ecosystem(&self) -> Ecosystem;

    /// Returns the descriptor file names this parser can read.
    fn manifest_names(&self) -> &[&str] {
        self.ecosystem().manifest_names()
    }

    /// Checks if this parser can handle the given path.
    fn can_handle(&self, path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
            self.manifest_names().contains(&file_name)
        } else {
            false
        }
    }

    /// Parses descriptor content already read from `path`.
    fn parse_content(&self, content: &str, path: &Path) -> Result<DescriptorInfo>;

    /// Reads and parses a descriptor file.
    fn parse_manifest(&self, path: &Path) -> Result<DescriptorInfo> {
        let content = fs::read_to_string(path)?;
        self.parse_content(&content, path)
    }
}

/// Registry of descriptor parsers.
pub struct DescriptorRegistry {
    parsers: HashMap<Ecosystem, Box<dyn DescriptorParser>>,
}

impl DescriptorRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Creates a registry with all built-in parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::npm::NpmParser::new()));
        registry.register(Box::new(super::python::PythonParser::new()));
        registry.register(Box::new(super::composer::ComposerParser::new()));
        registry.register(Box::new(super::gomod::GoModParser::new()));
        registry.register(Box::new(super::cargo::CargoParser::new()));
        registry
    }

    pub fn register(&mut self, parser: Box<dyn DescriptorParser>) {
        self.parsers.insert(parser.ecosystem(), parser);
    }

    pub fn get(&self, ecosystem: Ecosystem) -> Option<&dyn DescriptorParser> {
        self.parsers.get(&ecosystem).map(|p| p.as_ref())
    }

    /// Finds a parser that can handle the given descriptor path.
    pub fn find_for_manifest(&self, path: &Path) -> Option<&dyn DescriptorParser> {
        self.parsers
            .values()
            .find(|p| p.can_handle(path))
            .map(|p| p.as_ref())
    }

    /// Parses a descriptor with whichever parser claims it.
    pub fn parse(&self, path: &Path) -> Option<Result<DescriptorInfo>> {
        self.find_for_manifest(path).map(|p| p.parse_manifest(path))
    }
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
