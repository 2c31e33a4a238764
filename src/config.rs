//! Configuration registry for pyfleet.
//!
//! Configuration sources (highest priority first):
//! 1. Explicit path (`--config`)
//! 2. Environment variable (PYFLEET_CONFIG)
//! 3. Project file (.pyfleet/config.yaml, searched from the current directory upward)
//! 4. User file (~/.pyfleet/config.yaml)
//!
//! The file maps section kinds to named sections:
//!
//! ```yaml
//! server:
//!   web1:
//!     host: web1.example.com
//! pyenv:
//!   staging:
//!     location: deploy@web1:envs/staging
//!     packages: [itools:tag:0.75.1, ikaaro:branch:master]
//! ikaaro:
//!   shop:
//!     pyenv: staging
//!     path: instances/shop
//!     uri: http://shop.example.com
//! ```

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::error::FleetError;

/// A named mapping of option key to string value, identified by (kind, name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSection {
    pub kind: String,
    pub name: String,
    /// Options in file order
    pub options: Vec<(String, String)>,
}

impl ConfigSection {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Builder-style option setter (mostly for tests and programmatic setups)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.options.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.options.push((key, value)),
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// Get a required option
    pub fn require(&self, key: &str) -> Result<&str, FleetError> {
        self.get(key).ok_or_else(|| FleetError::MissingOption {
            kind: self.kind.clone(),
            name: self.name.clone(),
            key: key.to_string(),
        })
    }

    /// Interpret an option as a flag (`1`, `true`, `yes`, `on`)
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }
}

/// Read-only collection of configuration sections, in file order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    sections: Vec<Arc<ConfigSection>>,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section; a later section with the same (kind, name) replaces the earlier one
    pub fn insert(&mut self, section: ConfigSection) {
        let section = Arc::new(section);
        match self
            .sections
            .iter_mut()
            .find(|s| s.kind == section.kind && s.name == section.name)
        {
            Some(slot) => *slot = section,
            None => self.sections.push(section),
        }
    }

    pub fn with_section(mut self, section: ConfigSection) -> Self {
        self.insert(section);
        self
    }

    /// Look up a section by kind and name
    pub fn get_section(&self, kind: &str, name: &str) -> Option<Arc<ConfigSection>> {
        self.sections
            .iter()
            .find(|s| s.kind == kind && s.name == name)
            .cloned()
    }

    /// Like `get_section`, failing with `SectionNotFound`
    pub fn require_section(&self, kind: &str, name: &str) -> Result<Arc<ConfigSection>, FleetError> {
        self.get_section(kind, name)
            .ok_or_else(|| FleetError::section_not_found(kind, name))
    }

    /// All sections of one kind, in registry order
    pub fn get_sections_by_type<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a Arc<ConfigSection>> + 'a {
        self.sections.iter().filter(move |s| s.kind == kind)
    }

    pub fn sections(&self) -> impl Iterator<Item = &Arc<ConfigSection>> {
        self.sections.iter()
    }

    /// Path of the file this registry was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Parse a registry from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content).context("Failed to parse config YAML")?;

        let mut registry = Registry::new();
        let root = match root {
            Value::Null => return Ok(registry),
            Value::Mapping(map) => map,
            _ => anyhow::bail!("Config root must be a mapping of section kinds"),
        };

        for (kind, sections) in root {
            let kind = scalar_to_string(&kind)
                .ok_or_else(|| FleetError::Config("section kind must be a string".into()))?;
            let sections = match sections {
                Value::Null => continue,
                Value::Mapping(map) => map,
                _ => anyhow::bail!("'{}' must map section names to options", kind),
            };

            for (name, options) in sections {
                let name = scalar_to_string(&name).ok_or_else(|| {
                    FleetError::Config(format!("{} section names must be strings", kind))
                })?;
                let section = parse_section(&kind, &name, options)?;
                registry.insert(section);
            }
        }

        Ok(registry)
    }

    /// Load a registry from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut registry = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        registry.source = Some(path.to_path_buf());
        Ok(registry)
    }
}

fn parse_section(kind: &str, name: &str, options: Value) -> Result<ConfigSection> {
    let mut section = ConfigSection::new(kind, name);
    let options: Mapping = match options {
        Value::Null => return Ok(section),
        Value::Mapping(map) => map,
        _ => anyhow::bail!("{} '{}' must be a mapping of options", kind, name),
    };

    for (key, value) in options {
        let key = scalar_to_string(&key)
            .ok_or_else(|| FleetError::Config(format!("{} '{}' has a non-string key", kind, name)))?;
        let value = match value {
            Value::Sequence(items) => items
                .iter()
                .map(|item| {
                    scalar_to_string(item).ok_or_else(|| {
                        FleetError::Config(format!("{}.{}.{} must list scalars", kind, name, key))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(" "),
            other => scalar_to_string(&other).ok_or_else(|| {
                FleetError::Config(format!("{}.{}.{} must be a scalar or a list", kind, name, key))
            })?,
        };
        section = section.with(key, value);
    }

    Ok(section)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

/// Runtime switches threaded explicitly through an action invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Refuse to contact remote hosts
    pub offline: bool,
}

/// Find the project config file by searching the current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".pyfleet").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Decide which config file to load
pub fn locate_config(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("PYFLEET_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(found) = find_config_file() {
        return Ok(found);
    }

    let user_file = paths::pyfleet_home()?.join("config.yaml");
    if user_file.exists() {
        return Ok(user_file);
    }

    anyhow::bail!(
        "No configuration found (use --config, PYFLEET_CONFIG, .pyfleet/config.yaml or {})",
        user_file.display()
    )
}

/// Locate and load the configuration registry
pub fn load_registry(explicit: Option<&Path>) -> Result<Registry> {
    let path = locate_config(explicit)?;
    tracing::debug!(path = %path.display(), "Loading configuration");
    Registry::from_file(&path)
}
