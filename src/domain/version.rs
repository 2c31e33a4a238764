//! Source versions and package references.

use std::fmt;

use serde::Serialize;

use crate::error::FleetError;

/// A git ref to build a source from: `branch:<name>` or `tag:<name>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceVersion {
    pub use_branch: bool,
    #[serde(rename = "ref")]
    pub reference: String,
}

impl SourceVersion {
    pub fn parse(raw: &str) -> Result<Self, FleetError> {
        let invalid = || {
            FleetError::Config(format!(
                "invalid version '{}': expected 'branch:<name>' or 'tag:<name>'",
                raw
            ))
        };

        let (kind, reference) = raw.split_once(':').ok_or_else(invalid)?;
        if reference.is_empty() {
            return Err(invalid());
        }

        let use_branch = match kind {
            "branch" => true,
            "tag" => false,
            _ => return Err(invalid()),
        };

        Ok(Self {
            use_branch,
            reference: reference.to_string(),
        })
    }
}

impl fmt::Display for SourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.use_branch { "branch" } else { "tag" };
        write!(f, "{}:{}", kind, self.reference)
    }
}

/// One entry of a pyenv's `packages` option: `<source>[:<version>]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageRef {
    /// Name of the `pysrc` section
    pub name: String,
    /// Version to build, `None` to use the source's own default
    pub version: Option<SourceVersion>,
}

impl PackageRef {
    pub fn parse(raw: &str) -> Result<Self, FleetError> {
        match raw.split_once(':') {
            Some((name, version)) => Ok(Self {
                name: name.to_string(),
                version: Some(SourceVersion::parse(version)?),
            }),
            None => Ok(Self {
                name: raw.to_string(),
                version: None,
            }),
        }
    }

    /// Parse a whitespace separated package list
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, FleetError> {
        raw.split_whitespace().map(Self::parse).collect()
    }
}
