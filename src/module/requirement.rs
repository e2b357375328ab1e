//! Module versions and external requirements

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StepflowError;

/// `MAJOR.MINOR.PATCH`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this engine
    pub fn runtime() -> Self {
        Self::new(
            env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = StepflowError;

    /// Missing minor/patch parts default to 0
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StepflowError::InvalidVersion {
            version: s.to_string(),
        };
        let mut parts = s.trim().split('.');
        let mut next = |required: bool| -> Result<u32, StepflowError> {
            match parts.next() {
                Some(p) => p.parse().map_err(|_| invalid()),
                None if required => Err(invalid()),
                None => Ok(0),
            }
        };
        let version = Self::new(next(true)?, next(false)?, next(false)?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    /// Program looked up on `PATH`
    Executable,
    /// Container image
    Image,
    Other,
}

/// External resource a module needs to run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    name: String,
    kind: RequirementKind,
    #[serde(default)]
    optional: bool,
}

impl Requirement {
    pub fn executable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequirementKind::Executable,
            optional: false,
        }
    }

    pub fn image(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequirementKind::Image,
            optional: false,
        }
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RequirementKind::Other,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RequirementKind {
        self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether the requirement is satisfied on this host
    ///
    /// Only executables can be checked locally; other kinds are assumed
    /// available and left to the scheduler.
    pub fn is_available(&self) -> bool {
        match self.kind {
            RequirementKind::Executable => find_in_path(&self.name),
            RequirementKind::Image | RequirementKind::Other => true,
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RequirementKind::Executable => "executable",
            RequirementKind::Image => "image",
            RequirementKind::Other => "other",
        };
        write!(f, "{} {}", kind, self.name)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

fn find_in_path(program: &str) -> bool {
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
