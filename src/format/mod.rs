//! Data formats
//!
//! A [`DataFormat`] is the semantic type of a class of data files: how many
//! files one instance spans, which extensions it uses, and which design or
//! sample metadata keys point at it. Formats are immutable, registered once in
//! a [`DataFormatRegistry`] and shared as `Arc<DataFormat>`.

mod compression;
mod registry;

pub use compression::CompressionType;
pub use registry::{formats, DataFormatRegistry};

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::data::naming;
use crate::error::{Result, StepflowError};

/// Immutable data format descriptor
///
/// Two descriptors are equal when their names are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFormat {
    name: String,
    prefix: String,
    #[serde(default)]
    description: String,
    /// First entry is the default extension
    extensions: Vec<String>,
    max_files: usize,
    #[serde(default)]
    one_file_per_analysis: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    design_metadata_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_metadata_key: Option<String>,
}

impl DataFormat {
    /// Start building a format
    pub fn builder(name: impl Into<String>, prefix: impl Into<String>) -> DataFormatBuilder {
        DataFormatBuilder {
            format: DataFormat {
                name: name.into(),
                prefix: prefix.into(),
                description: String::new(),
                extensions: Vec::new(),
                max_files: 1,
                one_file_per_analysis: false,
                design_metadata_key: None,
                sample_metadata_key: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix used in conventional file names
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Extension of newly created files
    pub fn default_extension(&self) -> &str {
        self.extensions.first().map(String::as_str).unwrap_or("")
    }

    /// Maximum number of files of one instance (1 = single-file)
    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn is_multi_file(&self) -> bool {
        self.max_files > 1
    }

    /// One instance for the whole analysis (e.g. a genome) rather than one per sample
    pub fn is_one_file_per_analysis(&self) -> bool {
        self.one_file_per_analysis
    }

    /// Whether ports of this format may carry a list of data
    pub fn is_list_capable(&self) -> bool {
        !self.one_file_per_analysis
    }

    pub fn design_metadata_key(&self) -> Option<&str> {
        self.design_metadata_key.as_deref()
    }

    pub fn sample_metadata_key(&self) -> Option<&str> {
        self.sample_metadata_key.as_deref()
    }

    /// Whether `extension` (with or without leading dot) belongs to this format
    pub fn has_extension(&self, extension: &str) -> bool {
        let wanted = normalize_extension(extension);
        self.extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&wanted))
    }
}

impl PartialEq for DataFormat {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DataFormat {}

impl Hash for DataFormat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`DataFormat`]
#[derive(Debug, Clone)]
pub struct DataFormatBuilder {
    format: DataFormat,
}

impl DataFormatBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.format.description = description.into();
        self
    }

    /// Add an extension; the first one added is the default
    pub fn extension(mut self, extension: &str) -> Self {
        self.format.extensions.push(normalize_extension(extension));
        self
    }

    pub fn max_files(mut self, max: usize) -> Self {
        self.format.max_files = max;
        self
    }

    pub fn one_file_per_analysis(mut self) -> Self {
        self.format.one_file_per_analysis = true;
        self
    }

    pub fn design_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.format.design_metadata_key = Some(key.into());
        self
    }

    pub fn sample_metadata_key(mut self, key: impl Into<String>) -> Self {
        self.format.sample_metadata_key = Some(key.into());
        self
    }

    pub fn build(self) -> Result<DataFormat> {
        let format = self.format;
        if format.name.trim().is_empty() {
            return Err(StepflowError::UnknownFormat {
                name: format.name,
            });
        }
        if !naming::is_format_prefix_valid(&format.prefix) {
            return Err(StepflowError::InvalidFileName {
                filename: format.prefix.clone(),
                reason: format!("invalid prefix for format '{}'", format.name),
            });
        }
        if format.max_files == 0 {
            return Err(StepflowError::TooManyFiles {
                data: format.name.clone(),
                format: format.name,
                max: 0,
            });
        }
        Ok(format)
    }
}

fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim();
    if trimmed.starts_with('.') {
        trimmed.to_ascii_lowercase()
    } else {
        format!(".{}", trimmed.to_ascii_lowercase())
    }
}
