//! Data flowing between steps
//!
//! A [`Data`] is either a value (up to `max_files` files of one format plus
//! metadata) or a list of named values. Scalars behave as one-element lists
//! through [`Data::list_elements`], so callers can treat both shapes alike.
//!
//! ```text
//! Data "s1"   (reads_fastq)   files: [s1_file0.fq, s1_file1.fq]
//! Data "reads" (list)         elements: [Data "s1", Data "s2"]
//! ```

pub mod naming;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StepflowError};
use crate::format::{CompressionType, DataFormat};

pub use naming::FileNaming;

/// Path of one file of a data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataFile(PathBuf);

impl DataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Base name of the file
    pub fn name(&self) -> String {
        self.0
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn compression(&self) -> CompressionType {
        CompressionType::from_filename(&self.name())
    }

    pub fn exists(&self) -> bool {
        self.0.exists()
    }
}

impl From<PathBuf> for DataFile {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

impl From<&Path> for DataFile {
    fn from(path: &Path) -> Self {
        Self(path.to_path_buf())
    }
}

impl From<&str> for DataFile {
    fn from(path: &str) -> Self {
        Self(PathBuf::from(path))
    }
}

impl fmt::Display for DataFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// String key/value metadata attached to a data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataMetadata(BTreeMap<String, String>);

impl DataMetadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other`, overwriting existing keys
    pub fn merge(&mut self, other: &DataMetadata) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DataContent {
    Value {
        files: Vec<DataFile>,
        metadata: DataMetadata,
    },
    List {
        elements: Vec<Data>,
    },
}

/// A named value or list of values of one format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    name: String,
    default_name: bool,
    format: Arc<DataFormat>,
    #[serde(flatten)]
    content: DataContent,
}

impl Data {
    /// Empty value named after its format prefix
    ///
    /// The name counts as a default name until [`Data::set_name`] is called.
    pub fn value(format: Arc<DataFormat>) -> Self {
        Self {
            name: format.prefix().to_string(),
            default_name: true,
            format,
            content: DataContent::Value {
                files: Vec::new(),
                metadata: DataMetadata::default(),
            },
        }
    }

    /// Empty list named after its format prefix
    pub fn list(format: Arc<DataFormat>) -> Self {
        Self {
            name: format.prefix().to_string(),
            default_name: true,
            format,
            content: DataContent::List {
                elements: Vec::new(),
            },
        }
    }

    /// Empty value with an explicit name
    pub fn named(name: &str, format: Arc<DataFormat>) -> Result<Self> {
        let mut data = Self::value(format);
        data.set_name(name)?;
        Ok(data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename; the name is no longer a default one
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        if !naming::is_data_name_valid(name) {
            return Err(StepflowError::InvalidDataName {
                name: name.to_string(),
                reason: "use letters and digits only".into(),
            });
        }
        self.name = name.to_string();
        self.default_name = false;
        Ok(())
    }

    /// Whether the name was generated rather than set explicitly
    pub fn is_default_name(&self) -> bool {
        self.default_name
    }

    pub fn format(&self) -> &Arc<DataFormat> {
        &self.format
    }

    pub fn is_list(&self) -> bool {
        matches!(self.content, DataContent::List { .. })
    }

    // ═══════════════════════════════════════════════════════════════
    // Files and metadata (values)
    // ═══════════════════════════════════════════════════════════════

    /// Files of a value (empty for lists)
    pub fn files(&self) -> &[DataFile] {
        match &self.content {
            DataContent::Value { files, .. } => files,
            DataContent::List { .. } => &[],
        }
    }

    /// First file of a value
    pub fn file(&self) -> Option<&DataFile> {
        self.files().first()
    }

    /// Replace the files of a value
    pub fn set_files(&mut self, new_files: Vec<DataFile>) -> Result<()> {
        let max = self.format.max_files();
        if new_files.len() > max {
            return Err(self.too_many_files());
        }
        match &mut self.content {
            DataContent::Value { files, .. } => {
                *files = new_files;
                Ok(())
            }
            DataContent::List { .. } => Err(StepflowError::ListHoldsNoFiles {
                data: self.name.clone(),
            }),
        }
    }

    pub fn set_file(&mut self, file: impl Into<DataFile>) -> Result<()> {
        self.set_files(vec![file.into()])
    }

    /// Append one file to a value
    pub fn add_file(&mut self, file: impl Into<DataFile>) -> Result<()> {
        let max = self.format.max_files();
        let err = self.too_many_files();
        match &mut self.content {
            DataContent::Value { files, .. } if files.len() < max => {
                files.push(file.into());
                Ok(())
            }
            DataContent::Value { .. } => Err(err),
            DataContent::List { .. } => Err(StepflowError::ListHoldsNoFiles {
                data: self.name.clone(),
            }),
        }
    }

    /// Metadata of a value (lists carry none)
    pub fn metadata(&self) -> Option<&DataMetadata> {
        match &self.content {
            DataContent::Value { metadata, .. } => Some(metadata),
            DataContent::List { .. } => None,
        }
    }

    pub fn metadata_mut(&mut self) -> Option<&mut DataMetadata> {
        match &mut self.content {
            DataContent::Value { metadata, .. } => Some(metadata),
            DataContent::List { .. } => None,
        }
    }

    /// Files of this data and, for lists, of all elements
    pub fn all_files(&self) -> Vec<&DataFile> {
        self.list_elements()
            .into_iter()
            .flat_map(|d| d.files().iter())
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════
    // Elements (lists)
    // ═══════════════════════════════════════════════════════════════

    /// Elements of a list, or the value itself
    pub fn list_elements(&self) -> Vec<&Data> {
        match &self.content {
            DataContent::List { elements } => elements.iter().collect(),
            DataContent::Value { .. } => vec![self],
        }
    }

    /// Elements of a list (empty for values)
    pub fn elements(&self) -> &[Data] {
        match &self.content {
            DataContent::List { elements } => elements,
            DataContent::Value { .. } => &[],
        }
    }

    pub fn element(&self, name: &str) -> Option<&Data> {
        self.elements().iter().find(|d| d.name == name)
    }

    pub fn element_mut(&mut self, name: &str) -> Option<&mut Data> {
        match &mut self.content {
            DataContent::List { elements } => elements.iter_mut().find(|d| d.name == name),
            DataContent::Value { .. } => None,
        }
    }

    /// Append a new, empty element named `name` to a list
    pub fn add_element(&mut self, name: &str) -> Result<&mut Data> {
        let element = Data::named(name, Arc::clone(&self.format))?;
        let list_name = self.name.clone();
        match &mut self.content {
            DataContent::List { elements } => {
                if elements.iter().any(|d| d.name == name) {
                    return Err(StepflowError::DuplicateDataName {
                        list: list_name,
                        name: name.to_string(),
                    });
                }
                elements.push(element);
                let last = elements.len() - 1;
                Ok(&mut elements[last])
            }
            DataContent::Value { .. } => Err(StepflowError::NotAList { data: list_name }),
        }
    }

    /// Number of elements of a list, 1 for a value
    pub fn len(&self) -> usize {
        match &self.content {
            DataContent::List { elements } => elements.len(),
            DataContent::Value { .. } => 1,
        }
    }

    /// True for an empty list
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn too_many_files(&self) -> StepflowError {
        StepflowError::TooManyFiles {
            data: self.name.clone(),
            format: self.format.name().to_string(),
            max: self.format.max_files(),
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            DataContent::Value { files, .. } => {
                write!(f, "{} ({}, {} file(s))", self.name, self.format, files.len())
            }
            DataContent::List { elements } => {
                write!(f, "{} ({} list of {})", self.name, self.format, elements.len())
            }
        }
    }
}
