//! Compression detection from file extensions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compression of a data file, detected from its trailing extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl CompressionType {
    /// Extension appended to compressed files (empty for `None`)
    pub fn extension(self) -> &'static str {
        match self {
            CompressionType::None => "",
            CompressionType::Gzip => ".gz",
            CompressionType::Bzip2 => ".bz2",
        }
    }

    /// Detect compression from a file name
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(".gz") {
            CompressionType::Gzip
        } else if filename.ends_with(".bz2") {
            CompressionType::Bzip2
        } else {
            CompressionType::None
        }
    }

    /// Remove the compression extension from a file name
    pub fn strip(filename: &str) -> (&str, Self) {
        let compression = Self::from_filename(filename);
        let stem = &filename[..filename.len() - compression.extension().len()];
        (stem, compression)
    }

    pub fn is_compressed(self) -> bool {
        self != CompressionType::None
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionType::None => "none",
            CompressionType::Gzip => "gzip",
            CompressionType::Bzip2 => "bzip2",
        };
        f.write_str(name)
    }
}
