//! DataFormatRegistry - format lookup by name, extension and prefix
//!
//! Populated once before any port is declared, then shared read-only.

use std::collections::HashMap;
use std::sync::Arc;

use super::DataFormat;
use crate::error::{Result, StepflowError};

/// Names of the built-in formats
pub mod formats {
    pub const READS_FASTQ: &str = "reads_fastq";
    pub const READS_TFQ: &str = "reads_tfq";
    pub const MAPPER_RESULTS_SAM: &str = "mapper_results_sam";
    pub const EXPRESSION_RESULTS_TSV: &str = "expression_results_tsv";
    pub const GENOME_FASTA: &str = "genome_fasta";
    pub const GENOME_DESC_TXT: &str = "genome_desc_txt";
    pub const ANNOTATION_GFF: &str = "annotation_gff";
    pub const BOWTIE_INDEX_ZIP: &str = "bowtie_index_zip";
}

/// Registry of immutable format descriptors
#[derive(Debug, Clone, Default)]
pub struct DataFormatRegistry {
    formats: Vec<Arc<DataFormat>>,
    by_name: HashMap<String, usize>,
}

impl DataFormatRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in sequencing formats
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for format in builtin_formats() {
            // Built-in names are distinct
            let _ = registry.register(format);
        }
        registry
    }

    /// Register a format
    pub fn register(&mut self, format: DataFormat) -> Result<Arc<DataFormat>> {
        if self.by_name.contains_key(format.name()) {
            return Err(StepflowError::DuplicateFormat {
                name: format.name().to_string(),
            });
        }
        let format = Arc::new(format);
        self.by_name
            .insert(format.name().to_string(), self.formats.len());
        self.formats.push(Arc::clone(&format));
        Ok(format)
    }

    /// Look a format up by name
    pub fn lookup(&self, name: &str) -> Result<Arc<DataFormat>> {
        self.get(name).ok_or_else(|| StepflowError::UnknownFormat {
            name: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<DataFormat>> {
        self.by_name
            .get(name)
            .map(|&idx| Arc::clone(&self.formats[idx]))
    }

    /// All formats using an extension (with or without leading dot)
    pub fn lookup_by_extension(&self, extension: &str) -> Vec<Arc<DataFormat>> {
        self.formats
            .iter()
            .filter(|f| f.has_extension(extension))
            .cloned()
            .collect()
    }

    /// The format with this file-name prefix and extension, if exactly one matches
    pub fn lookup_by_prefix_and_extension(
        &self,
        prefix: &str,
        extension: &str,
    ) -> Option<Arc<DataFormat>> {
        let mut matches = self
            .formats
            .iter()
            .filter(|f| f.prefix() == prefix && f.has_extension(extension));
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(Arc::clone(first))
    }

    /// All formats in registration order
    pub fn all(&self) -> &[Arc<DataFormat>] {
        &self.formats
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

fn builtin_formats() -> Vec<DataFormat> {
    let specs = [
        DataFormat::builder(formats::READS_FASTQ, "reads")
            .description("FASTQ reads, single or paired-end")
            .extension(".fq")
            .extension(".fastq")
            .max_files(2)
            .sample_metadata_key("reads"),
        DataFormat::builder(formats::READS_TFQ, "tfq")
            .description("Tabulated FASTQ reads")
            .extension(".tfq")
            .sample_metadata_key("tfqreads"),
        DataFormat::builder(formats::MAPPER_RESULTS_SAM, "alignments")
            .description("Alignments in SAM format")
            .extension(".sam"),
        DataFormat::builder(formats::EXPRESSION_RESULTS_TSV, "expression")
            .description("Expression counts")
            .extension(".tsv"),
        DataFormat::builder(formats::GENOME_FASTA, "genome")
            .description("Reference genome")
            .extension(".fasta")
            .extension(".fa")
            .one_file_per_analysis()
            .design_metadata_key("genome"),
        DataFormat::builder(formats::GENOME_DESC_TXT, "genomedesc")
            .description("Genome description")
            .extension(".txt")
            .one_file_per_analysis(),
        DataFormat::builder(formats::ANNOTATION_GFF, "annotation")
            .description("Genome annotation")
            .extension(".gff")
            .extension(".gff3")
            .one_file_per_analysis()
            .design_metadata_key("annotation"),
        DataFormat::builder(formats::BOWTIE_INDEX_ZIP, "bowtieindex")
            .description("Zipped bowtie index")
            .extension(".zip")
            .one_file_per_analysis(),
    ];

    specs
        .into_iter()
        .filter_map(|builder| builder.build().ok())
        .collect()
}
