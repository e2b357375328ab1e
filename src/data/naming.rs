//! Conventional file naming
//!
//! Files produced by a step are named
//! `<step>_<port>_<prefix>_<data>[_file<N>][_part<N>]<ext>[<compression>]`,
//! e.g. `filterreads_output_reads_s1_file0.fq.bz2`. Every field can be
//! recovered from the name alone, given the format registry.
//!
//! Step ids, port names and format prefixes use `[a-z0-9]+`; data names
//! allow uppercase letters too. Underscores are reserved as field separators.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, StepflowError};
use crate::format::{CompressionType, DataFormat, DataFormatRegistry};

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+$").unwrap());
static DATA_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

pub fn is_step_id_valid(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

pub fn is_port_name_valid(name: &str) -> bool {
    ID_PATTERN.is_match(name)
}

pub fn is_format_prefix_valid(prefix: &str) -> bool {
    ID_PATTERN.is_match(prefix)
}

pub fn is_data_name_valid(name: &str) -> bool {
    DATA_NAME_PATTERN.is_match(name)
}

/// Whether a file name follows the convention and names a registered format
pub fn is_filename_valid(filename: &str, registry: &DataFormatRegistry) -> bool {
    FileNaming::parse(filename, registry).is_ok()
}

/// Drop every character not allowed in a data name
pub fn to_valid_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// `step_port_prefix_`
pub fn file_prefix(step_id: &str, port_name: &str, format_prefix: &str) -> String {
    format!("{step_id}_{port_name}_{format_prefix}_")
}

/// `data[_fileN][_partN]`
pub fn file_middle(data_name: &str, file_index: Option<usize>, part: Option<usize>) -> String {
    let mut middle = data_name.to_string();
    if let Some(index) = file_index {
        middle.push_str(&format!("_file{index}"));
    }
    if let Some(part) = part {
        middle.push_str(&format!("_part{part}"));
    }
    middle
}

/// `ext` followed by the compression extension
pub fn file_suffix(extension: &str, compression_extension: &str) -> String {
    format!("{extension}{compression_extension}")
}

/// Parsed or assembled conventional file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNaming {
    step_id: String,
    port_name: String,
    format: Arc<DataFormat>,
    data_name: String,
    file_index: Option<usize>,
    part: Option<usize>,
    compression: CompressionType,
}

impl FileNaming {
    /// Naming for a data of `format` written by `step_id` on `port_name`
    pub fn new(
        step_id: &str,
        port_name: &str,
        format: Arc<DataFormat>,
        data_name: &str,
    ) -> Result<Self> {
        let mut naming = Self {
            step_id: String::new(),
            port_name: String::new(),
            format,
            data_name: String::new(),
            file_index: None,
            part: None,
            compression: CompressionType::None,
        };
        naming.set_step_id(step_id)?;
        naming.set_port_name(port_name)?;
        naming.set_data_name(data_name)?;
        Ok(naming)
    }

    /// Parse a file name (directories are ignored)
    pub fn parse(filename: &str, registry: &DataFormatRegistry) -> Result<Self> {
        let invalid = |reason: &str| StepflowError::InvalidFileName {
            filename: filename.to_string(),
            reason: reason.to_string(),
        };

        let basename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| invalid("no file name"))?;

        let (stem, compression) = CompressionType::strip(basename);
        let dot = stem.find('.').ok_or_else(|| invalid("no extension"))?;
        let (base, extension) = stem.split_at(dot);

        let mut fields: Vec<&str> = base.split('_').collect();

        let part = match fields.last().and_then(|f| numbered_field(f, "part")) {
            Some(part) => {
                fields.pop();
                Some(part)
            }
            None => None,
        };
        let file_index = match fields.last().and_then(|f| numbered_field(f, "file")) {
            Some(index) => {
                fields.pop();
                Some(index)
            }
            None => None,
        };

        let [step_id, port_name, prefix, data_name] = fields[..] else {
            return Err(invalid("expected <step>_<port>_<prefix>_<data>"));
        };

        if !is_step_id_valid(step_id) {
            return Err(invalid("invalid step id"));
        }
        if !is_port_name_valid(port_name) {
            return Err(invalid("invalid port name"));
        }
        if !is_data_name_valid(data_name) {
            return Err(invalid("invalid data name"));
        }

        let format = registry
            .lookup_by_prefix_and_extension(prefix, extension)
            .ok_or_else(|| invalid("no registered format for this prefix and extension"))?;

        if format.is_multi_file() && file_index.is_none() {
            return Err(invalid("multi-file format requires a file index"));
        }
        if !format.is_multi_file() && file_index.is_some() {
            return Err(invalid("single-file format cannot have a file index"));
        }

        Ok(Self {
            step_id: step_id.to_string(),
            port_name: port_name.to_string(),
            format,
            data_name: data_name.to_string(),
            file_index,
            part,
            compression,
        })
    }

    /// Assemble the file name
    pub fn filename(&self) -> String {
        let mut name = file_prefix(&self.step_id, &self.port_name, self.format.prefix());
        name.push_str(&file_middle(&self.data_name, self.file_index, self.part));
        name.push_str(&file_suffix(
            self.format.default_extension(),
            self.compression.extension(),
        ));
        name
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn format(&self) -> &Arc<DataFormat> {
        &self.format
    }

    pub fn data_name(&self) -> &str {
        &self.data_name
    }

    pub fn file_index(&self) -> Option<usize> {
        self.file_index
    }

    pub fn part(&self) -> Option<usize> {
        self.part
    }

    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    pub fn set_step_id(&mut self, step_id: &str) -> Result<()> {
        if !is_step_id_valid(step_id) {
            return Err(StepflowError::InvalidStepId {
                id: step_id.to_string(),
                reason: "use lowercase letters and digits only".into(),
            });
        }
        self.step_id = step_id.to_string();
        Ok(())
    }

    pub fn set_port_name(&mut self, port_name: &str) -> Result<()> {
        if !is_port_name_valid(port_name) {
            return Err(StepflowError::InvalidPortName {
                name: port_name.to_string(),
                reason: "use lowercase letters and digits only".into(),
            });
        }
        self.port_name = port_name.to_string();
        Ok(())
    }

    pub fn set_data_name(&mut self, data_name: &str) -> Result<()> {
        if !is_data_name_valid(data_name) {
            return Err(StepflowError::InvalidDataName {
                name: data_name.to_string(),
                reason: "use letters and digits only".into(),
            });
        }
        self.data_name = data_name.to_string();
        Ok(())
    }

    pub fn set_format(&mut self, format: Arc<DataFormat>) {
        self.format = format;
    }

    /// Negative values clear the index
    pub fn set_file_index(&mut self, index: i64) {
        self.file_index = usize::try_from(index).ok();
    }

    /// Negative values clear the part
    pub fn set_part(&mut self, part: i64) {
        self.part = usize::try_from(part).ok();
    }

    pub fn set_compression(&mut self, compression: CompressionType) {
        self.compression = compression;
    }

    pub fn with_file_index(mut self, index: Option<usize>) -> Self {
        self.file_index = index;
        self
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}

impl fmt::Display for FileNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filename())
    }
}

/// `file12` -> 12 for tag `file`
fn numbered_field(field: &str, tag: &str) -> Option<usize> {
    let digits = field.strip_prefix(tag)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::formats;

    fn registry() -> DataFormatRegistry {
        DataFormatRegistry::builtin()
    }

    fn parse(name: &str) -> FileNaming {
        FileNaming::parse(name, &registry()).unwrap()
    }

    // ═══════════════════════════════════════════════════════════════
    // Parsing
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn parse_step_port_and_data() {
        let naming = parse("filterreads_output_reads_s1_file0_part1.fq.bz2");
        assert_eq!(naming.step_id(), "filterreads");
        assert_eq!(naming.port_name(), "output");
        assert_eq!(naming.data_name(), "s1");
        assert_eq!(naming.format().name(), formats::READS_FASTQ);

        let naming = parse("genericindexgenerator_output2_bowtieindex_genome.zip");
        assert_eq!(naming.step_id(), "genericindexgenerator");
        assert_eq!(naming.port_name(), "output2");
        assert_eq!(naming.data_name(), "genome");
        assert_eq!(naming.format().name(), formats::BOWTIE_INDEX_ZIP);
    }

    #[test]
    fn parse_file_index_and_part() {
        assert_eq!(parse("filterreads_output_reads_s1_file1.fq").file_index(), Some(1));
        assert_eq!(parse("filterreads_output_reads_s1_file1.fq").part(), None);
        assert_eq!(
            parse("filterreads_output_reads_s2_file1_part4.fq.gz").file_index(),
            Some(1)
        );
        assert_eq!(
            parse("filterreads_output_reads_s2_file1_part4.fq.gz").part(),
            Some(4)
        );
        assert_eq!(
            parse("genericindexgenerator_output_bowtieindex_genome.zip").file_index(),
            None
        );
        assert_eq!(
            parse("genericindexgenerator_output_bowtieindex_genome_part1.zip.bz2").part(),
            Some(1)
        );
    }

    #[test]
    fn parse_compression() {
        assert_eq!(
            parse("filterreads_output_reads_s1_file0.fq").compression(),
            CompressionType::None
        );
        assert_eq!(
            parse("filterreads_output_reads_s1_file0.fq.bz2").compression(),
            CompressionType::Bzip2
        );
        assert_eq!(
            parse("genericindexgenerator_output_bowtieindex_genome.zip.gz").compression(),
            CompressionType::Gzip
        );
    }

    #[test]
    fn parse_ignores_directories() {
        let naming = parse("/work/out/mapreads_output_alignments_s1.sam");
        assert_eq!(naming.filename(), "mapreads_output_alignments_s1.sam");
    }

    #[test]
    fn filename_round_trips() {
        for name in [
            "filterreads_output_reads_s1_file0.fq",
            "filterreads_output_reads_s1_file0.fq.bz2",
            "filterreads_output_reads_s1_file0_part1.fq.bz2",
            "genericindexgenerator_output_bowtieindex_genome.zip",
            "genericindexgenerator_output_bowtieindex_genome_part5.zip.gz",
        ] {
            assert_eq!(parse(name).filename(), name);
        }
    }

    #[test]
    fn filename_validity() {
        let registry = registry();
        assert!(is_filename_valid("filterreads_output_reads_s1_file0_part1.fq", &registry));
        assert!(is_filename_valid("genomedescgenerator_output_genomedesc_genome.txt", &registry));
        assert!(is_filename_valid("mapreads_output_alignments_s1.sam", &registry));
        assert!(is_filename_valid("expression_output_expression_s1.tsv", &registry));

        assert!(!is_filename_valid("toto.txt", &registry));
        // multi-file format without index
        assert!(!is_filename_valid("filterreads_output_reads_s1.fq", &registry));
        // single-file format with index
        assert!(!is_filename_valid("mapreads_output_alignments_s1_file0.sam", &registry));
    }

    // ═══════════════════════════════════════════════════════════════
    // Setters
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn setters_validate_names() {
        let mut naming = parse("filterreads_output_reads_s2_file0_part1.fq");
        naming.set_step_id("blabla").unwrap();
        assert_eq!(naming.step_id(), "blabla");
        assert!(naming.set_step_id(" blabla ").is_err());
        assert!(naming.set_port_name("out_put").is_err());
        assert!(naming.set_data_name("s-2").is_err());
        assert_eq!(naming.step_id(), "blabla");
    }

    #[test]
    fn negative_index_and_part_clear() {
        let mut naming = parse("filterreads_output_reads_s2_file0_part1.fq");
        naming.set_file_index(1);
        assert_eq!(naming.file_index(), Some(1));
        naming.set_file_index(-2);
        assert_eq!(naming.file_index(), None);
        naming.set_part(0);
        assert_eq!(naming.part(), Some(0));
        naming.set_part(-1);
        assert_eq!(naming.part(), None);
    }

    #[test]
    fn set_format_and_compression() {
        let registry = registry();
        let mut naming = parse("filterreads_output_reads_s2_file0_part1.fq");
        naming.set_format(registry.lookup(formats::READS_TFQ).unwrap());
        naming.set_compression(CompressionType::Gzip);
        assert_eq!(naming.filename(), "filterreads_output_tfq_s2_file0_part1.tfq.gz");
    }

    // ═══════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn prefix_middle_suffix() {
        assert_eq!(file_prefix("filterreads", "output", "reads"), "filterreads_output_reads_");
        assert_eq!(file_middle("s1", None, None), "s1");
        assert_eq!(file_middle("s1", Some(0), None), "s1_file0");
        assert_eq!(file_middle("s1", None, Some(1)), "s1_part1");
        assert_eq!(file_middle("s1", Some(1), Some(2)), "s1_file1_part2");
        assert_eq!(file_suffix(".fq", ""), ".fq");
        assert_eq!(file_suffix(".fq", ".bz2"), ".fq.bz2");
    }

    #[test]
    fn name_validity() {
        for valid in ["data01", "data", "01", "0", "d"] {
            assert!(is_step_id_valid(valid));
            assert!(is_port_name_valid(valid));
            assert!(is_format_prefix_valid(valid));
            assert!(is_data_name_valid(valid));
        }
        for invalid in ["", " ", "data01 ", " data01", "data01!", "data01/", "data-01", "data_01"] {
            assert!(!is_step_id_valid(invalid));
            assert!(!is_port_name_valid(invalid));
            assert!(!is_format_prefix_valid(invalid));
            assert!(!is_data_name_valid(invalid));
        }
        assert!(is_data_name_valid("sampleA"));
        assert!(!is_port_name_valid("sampleA"));
    }

    #[test]
    fn valid_name_conversion() {
        assert_eq!(to_valid_name("sample_1-a b"), "sample1ab");
        assert_eq!(to_valid_name("WT.rep1"), "WTrep1");
    }
}
