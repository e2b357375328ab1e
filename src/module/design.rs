//! Design module - the bootstrap step of a workflow
//!
//! Turns an already-parsed design (design-level metadata plus samples) into
//! output data. One output port is declared per registered format whose
//! design or sample metadata key appears in the design. Metadata values are
//! comma-separated file paths.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use super::{ConfigurationContext, Module, ParallelizationMode, Parameter, Version};
use crate::context::TaskContext;
use crate::data::{naming, Data, DataFile, DataMetadata};
use crate::error::Result;
use crate::format::CompressionType;
use crate::port::{OutputPort, OutputPorts};
use crate::task::{TaskLogger, TaskStatus};

pub const DESIGN_MODULE_NAME: &str = "design";

/// One sample of a design
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    #[serde(default)]
    pub metadata: DataMetadata,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: DataMetadata::default(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.metadata.set(key, value);
        self
    }
}

/// Parsed experiment design
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Design {
    #[serde(default)]
    pub metadata: DataMetadata,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.metadata.set(key, value);
        self
    }

    pub fn with_sample(mut self, sample: Sample) -> Self {
        self.samples.push(sample);
        self
    }

    /// Normalized design metadata keys
    pub fn metadata_keys(&self) -> BTreeSet<String> {
        self.metadata.keys().map(normalize_key).collect()
    }

    /// Normalized metadata keys found in any sample
    pub fn sample_metadata_keys(&self) -> BTreeSet<String> {
        self.samples
            .iter()
            .flat_map(|s| s.metadata.keys().map(normalize_key))
            .collect()
    }
}

/// Bootstrap module feeding design files into the workflow
#[derive(Debug)]
pub struct DesignModule {
    design: Arc<Design>,
    outputs: OutputPorts,
    design_ports: Vec<String>,
    sample_ports: Vec<String>,
}

impl DesignModule {
    pub fn new(design: Arc<Design>) -> Self {
        Self {
            design,
            outputs: OutputPorts::empty(),
            design_ports: Vec::new(),
            sample_ports: Vec::new(),
        }
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    /// Port names fed from design-level metadata
    pub fn design_ports(&self) -> &[String] {
        &self.design_ports
    }

    /// Port names fed from sample metadata
    pub fn sample_ports(&self) -> &[String] {
        &self.sample_ports
    }

    fn port(&self, name: &str) -> anyhow::Result<&OutputPort> {
        match self.outputs.get(name) {
            Some(port) => Ok(port),
            None => bail!("design port '{name}' is not declared"),
        }
    }
}

impl Module for DesignModule {
    fn name(&self) -> &str {
        DESIGN_MODULE_NAME
    }

    fn description(&self) -> &str {
        "Feed the files of the design into the workflow"
    }

    fn version(&self) -> Version {
        Version::runtime()
    }

    fn output_ports(&self) -> &OutputPorts {
        &self.outputs
    }

    fn configure(&mut self, ctx: &ConfigurationContext<'_>, params: &[Parameter]) -> Result<()> {
        if let Some(param) = params.first() {
            return Err(param.unknown(DESIGN_MODULE_NAME));
        }

        let design_keys = self.design.metadata_keys();
        let sample_keys = self.design.sample_metadata_keys();
        let mut builder = OutputPorts::builder();

        for format in ctx.formats.all() {
            if let Some(key) = format.design_metadata_key() {
                if design_keys.contains(key) {
                    let compression =
                        first_compression(lookup(&self.design.metadata, key).into_iter());
                    builder.add_port_with(
                        key,
                        Arc::clone(format),
                        format.is_list_capable(),
                        compression,
                    )?;
                    self.design_ports.push(key.to_string());
                }
            }
            if let Some(key) = format.sample_metadata_key() {
                if sample_keys.contains(key) {
                    let values = self.design.samples.iter().filter_map(|s| lookup(&s.metadata, key));
                    builder.add_port_with(
                        key,
                        Arc::clone(format),
                        format.is_list_capable(),
                        first_compression(values),
                    )?;
                    self.sample_ports.push(key.to_string());
                }
            }
        }

        self.outputs = builder.build();
        Ok(())
    }

    fn execute(
        &self,
        context: &TaskContext,
        status: &mut TaskStatus,
        log: &TaskLogger,
    ) -> anyhow::Result<()> {
        let mut seen: HashSet<DataFile> = HashSet::new();

        for name in &self.design_ports {
            let port = self.port(name)?;
            let files = split_files(lookup(&self.design.metadata, name));
            let Some(first) = files.first() else {
                continue;
            };
            if !seen.insert(first.clone()) {
                continue;
            }

            let mut output = context.output_data(port.name(), port.name())?;
            if port.is_list() {
                fill(output.add_element(port.name())?, files)?;
            } else {
                fill(&mut output, files)?;
            }
        }

        for sample in &self.design.samples {
            for name in &self.sample_ports {
                let port = self.port(name)?;
                let files = split_files(lookup(&sample.metadata, name));
                let Some(first) = files.first() else {
                    continue;
                };
                if !seen.insert(first.clone()) {
                    continue;
                }

                let mut output = context.output_data(port.name(), port.name())?;
                if port.is_list() {
                    let data_name = naming::to_valid_name(&sample.name);
                    if data_name.is_empty() {
                        bail!("Sample name '{}' has no letter or digit", sample.name);
                    }
                    if output.element(&data_name).is_some() {
                        bail!(
                            "The design contains two or more samples with the same name after renaming: {} (original sample name: {})",
                            data_name,
                            sample.name
                        );
                    }
                    let element = output.add_element(&data_name)?;
                    if let Some(metadata) = element.metadata_mut() {
                        metadata.merge(&sample.metadata);
                    }
                    fill(element, files)?;
                } else {
                    fill(&mut output, files)?;
                }
            }
        }

        log.info(&format!(
            "design: {} sample(s), {} file set(s)",
            self.design.samples.len(),
            seen.len()
        ));
        status.set_counter("samples", self.design.samples.len() as u64);
        status.create_result()?;
        Ok(())
    }

    fn parallelization_mode(&self) -> ParallelizationMode {
        ParallelizationMode::NotNeeded
    }

    fn reuse_instance(&self) -> bool {
        true
    }

    fn create_log_files(&self) -> bool {
        false
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Metadata value whose normalized key is `key`
fn lookup<'a>(metadata: &'a DataMetadata, key: &str) -> Option<&'a str> {
    metadata
        .iter()
        .find(|(k, _)| normalize_key(k) == key)
        .map(|(_, v)| v)
}

fn split_files(value: Option<&str>) -> Vec<DataFile> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(DataFile::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Compression of the first compressed file among metadata values
fn first_compression<'a>(values: impl Iterator<Item = &'a str>) -> CompressionType {
    values
        .flat_map(|v| split_files(Some(v)))
        .map(|f| f.compression())
        .find(|c| c.is_compressed())
        .unwrap_or_default()
}

/// Multi-file formats take every file, single-file formats the first one
fn fill(data: &mut Data, mut files: Vec<DataFile>) -> anyhow::Result<()> {
    if !data.format().is_multi_file() {
        files.truncate(1);
    }
    data.set_files(files)?;
    Ok(())
}
