//! Write handle on an output port's data

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::MutexGuard;

use super::TaskContext;
use crate::data::{Data, DataFile, FileNaming};
use crate::error::{Result, StepflowError};
use crate::port::OutputPort;

/// Exclusive access to the data of one output port
///
/// Dereferences to [`Data`]; also allocates conventionally named files in
/// the step working directory.
#[derive(Debug)]
pub struct OutputData<'a> {
    data: MutexGuard<'a, Data>,
    context: &'a TaskContext,
    port: &'a OutputPort,
}

impl<'a> OutputData<'a> {
    pub(super) fn new(
        data: MutexGuard<'a, Data>,
        context: &'a TaskContext,
        port: &'a OutputPort,
    ) -> Self {
        Self {
            data,
            context,
            port,
        }
    }

    pub fn port(&self) -> &OutputPort {
        self.port
    }

    /// Allocate the next file of a scalar output
    pub fn new_file(&mut self) -> Result<DataFile> {
        if self.data.is_list() {
            return Err(StepflowError::ListHoldsNoFiles {
                data: self.data.name().to_string(),
            });
        }
        let file = next_file(self.context, self.port, &self.data)?;
        self.data.add_file(file.clone())?;
        Ok(file)
    }

    /// Allocate the next file of list element `name`, creating the element
    /// if needed
    pub fn new_element_file(&mut self, name: &str) -> Result<DataFile> {
        if !self.data.is_list() {
            return Err(StepflowError::NotAList {
                data: self.data.name().to_string(),
            });
        }
        if self.data.element(name).is_none() {
            self.data.add_element(name)?;
        }
        let element = self
            .data
            .element_mut(name)
            .ok_or_else(|| StepflowError::NotAList {
                data: name.to_string(),
            })?;
        let file = next_file(self.context, self.port, element)?;
        element.add_file(file.clone())?;
        Ok(file)
    }
}

/// Path of the next file of `data`, named after step, port and data
fn next_file(context: &TaskContext, port: &OutputPort, data: &Data) -> Result<DataFile> {
    let format = data.format();
    let count = data.files().len();
    if count >= format.max_files() {
        return Err(StepflowError::TooManyFiles {
            data: data.name().to_string(),
            format: format.name().to_string(),
            max: format.max_files(),
        });
    }

    let naming = FileNaming::new(
        context.step_id(),
        port.name(),
        Arc::clone(format),
        data.name(),
    )?
    .with_file_index(format.is_multi_file().then_some(count))
    .with_compression(port.compression());

    let path: PathBuf = context.step().working_dir().join(naming.filename());
    Ok(DataFile::new(path))
}

impl Deref for OutputData<'_> {
    type Target = Data;

    fn deref(&self) -> &Data {
        &self.data
    }
}

impl DerefMut for OutputData<'_> {
    fn deref_mut(&mut self) -> &mut Data {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use crate::context::TaskContext;
    use crate::format::{formats, CompressionType, DataFormatRegistry};
    use crate::port::{InputPorts, OutputPorts};
    use crate::settings::Settings;
    use crate::step::StepInfo;

    fn context() -> TaskContext {
        let registry = DataFormatRegistry::builtin();
        let mut outputs = OutputPorts::builder();
        outputs
            .add_port_with(
                "output",
                registry.lookup(formats::READS_FASTQ).unwrap(),
                false,
                CompressionType::Gzip,
            )
            .unwrap()
            .add_list_port("alignments", registry.lookup(formats::MAPPER_RESULTS_SAM).unwrap())
            .unwrap();
        let step = StepInfo::new("filterreads", "filter", InputPorts::empty(), outputs.build())
            .unwrap()
            .with_dir("/work");
        TaskContext::builder(Arc::new(step), Arc::new(Settings::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn new_files_follow_naming_convention() {
        let ctx = context();
        let mut out = ctx.output_data("output", "s1").unwrap();
        let first = out.new_file().unwrap();
        let second = out.new_file().unwrap();
        assert_eq!(
            first.path(),
            Path::new("/work/filterreads_output_reads_s1_file0.fq.gz")
        );
        assert_eq!(second.name(), "filterreads_output_reads_s1_file1.fq.gz");
        assert_eq!(out.files().len(), 2);

        let err = out.new_file().unwrap_err();
        assert_eq!(err.code(), "SF-020");
    }

    #[test]
    fn new_element_files() {
        let ctx = context();
        let mut out = ctx.output_data("alignments", "").unwrap();
        let file = out.new_element_file("s1").unwrap();
        assert_eq!(file.name(), "filterreads_alignments_alignments_s1.sam");
        out.new_element_file("s2").unwrap();
        assert_eq!(out.elements().len(), 2);
        assert!(out.new_element_file("s1").is_err());
        assert!(out.new_file().is_err());
    }
}
