//! Context persistence
//!
//! A context travels to another process as one JSON document bundling the
//! context with the settings it was created under:
//!
//! ```json
//! { "format_version": 1, "engine_version": "0.1.0",
//!   "context": { "id": 12, "step": {...}, "inputs": [...], "outputs": [...] },
//!   "settings": {...} }
//! ```
//!
//! The format version is checked before the rest of the document is decoded.
//! Run and token guards are not persisted: a restored context is fresh.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ContextId, TaskContext};
use crate::data::Data;
use crate::error::{Result, StepflowError};
use crate::settings::Settings;
use crate::step::StepInfo;

/// Version of the persisted context layout
pub const STREAM_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    format_version: u32,
    engine_version: &'a str,
    context: ContextRecord<'a>,
    settings: &'a Settings,
}

#[derive(Serialize)]
struct ContextRecord<'a> {
    id: ContextId,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    step: &'a StepInfo,
    inputs: &'a [Data],
    outputs: Vec<Data>,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    context: ContextRecordOwned,
    settings: Settings,
}

#[derive(Deserialize)]
struct ContextRecordOwned {
    id: ContextId,
    #[serde(default)]
    name: Option<String>,
    step: StepInfo,
    inputs: Vec<Data>,
    outputs: Vec<Data>,
}

impl TaskContext {
    fn envelope(&self) -> Result<EnvelopeOut<'_>> {
        let outputs = (0..self.outputs.len())
            .map(|index| self.lock_output(index).map(|data| data.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(EnvelopeOut {
            format_version: STREAM_FORMAT_VERSION,
            engine_version: env!("CARGO_PKG_VERSION"),
            context: ContextRecord {
                id: self.id,
                name: self.name.read().clone(),
                step: &self.step,
                inputs: &self.inputs,
                outputs,
            },
            settings: &self.settings,
        })
    }

    /// Write the context and its settings to `writer`
    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.envelope()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.envelope()?)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path.as_ref())?;
        self.to_writer(std::io::BufWriter::new(file))?;
        debug!(context_id = %self.id, path = %path.as_ref().display(), "context saved");
        Ok(())
    }

    /// Read a context written by [`TaskContext::to_writer`]
    ///
    /// The restored context carries the settings it was saved with.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_reader(reader)?;
        Self::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path.as_ref())?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        check_format_version(&value)?;
        let envelope: EnvelopeIn = serde_json::from_value(value)?;
        let record = envelope.context;

        if record.inputs.len() != record.step.inputs().len()
            || record.outputs.len() != record.step.outputs().len()
        {
            return Err(StepflowError::MissingBinding {
                step_id: record.step.id().to_string(),
                direction: "input/output",
                port: "*".into(),
            });
        }

        record.id.reserve()?;
        Ok(TaskContext {
            id: record.id,
            step: Arc::new(record.step),
            settings: Arc::new(envelope.settings),
            name: RwLock::new(record.name),
            default_name: OnceCell::new(),
            inputs: record.inputs,
            outputs: record.outputs.into_iter().map(Mutex::new).collect(),
            ran: AtomicBool::new(false),
            tokens_sent: AtomicBool::new(false),
        })
    }
}

fn check_format_version(value: &serde_json::Value) -> Result<()> {
    match value.get("format_version") {
        Some(v) if v.as_u64() == Some(u64::from(STREAM_FORMAT_VERSION)) => Ok(()),
        Some(v) => Err(StepflowError::VersionMismatch {
            expected: STREAM_FORMAT_VERSION,
            found: v.to_string(),
        }),
        None => Err(StepflowError::VersionMismatch {
            expected: STREAM_FORMAT_VERSION,
            found: "none".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{formats, DataFormatRegistry};
    use crate::port::{InputPorts, OutputPorts};

    fn context() -> TaskContext {
        let registry = DataFormatRegistry::builtin();
        let fastq = registry.lookup(formats::READS_FASTQ).unwrap();
        let mut inputs = InputPorts::builder();
        inputs.add_port("input", Arc::clone(&fastq)).unwrap();
        let mut outputs = OutputPorts::builder();
        outputs.add_port("output", Arc::clone(&fastq)).unwrap();
        let step = StepInfo::new("filter", "filterreads", inputs.build(), outputs.build()).unwrap();

        let mut settings = Settings::default();
        settings.set("threads", "8");

        let mut data = Data::named("s1", fastq).unwrap();
        data.add_file("/in/s1_1.fq").unwrap();
        TaskContext::builder(Arc::new(step), Arc::new(settings))
            .input("input", data)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn round_trip_keeps_bindings_and_settings() {
        let ctx = context();
        let json = ctx.to_json().unwrap();
        let back = TaskContext::from_json(&json).unwrap();

        assert_eq!(back.id(), ctx.id());
        assert_eq!(back.name(), "s1");
        assert_eq!(back.input_data("input").unwrap().files().len(), 1);
        assert_eq!(back.settings().get("threads"), Some("8"));
        assert_eq!(back.step().as_ref(), ctx.step().as_ref());
        assert!(!back.has_run());
    }

    #[test]
    fn restored_ids_stay_unique() {
        let ctx = context();
        let back = TaskContext::from_json(&ctx.to_json().unwrap()).unwrap();
        let fresh = context();
        assert!(fresh.id() > back.id());
    }

    #[test]
    fn version_mismatch() {
        let ctx = context();
        let mut value: serde_json::Value = serde_json::from_str(&ctx.to_json().unwrap()).unwrap();
        value["format_version"] = serde_json::json!(99);
        let err = TaskContext::from_json(&value.to_string()).unwrap_err();
        assert_eq!(err.code(), "SF-040");

        let err = TaskContext::from_json("{}").unwrap_err();
        assert!(matches!(err, StepflowError::VersionMismatch { .. }));
    }

    #[test]
    fn last_possible_id_is_rejected() {
        let ctx = context();
        let mut value: serde_json::Value = serde_json::from_str(&ctx.to_json().unwrap()).unwrap();
        value["context"]["id"] = serde_json::json!(u64::MAX);
        let err = TaskContext::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, StepflowError::InvalidContextId { id } if id == u64::MAX));
        assert_eq!(err.code(), "SF-043");
    }

    #[test]
    fn open_output_handle_blocks_saving() {
        let ctx = context();
        let handle = ctx.output_data("output", "s1").unwrap();
        assert_eq!(ctx.to_json().unwrap_err().code(), "SF-037");
        drop(handle);
        assert!(ctx.to_json().unwrap().contains("\"s1\""));
    }

    #[test]
    fn garbage_is_a_serialization_error() {
        let err = TaskContext::from_json("not json").unwrap_err();
        assert_eq!(err.code(), "SF-041");
    }
}
