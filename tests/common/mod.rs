//! Test modules and fixtures shared by the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use stepflow::format::formats;
use stepflow::{
    ConfigurationContext, Data, DataFormatRegistry, InputPorts, Module, ModuleRegistry,
    OutputPorts, Parameter, Settings, Step, TaskContext, TaskLogger, TaskStatus, Version,
};
use tempfile::TempDir;

// ============================================================================
// TEST MODULES
// ============================================================================

/// Copies the FASTQ files of `in` to `out`, keeping the data name
#[derive(Default)]
pub struct CopyModule {
    inputs: InputPorts,
    outputs: OutputPorts,
    reuse: bool,
    delay: Duration,
}

impl Module for CopyModule {
    fn name(&self) -> &str {
        "copy"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn input_ports(&self) -> &InputPorts {
        &self.inputs
    }

    fn output_ports(&self) -> &OutputPorts {
        &self.outputs
    }

    fn configure(
        &mut self,
        ctx: &ConfigurationContext<'_>,
        params: &[Parameter],
    ) -> stepflow::Result<()> {
        for param in params {
            match param.name() {
                "reuse" => self.reuse = param.as_bool()?,
                "delay" => {
                    let ms = param.as_int()?;
                    if ms < 0 {
                        return Err(param.invalid("delay must be positive"));
                    }
                    self.delay = Duration::from_millis(ms as u64);
                }
                _ => return Err(param.unknown(self.name())),
            }
        }

        let fastq = ctx.formats.lookup(formats::READS_FASTQ)?;
        let mut inputs = InputPorts::builder();
        inputs.add_port("in", Arc::clone(&fastq))?;
        let mut outputs = OutputPorts::builder();
        outputs.add_port("out", fastq)?;
        self.inputs = inputs.build();
        self.outputs = outputs.build();
        Ok(())
    }

    fn execute(
        &self,
        context: &TaskContext,
        status: &mut TaskStatus,
        log: &TaskLogger,
    ) -> anyhow::Result<()> {
        let input = context.input_data("in")?;
        std::thread::sleep(self.delay);

        let mut output = context.output_data_from("out", input)?;
        for file in input.files() {
            let dest = output.new_file()?;
            fs::copy(file.path(), dest.path())?;
            log.info(&format!("copied {} to {}", file, dest));
            status.increment_counter("files", 1);
        }
        status.create_result()?;
        Ok(())
    }

    fn reuse_instance(&self) -> bool {
        self.reuse
    }
}

/// One SAM output per port name given in the `ports` parameter
#[derive(Default)]
pub struct FanOutModule {
    outputs: OutputPorts,
}

impl Module for FanOutModule {
    fn name(&self) -> &str {
        "fanout"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn output_ports(&self) -> &OutputPorts {
        &self.outputs
    }

    fn configure(
        &mut self,
        ctx: &ConfigurationContext<'_>,
        params: &[Parameter],
    ) -> stepflow::Result<()> {
        let sam = ctx.formats.lookup(formats::MAPPER_RESULTS_SAM)?;
        let mut outputs = OutputPorts::builder();
        for param in params {
            if param.name() != "ports" {
                return Err(param.unknown(self.name()));
            }
            for port in param.value().split(',') {
                outputs.add_port(port.trim(), Arc::clone(&sam))?;
            }
        }
        self.outputs = outputs.build();
        Ok(())
    }

    fn execute(
        &self,
        context: &TaskContext,
        status: &mut TaskStatus,
        _log: &TaskLogger,
    ) -> anyhow::Result<()> {
        for port in self.outputs.iter() {
            let mut output = context.output_data(port.name(), &format!("{}data", port.name()))?;
            let file = output.new_file()?;
            fs::write(file.path(), format!("@HD\t{}\n", port.name()))?;
        }
        status.create_result()?;
        Ok(())
    }
}

/// Opens its SAM output twice, and renames the context while running
#[derive(Default)]
pub struct ReopenModule {
    outputs: OutputPorts,
}

impl Module for ReopenModule {
    fn name(&self) -> &str {
        "reopen"
    }

    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn output_ports(&self) -> &OutputPorts {
        &self.outputs
    }

    fn configure(
        &mut self,
        ctx: &ConfigurationContext<'_>,
        params: &[Parameter],
    ) -> stepflow::Result<()> {
        if let Some(param) = params.first() {
            return Err(param.unknown(self.name()));
        }
        let mut outputs = OutputPorts::builder();
        outputs.add_port("out", ctx.formats.lookup(formats::MAPPER_RESULTS_SAM)?)?;
        self.outputs = outputs.build();
        Ok(())
    }

    fn execute(
        &self,
        context: &TaskContext,
        _status: &mut TaskStatus,
        _log: &TaskLogger,
    ) -> anyhow::Result<()> {
        context.set_name("renamed");
        let _first = context.output_data("out", "s1")?;
        let _second = context.output_data("out", "s1")?;
        bail!("second handle was granted")
    }
}

/// Misbehaving module, selected by the `mode` parameter
#[derive(Default)]
pub struct FaultyModule {
    mode: String,
}

impl Module for FaultyModule {
    fn name(&self) -> &str {
        "faulty"
    }

    fn version(&self) -> Version {
        Version::new(0, 1, 0)
    }

    fn configure(
        &mut self,
        _ctx: &ConfigurationContext<'_>,
        params: &[Parameter],
    ) -> stepflow::Result<()> {
        for param in params {
            match (param.name(), param.lowercase_value().as_str()) {
                ("mode", "ok" | "error" | "panic" | "silent" | "sealed-failure" | "wait-cancel") => {
                    self.mode = param.lowercase_value()
                }
                ("mode", _) => return Err(param.invalid("unknown mode")),
                _ => return Err(param.unknown(self.name())),
            }
        }
        Ok(())
    }

    fn execute(
        &self,
        _context: &TaskContext,
        status: &mut TaskStatus,
        _log: &TaskLogger,
    ) -> anyhow::Result<()> {
        match self.mode.as_str() {
            "error" => Err(anyhow!("disk full").context("cannot write alignments")),
            "panic" => panic!("index out of range"),
            "silent" => Ok(()),
            "sealed-failure" => {
                status.create_error_result_with_message(&anyhow!("exit code 3"), "mapper failed")?;
                Ok(())
            }
            "wait-cancel" => {
                for _ in 0..500 {
                    if status.is_cancelled() {
                        bail!("stopped on request");
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                bail!("never cancelled")
            }
            _ => {
                status.create_result()?;
                Ok(())
            }
        }
    }

    fn create_log_files(&self) -> bool {
        false
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub fn formats() -> Arc<DataFormatRegistry> {
    Arc::new(DataFormatRegistry::builtin())
}

pub fn settings() -> Arc<Settings> {
    Arc::new(Settings::default())
}

pub fn registry() -> ModuleRegistry {
    let registry = ModuleRegistry::new();
    registry.register("copy", || Box::new(CopyModule::default()));
    registry.register("fanout", || Box::new(FanOutModule::default()));
    registry.register("faulty", || Box::new(FaultyModule::default()));
    registry.register("reopen", || Box::new(ReopenModule::default()));
    registry
}

/// Working, output and task directories under one temp dir
pub struct Dirs {
    _root: TempDir,
    pub input: PathBuf,
    pub work: PathBuf,
    pub out: PathBuf,
    pub tasks: PathBuf,
}

impl Dirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let make = |name: &str| {
            let dir = root.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            dir
        };
        Self {
            input: make("input"),
            work: make("work"),
            out: make("out"),
            tasks: make("tasks"),
            _root: root,
        }
    }
}

pub fn build_step(dirs: &Dirs, id: &str, module: &str, params: &[(&str, &str)]) -> Step {
    let mut builder = Step::builder(id, module)
        .working_dir(&dirs.work)
        .output_dir(&dirs.out)
        .task_dir(&dirs.tasks);
    for (name, value) in params {
        builder = builder.parameter(name, value);
    }
    builder.build(&registry(), settings(), formats()).unwrap()
}

/// FASTQ data named `name` with `files` files written in `dir`
pub fn fastq_data(dir: &Path, name: &str, files: usize) -> Data {
    let fastq = formats().lookup(formats::READS_FASTQ).unwrap();
    let mut data = Data::named(name, fastq).unwrap();
    for i in 1..=files {
        let path = dir.join(format!("{name}_{i}.fq"));
        fs::write(&path, format!("@{name}/{i}\nACGT\n+\nIIII\n")).unwrap();
        data.add_file(path).unwrap();
    }
    data
}

pub fn copy_context(step: &Step, data: Data) -> Arc<TaskContext> {
    Arc::new(
        TaskContext::builder(Arc::clone(step.info()), Arc::clone(step.settings()))
            .input("in", data)
            .unwrap()
            .build()
            .unwrap(),
    )
}
