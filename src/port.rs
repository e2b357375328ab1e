//! Port model
//!
//! Ports are the typed slots a module declares once configured. Input and
//! output ports live in separate sets ([`InputPorts`], [`OutputPorts`]), each
//! its own namespace, and are built through a [`PortSetBuilder`] that rejects
//! invalid or duplicate names.
//!
//! | Lookup | Zero matches | One match | Several matches |
//! |--------|--------------|-----------|-----------------|
//! | by name | `None` | port | impossible |
//! | by format | `PortFormatNotFound` | port | `AmbiguousPortFormat` |
//!
//! Each port carries its index in the set; task contexts store bound data in
//! an arena indexed the same way.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::naming;
use crate::error::{Result, StepflowError};
use crate::format::{CompressionType, DataFormat};

/// Direction marker of a port set
pub trait Direction: Copy + fmt::Debug + Send + Sync + 'static {
    const NAME: &'static str;
}

/// Input direction marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum In {}

/// Output direction marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Out {}

impl Direction for In {
    const NAME: &'static str = "input";
}

impl Direction for Out {
    const NAME: &'static str = "output";
}

/// Validated port name (`[a-z0-9]+`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortName(String);

impl PortName {
    pub fn new(name: &str) -> Result<Self> {
        if !naming::is_port_name_valid(name) {
            let reason = if name.is_empty() {
                "name is empty"
            } else {
                "use lowercase letters and digits only"
            };
            return Err(StepflowError::InvalidPortName {
                name: name.to_string(),
                reason: reason.into(),
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PortName {
    type Error = StepflowError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<PortName> for String {
    fn from(name: PortName) -> Self {
        name.0
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One declared port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port<D: Direction> {
    index: usize,
    name: PortName,
    format: Arc<DataFormat>,
    list: bool,
    compression: CompressionType,
    #[serde(skip)]
    direction: PhantomData<D>,
}

pub type InputPort = Port<In>;
pub type OutputPort = Port<Out>;

impl<D: Direction> Port<D> {
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn port_name(&self) -> &PortName {
        &self.name
    }

    pub fn format(&self) -> &Arc<DataFormat> {
        &self.format
    }

    /// Whether the port carries a list of data
    pub fn is_list(&self) -> bool {
        self.list
    }

    /// Expected compression of the files
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Position in its port set
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn direction(&self) -> &'static str {
        D::NAME
    }
}

impl<D: Direction> fmt::Display for Port<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.format)?;
        if self.list {
            f.write_str(", list")?;
        }
        if self.compression.is_compressed() {
            write!(f, ", {}", self.compression)?;
        }
        f.write_str(")")
    }
}

/// Immutable set of ports of one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet<D: Direction> {
    ports: Vec<Port<D>>,
}

pub type InputPorts = PortSet<In>;
pub type OutputPorts = PortSet<Out>;

impl<D: Direction> Default for PortSet<D> {
    fn default() -> Self {
        Self { ports: Vec::new() }
    }
}

impl<D: Direction> PortSet<D> {
    /// Set with no port
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> PortSetBuilder<D> {
        PortSetBuilder { ports: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&Port<D>> {
        self.ports.iter().find(|p| p.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Port at an arena index
    pub fn at(&self, index: usize) -> Option<&Port<D>> {
        self.ports.get(index)
    }

    /// The single port advertising `format`
    pub fn by_format(&self, step_id: &str, format: &DataFormat) -> Result<&Port<D>> {
        let candidates = self.with_format(format);
        match candidates.as_slice() {
            [port] => Ok(port),
            [] => Err(StepflowError::PortFormatNotFound {
                step_id: step_id.to_string(),
                direction: D::NAME,
                format: format.name().to_string(),
            }),
            many => Err(StepflowError::AmbiguousPortFormat {
                step_id: step_id.to_string(),
                direction: D::NAME,
                format: format.name().to_string(),
                candidates: many
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// All ports advertising `format`
    pub fn with_format(&self, format: &DataFormat) -> Vec<&Port<D>> {
        self.ports
            .iter()
            .filter(|p| p.format.as_ref() == format)
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Port<D>> {
        self.ports.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.ports.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl<'a, D: Direction> IntoIterator for &'a PortSet<D> {
    type Item = &'a Port<D>;
    type IntoIter = std::slice::Iter<'a, Port<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.ports.iter()
    }
}

/// Builder for [`PortSet`]
#[derive(Debug)]
pub struct PortSetBuilder<D: Direction> {
    ports: Vec<Port<D>>,
}

impl<D: Direction> PortSetBuilder<D> {
    /// Add a scalar, uncompressed port
    pub fn add_port(&mut self, name: &str, format: Arc<DataFormat>) -> Result<&mut Self> {
        self.add_port_with(name, format, false, CompressionType::None)
    }

    /// Add an uncompressed list port
    pub fn add_list_port(&mut self, name: &str, format: Arc<DataFormat>) -> Result<&mut Self> {
        self.add_port_with(name, format, true, CompressionType::None)
    }

    pub fn add_port_with(
        &mut self,
        name: &str,
        format: Arc<DataFormat>,
        list: bool,
        compression: CompressionType,
    ) -> Result<&mut Self> {
        let name = PortName::new(name)?;
        if self.ports.iter().any(|p| p.name == name) {
            return Err(StepflowError::DuplicatePort {
                name: name.to_string(),
            });
        }
        self.ports.push(Port {
            index: self.ports.len(),
            name,
            format,
            list,
            compression,
            direction: PhantomData,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn build(self) -> PortSet<D> {
        PortSet { ports: self.ports }
    }
}
