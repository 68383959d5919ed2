//! Narrow capability seam over the vendor camera SDK.
//!
//! The vendor's deep object model (transport factories, node maps, grab
//! engines) is reduced to two traits: [`CameraBackend`] enumerates and
//! connects devices, [`CameraDevice`] exposes named parameters, the grab
//! engine, and a grab-ready wait. Everything above this seam is
//! vendor-agnostic.

pub mod sim;

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::{GigecamError, Result};
use crate::frame::RawFrame;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Identity of one enumerated capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Serial number, the exact-match key used for device selection
    pub id: String,
    /// Vendor model name
    pub model: String,
    /// Transport-qualified full name
    pub full_name: String,
}

/// Value of a named device parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(i64),
    Float(f64),
    Enumeration(String),
}

impl ParamValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_enumeration(&self) -> Option<&str> {
        match self {
            ParamValue::Enumeration(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Enumeration(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device is not open")]
    NotOpen,

    #[error("device is already grabbing")]
    AlreadyGrabbing,

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{name}' rejected value {value}: {details}")]
    ParameterRejected {
        name: String,
        value: String,
        details: String,
    },

    #[error("parameter '{0}' is read-only")]
    ReadOnly(String),

    #[error("parameter '{0}' has no numeric range")]
    NoRange(String),

    #[error("device transport failure: {0}")]
    Transport(String),

    #[error("grab wait object is no longer valid: {0}")]
    WaitObject(String),
}

/// Failure report for one grab attempt, as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabError {
    /// Device-reported error code
    pub code: u32,
    /// Human-readable description from the device
    pub description: String,
}

impl fmt::Display for GrabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}: {}", self.code, self.description)
    }
}

/// Result of retrieving one buffer from the device's output queue.
#[derive(Debug, Clone)]
pub enum GrabOutcome {
    /// The grab succeeded and produced a frame
    Frame(RawFrame),
    /// The device reported a per-frame failure
    Failed(GrabError),
}

/// One opened capture device.
///
/// Parameter access follows the device's own namespace ("Width", "OffsetX",
/// "GevSCPSPacketSize", ...). Writability is queried, not assumed: a set on a
/// read-only node fails with [`DeviceError::ReadOnly`].
#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    fn open(&mut self) -> std::result::Result<(), DeviceError>;

    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Current value of a named parameter.
    fn parameter(&self, name: &str) -> std::result::Result<ParamValue, DeviceError>;

    /// Write a named parameter, subject to writability and range checks.
    fn set_parameter(
        &mut self,
        name: &str,
        value: ParamValue,
    ) -> std::result::Result<(), DeviceError>;

    /// Whether the device reports the parameter as writable.
    fn is_writable(&self, name: &str) -> bool;

    /// Device-reported (min, max) for an integer parameter.
    fn integer_range(&self, name: &str) -> std::result::Result<(i64, i64), DeviceError>;

    /// Device-reported (min, max) for a float parameter.
    fn float_range(&self, name: &str) -> std::result::Result<(f64, f64), DeviceError>;

    /// Start the continuous one-by-one grab strategy with a bounded buffer
    /// pool of `buffer_count` buffers.
    fn start_grabbing(&mut self, buffer_count: usize) -> std::result::Result<(), DeviceError>;

    /// Stop the grab strategy and release queued buffers.
    fn stop_grabbing(&mut self);

    fn is_grabbing(&self) -> bool;

    /// Zero-timeout retrieval of the next queued grab result.
    ///
    /// Returns `None` when nothing is queued; pair with [`wait_grab_ready`]
    /// for blocking acquisition. A `None` after a ready signal is a tolerated
    /// spurious wake.
    ///
    /// [`wait_grab_ready`]: CameraDevice::wait_grab_ready
    fn retrieve(&mut self) -> Option<GrabOutcome>;

    /// Resolve when a grab result is (or may be) available for retrieval.
    ///
    /// Errors only when the underlying wait primitive has been torn down,
    /// which the acquisition loop treats as an internal-consistency
    /// violation.
    async fn wait_grab_ready(&self) -> std::result::Result<(), DeviceError>;
}

/// Entry point into one vendor transport layer.
pub trait CameraBackend: Send + Sync {
    /// Enumerate currently attached devices.
    fn enumerate(&self) -> std::result::Result<Vec<DeviceInfo>, DeviceError>;

    /// Create an (unopened) device handle for an enumerated entry.
    fn connect(
        &self,
        info: &DeviceInfo,
    ) -> std::result::Result<Box<dyn CameraDevice>, DeviceError>;
}

/// Find the attached device whose identifier equals `id` exactly.
///
/// The comparison is case-sensitive with no partial matching, and the whole
/// list is scanned before failure is declared; a non-matching entry never
/// aborts the scan.
pub fn find_device(backend: &dyn CameraBackend, id: &str) -> Result<DeviceInfo> {
    let devices = backend.enumerate()?;
    info!("Enumerated {} capture device(s)", devices.len());

    for candidate in &devices {
        if candidate.id == id {
            return Ok(candidate.clone());
        }
    }

    Err(GigecamError::DeviceNotFound {
        id: id.to_string(),
        enumerated: devices.len(),
    })
}
