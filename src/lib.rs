pub mod acquisition;
pub mod app;
pub mod config;
pub mod configurator;
pub mod convert;
pub mod device;
pub mod error;
pub mod frame;
pub mod publish;

pub use acquisition::{AcquisitionReport, AcquisitionState, AcquisitionStats, AcquisitionTask};
pub use app::{GigecamOrchestrator, ShutdownReason};
pub use config::{
    AutoFunctionProfile, CameraConfig, GainAutoMode, GigecamConfig, OutputConfig, OutputFormat,
};
pub use configurator::{AppliedSettings, Configurator};
pub use convert::{convert, ConvertError};
pub use device::sim::{SimBackend, SimDevice};
pub use device::{
    find_device, CameraBackend, CameraDevice, DeviceError, DeviceInfo, GrabError, GrabOutcome,
    ParamValue,
};
pub use error::{GigecamError, Result};
pub use frame::{ConvertedImage, ImageFormat, RawFrame, SensorFormat};
pub use publish::{FramePublisher, ImageMessage, OutputChannel};
