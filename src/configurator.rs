//! Applies camera configuration once the device reaches the opened state.
//!
//! The sequence is all-or-fail from the caller's perspective: any rejected
//! parameter write surfaces as `ConfigurationFailed` and the device is not
//! started for acquisition. The two documented exceptions are read-only
//! offset nodes (skipped silently) and unsupported auto-function controls
//! (logged as a capability notice, configuration continues).

use crate::config::{CameraConfig, GainAutoMode};
use crate::device::{CameraDevice, DeviceError, ParamValue};
use crate::error::{GigecamError, Result};
use crate::frame::SensorFormat;
use tracing::{debug, info, warn};

/// Settings the device actually ended up with, surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSettings {
    pub width: i64,
    pub height: i64,
    /// Rate requested by configuration, before any clamping
    pub requested_frame_rate: f64,
    /// Rate the device reports it will achieve; may be lower than requested
    pub resulting_frame_rate: f64,
    pub sensor_format: SensorFormat,
    pub packet_size: i64,
}

/// Parameter configurator driven by the camera section of the node
/// configuration.
pub struct Configurator<'a> {
    config: &'a CameraConfig,
}

impl<'a> Configurator<'a> {
    pub fn new(config: &'a CameraConfig) -> Self {
        Self { config }
    }

    /// Apply the full open-time configuration sequence.
    pub fn configure(&self, device: &mut dyn CameraDevice) -> Result<AppliedSettings> {
        // Maximize the image AOI before sizing it
        self.try_set_to_minimum(device, "OffsetX")?;
        self.try_set_to_minimum(device, "OffsetY")?;

        let width = self.set_bounded_integer(device, "Width", self.config.width as i64)?;
        let height = self.set_bounded_integer(device, "Height", self.config.height as i64)?;

        let (requested_frame_rate, resulting_frame_rate) = self.set_frame_rate(device)?;

        let sensor_format = self.config.output_format.sensor_format();
        self.set_param(
            device,
            "PixelFormat",
            ParamValue::Enumeration(sensor_format.as_param_str().to_string()),
        )?;

        let packet_size = self.config.packet_size as i64;
        self.set_param(
            device,
            "GevSCPSPacketSize",
            ParamValue::Integer(packet_size),
        )?;

        if self.config.auto_functions_requested() {
            self.setup_auto_functions(device)?;
        }

        let applied = AppliedSettings {
            width,
            height,
            requested_frame_rate,
            resulting_frame_rate,
            sensor_format,
            packet_size,
        };
        info!(
            "Camera configured: {}x{} @ {:.1} fps (requested {:.1}), format {}, packet size {}",
            applied.width,
            applied.height,
            applied.resulting_frame_rate,
            applied.requested_frame_rate,
            applied.sensor_format.as_param_str(),
            applied.packet_size
        );
        Ok(applied)
    }

    /// Set an integer node to its reported minimum when writable; a
    /// read-only node is skipped without failing the sequence.
    fn try_set_to_minimum(&self, device: &mut dyn CameraDevice, name: &str) -> Result<()> {
        if !device.is_writable(name) {
            debug!("Parameter {} is read-only, leaving as-is", name);
            return Ok(());
        }
        let (min, _) = device.integer_range(name).map_err(config_error)?;
        self.set_param(device, name, ParamValue::Integer(min))
    }

    /// Set an integer node after checking the request against the device's
    /// reported range.
    fn set_bounded_integer(
        &self,
        device: &mut dyn CameraDevice,
        name: &str,
        value: i64,
    ) -> Result<i64> {
        let (min, max) = device.integer_range(name).map_err(config_error)?;
        if value < min || value > max {
            return Err(GigecamError::configuration(format!(
                "{} = {} is outside the device range [{}, {}]",
                name, value, min, max
            )));
        }
        self.set_param(device, name, ParamValue::Integer(value))?;
        Ok(value)
    }

    /// Request the configured frame rate, clamped into the device's range,
    /// and read back the rate the device says it will achieve.
    fn set_frame_rate(&self, device: &mut dyn CameraDevice) -> Result<(f64, f64)> {
        let requested = self.config.frame_rate as f64;
        let (min, max) = device
            .float_range("AcquisitionFrameRateAbs")
            .map_err(config_error)?;

        let applied = requested.clamp(min, max);
        if applied != requested {
            warn!(
                "Requested frame rate {:.1} fps clamped to {:.1} fps by device limits",
                requested, applied
            );
        }
        self.set_param(
            device,
            "AcquisitionFrameRateAbs",
            ParamValue::Float(applied),
        )?;

        let resulting = device
            .parameter("ResultingFrameRateAbs")
            .map_err(config_error)?
            .as_float()
            .ok_or_else(|| GigecamError::configuration("ResultingFrameRateAbs is not numeric"))?;
        if resulting < requested {
            info!(
                "Device reports a resulting frame rate of {:.1} fps for a {:.1} fps request",
                resulting, requested
            );
        }
        Ok((requested, resulting))
    }

    /// Designate the luminance-statistics AOI, set the target, and switch
    /// the requested auto functions on.
    fn setup_auto_functions(&self, device: &mut dyn CameraDevice) -> Result<()> {
        self.set_param(
            device,
            "AutoFunctionAOISelector",
            ParamValue::Enumeration("AOI1".to_string()),
        )?;
        self.try_set_to_minimum(device, "AutoFunctionAOIOffsetX")?;
        self.try_set_to_minimum(device, "AutoFunctionAOIOffsetY")?;

        // Statistics are gathered over the whole sensor
        let (_, aoi_width_max) = device
            .integer_range("AutoFunctionAOIWidth")
            .map_err(config_error)?;
        let (_, aoi_height_max) = device
            .integer_range("AutoFunctionAOIHeight")
            .map_err(config_error)?;
        self.set_param(
            device,
            "AutoFunctionAOIWidth",
            ParamValue::Integer(aoi_width_max),
        )?;
        self.set_param(
            device,
            "AutoFunctionAOIHeight",
            ParamValue::Integer(aoi_height_max),
        )?;

        // 0 = black, 255 = white
        self.set_param(
            device,
            "AutoTargetValue",
            ParamValue::Integer(self.config.luminance_target as i64),
        )?;

        if let Some(profile) = self.config.auto_function_profile {
            if device.is_writable("AutoFunctionProfile") {
                self.set_param(
                    device,
                    "AutoFunctionProfile",
                    ParamValue::Enumeration(profile.device_value().to_string()),
                )?;
            } else {
                info!("The camera does not support AutoFunctionProfile");
            }
        }

        self.apply_gain_auto(device)?;
        self.apply_exposure_auto(device)?;
        Ok(())
    }

    fn apply_gain_auto(&self, device: &mut dyn CameraDevice) -> Result<()> {
        let mode = self.config.gain_auto_mode();
        if mode == GainAutoMode::Off {
            return Ok(());
        }
        if !device.is_writable("GainAuto") {
            info!("The camera does not support Gain Auto");
            return Ok(());
        }

        if mode == GainAutoMode::Once {
            // Give the one-shot adjustment the full gain range to work with
            let (gain_min, gain_max) = device.integer_range("GainRaw").map_err(config_error)?;
            self.set_param(
                device,
                "AutoGainRawLowerLimit",
                ParamValue::Integer(gain_min),
            )?;
            self.set_param(
                device,
                "AutoGainRawUpperLimit",
                ParamValue::Integer(gain_max),
            )?;
            if let Ok(gain) = device.parameter("GainRaw") {
                debug!("Gain before one-shot adjustment: {}", gain);
            }
        }

        self.set_param(
            device,
            "GainAuto",
            ParamValue::Enumeration(mode.device_value().to_string()),
        )
    }

    fn apply_exposure_auto(&self, device: &mut dyn CameraDevice) -> Result<()> {
        if !self.config.auto_exposure_continuous {
            return Ok(());
        }
        if !device.is_writable("ExposureAuto") {
            info!("The camera does not support Exposure Auto");
            return Ok(());
        }
        self.set_param(
            device,
            "ExposureAuto",
            ParamValue::Enumeration("Continuous".to_string()),
        )
    }

    fn set_param(
        &self,
        device: &mut dyn CameraDevice,
        name: &str,
        value: ParamValue,
    ) -> Result<()> {
        debug!("Setting {} = {}", name, value);
        device.set_parameter(name, value).map_err(config_error)
    }
}

fn config_error(err: DeviceError) -> GigecamError {
    GigecamError::configuration(err.to_string())
}
