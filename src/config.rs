use crate::error::{GigecamError, Result};
use crate::frame::{ImageFormat, SensorFormat};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Top-level node configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GigecamConfig {
    pub camera: CameraConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Camera selection, geometry, and auto-function configuration.
///
/// Legacy option names from earlier deployments are accepted as aliases
/// (`CameraID`, `ImageWidth`, `FrameRate`, ...). The config layer lowercases
/// keys read from file and environment sources, so each alias is carried in
/// both spellings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device serial number to match, exactly and case-sensitively
    #[serde(alias = "CameraID", alias = "cameraid")]
    pub id: String,

    /// Frame width in pixels
    #[serde(
        default = "default_frame_width",
        alias = "ImageWidth",
        alias = "imagewidth"
    )]
    pub width: u32,

    /// Frame height in pixels
    #[serde(
        default = "default_frame_height",
        alias = "ImageHeight",
        alias = "imageheight"
    )]
    pub height: u32,

    /// Requested acquisition frame rate in frames per second
    #[serde(
        default = "default_frame_rate",
        alias = "FrameRate",
        alias = "framerate"
    )]
    pub frame_rate: u32,

    /// Target luminance for the auto functions, 0 (black) to 255 (white)
    #[serde(
        default = "default_luminance_target",
        alias = "LuminanceControl",
        alias = "luminancecontrol"
    )]
    pub luminance_target: u32,

    /// Adjust gain once at startup, then hold it
    #[serde(default, alias = "AutoGainOnce", alias = "autogainonce")]
    pub auto_gain_once: bool,

    /// Keep adjusting gain while images are acquired
    #[serde(default, alias = "AutoGainContinuous", alias = "autogaincontinuous")]
    pub auto_gain_continuous: bool,

    /// Keep adjusting exposure while images are acquired
    #[serde(
        default,
        alias = "AutoExposureContinuous",
        alias = "autoexposurecontinuous"
    )]
    pub auto_exposure_continuous: bool,

    /// Which knob the auto functions prefer to minimize
    #[serde(
        default,
        alias = "AutoFunctionProfile",
        alias = "autofunctionprofile",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_function_profile: Option<AutoFunctionProfile>,

    /// Network transport packet size, derived from the interface MTU
    #[serde(
        default = "default_packet_size",
        alias = "NetworkInterfaceMTU",
        alias = "networkinterfacemtu"
    )]
    pub packet_size: u32,

    /// Canonical format of published images
    #[serde(default, alias = "OutputFormat", alias = "outputformat")]
    pub output_format: OutputFormat,

    /// Buffers pre-allocated for the grab engine
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,
}

/// Output channel configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Channel name published images are delivered under
    #[serde(default = "default_output_channel")]
    pub channel: String,

    /// Per-subscriber channel capacity
    #[serde(default = "default_output_capacity")]
    pub capacity: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            channel: default_output_channel(),
            capacity: default_output_capacity(),
        }
    }
}

/// Published image format, named as the downstream consumers know them.
#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[serde(rename = "RGB_U8")]
    RgbU8,
    #[serde(rename = "BGR_U8")]
    BgrU8,
    #[default]
    #[serde(rename = "GRAY_U8")]
    GrayU8,
}

impl OutputFormat {
    /// Canonical format of the published image.
    pub fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::RgbU8 => ImageFormat::Rgb8,
            OutputFormat::BgrU8 => ImageFormat::Bgr8,
            OutputFormat::GrayU8 => ImageFormat::Gray8,
        }
    }

    /// Sensor format the device is configured to deliver for this output.
    /// Color output captures the Bayer mosaic; conversion happens
    /// post-capture, not in-device.
    pub fn sensor_format(&self) -> SensorFormat {
        match self {
            OutputFormat::RgbU8 | OutputFormat::BgrU8 => SensorFormat::BayerBG8,
            OutputFormat::GrayU8 => SensorFormat::Mono8,
        }
    }
}

/// Preference applied when both gain and exposure could reach the target.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum AutoFunctionProfile {
    MinimizeGain,
    MinimizeExposure,
}

impl AutoFunctionProfile {
    /// Value of the device's AutoFunctionProfile enumeration.
    pub fn device_value(&self) -> &'static str {
        match self {
            AutoFunctionProfile::MinimizeGain => "GainMinimum",
            AutoFunctionProfile::MinimizeExposure => "ExposureMinimum",
        }
    }
}

/// Gain auto-function mode derived from the configured flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainAutoMode {
    Off,
    Once,
    Continuous,
}

impl GainAutoMode {
    pub fn device_value(&self) -> &'static str {
        match self {
            GainAutoMode::Off => "Off",
            GainAutoMode::Once => "Once",
            GainAutoMode::Continuous => "Continuous",
        }
    }
}

impl CameraConfig {
    /// Continuous adjustment takes precedence over a one-shot adjustment.
    pub fn gain_auto_mode(&self) -> GainAutoMode {
        if self.auto_gain_continuous {
            GainAutoMode::Continuous
        } else if self.auto_gain_once {
            GainAutoMode::Once
        } else {
            GainAutoMode::Off
        }
    }

    /// Whether any auto function needs the statistics AOI set up.
    pub fn auto_functions_requested(&self) -> bool {
        self.auto_exposure_continuous || self.gain_auto_mode() != GainAutoMode::Off
    }
}

impl GigecamConfig {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from_file("gigecam.toml")
    }

    /// Load configuration from a specific file path, layered over defaults
    /// and under `GIGECAM_`-prefixed environment variables.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        // Defaults live on the serde derives; injecting them here as well
        // would collide with the legacy field aliases during deserialization.
        let settings = Config::builder()
            // Configuration file (optional; camera.id must come from file or
            // environment)
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("GIGECAM").separator("__"))
            .build()?;

        let config: GigecamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate value ranges beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.camera.id.is_empty() {
            return Err(GigecamError::system("camera.id must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(GigecamError::system(
                "camera.width and camera.height must be positive",
            ));
        }
        if self.camera.frame_rate == 0 {
            return Err(GigecamError::system("camera.frame_rate must be positive"));
        }
        if self.camera.luminance_target > 255 {
            return Err(GigecamError::system(
                "camera.luminance_target must be within 0..=255",
            ));
        }
        if self.camera.packet_size == 0 {
            return Err(GigecamError::system("camera.packet_size must be positive"));
        }
        if self.camera.buffer_count == 0 {
            return Err(GigecamError::system("camera.buffer_count must be positive"));
        }
        if self.output.channel.is_empty() {
            return Err(GigecamError::system("output.channel must not be empty"));
        }
        if self.output.capacity == 0 {
            return Err(GigecamError::system("output.capacity must be positive"));
        }
        Ok(())
    }

    /// Render the configuration as TOML, as `--print-config` emits it.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for GigecamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                id: String::new(),
                width: default_frame_width(),
                height: default_frame_height(),
                frame_rate: default_frame_rate(),
                luminance_target: default_luminance_target(),
                auto_gain_once: false,
                auto_gain_continuous: false,
                auto_exposure_continuous: false,
                auto_function_profile: None,
                packet_size: default_packet_size(),
                output_format: OutputFormat::default(),
                buffer_count: default_buffer_count(),
            },
            output: OutputConfig::default(),
        }
    }
}

fn default_frame_width() -> u32 {
    640
}

fn default_frame_height() -> u32 {
    480
}

fn default_frame_rate() -> u32 {
    24
}

fn default_luminance_target() -> u32 {
    100
}

fn default_packet_size() -> u32 {
    1500
}

fn default_buffer_count() -> usize {
    50
}

fn default_output_channel() -> String {
    "gigecam-image".to_string()
}

fn default_output_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gigecam.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults_applied_over_minimal_file() {
        let (_dir, path) = write_config(
            r#"
[camera]
id = "21441234"
"#,
        );

        let config = GigecamConfig::load_from_file(&path).unwrap();
        assert_eq!(config.camera.id, "21441234");
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.camera.frame_rate, 24);
        assert_eq!(config.camera.luminance_target, 100);
        assert_eq!(config.camera.packet_size, 1500);
        assert_eq!(config.camera.buffer_count, 50);
        assert_eq!(config.camera.output_format, OutputFormat::GrayU8);
        assert_eq!(config.output.channel, "gigecam-image");
        config.validate().unwrap();
    }

    #[test]
    fn test_legacy_option_names_are_accepted() {
        let (_dir, path) = write_config(
            r#"
[camera]
CameraID = "ABC123"
ImageWidth = 1280
ImageHeight = 960
FrameRate = 30
LuminanceControl = 128
AutoExposureContinuous = true
AutoGainContinuous = true
AutoFunctionProfile = "MinimizeGain"
NetworkInterfaceMTU = 9000
OutputFormat = "RGB_U8"
"#,
        );

        let config = GigecamConfig::load_from_file(&path).unwrap();
        assert_eq!(config.camera.id, "ABC123");
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.camera.height, 960);
        assert_eq!(config.camera.frame_rate, 30);
        assert_eq!(config.camera.luminance_target, 128);
        assert!(config.camera.auto_exposure_continuous);
        assert_eq!(config.camera.gain_auto_mode(), GainAutoMode::Continuous);
        assert_eq!(
            config.camera.auto_function_profile,
            Some(AutoFunctionProfile::MinimizeGain)
        );
        assert_eq!(config.camera.packet_size, 9000);
        assert_eq!(config.camera.output_format, OutputFormat::RgbU8);
    }

    #[test]
    fn test_missing_camera_id_fails_load() {
        let (_dir, path) = write_config("[camera]\n");
        assert!(GigecamConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_gain_mode_precedence() {
        let mut config = GigecamConfig::default();
        assert_eq!(config.camera.gain_auto_mode(), GainAutoMode::Off);
        assert!(!config.camera.auto_functions_requested());

        config.camera.auto_gain_once = true;
        assert_eq!(config.camera.gain_auto_mode(), GainAutoMode::Once);

        config.camera.auto_gain_continuous = true;
        assert_eq!(config.camera.gain_auto_mode(), GainAutoMode::Continuous);
        assert!(config.camera.auto_functions_requested());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = GigecamConfig::default();
        config.camera.id = "21441234".to_string();
        config.validate().unwrap();

        config.camera.luminance_target = 300;
        assert!(config.validate().is_err());

        config.camera.luminance_target = 100;
        config.camera.width = 0;
        assert!(config.validate().is_err());

        config.camera.width = 640;
        config.output.channel = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_format_mappings() {
        assert_eq!(OutputFormat::GrayU8.image_format(), ImageFormat::Gray8);
        assert_eq!(OutputFormat::GrayU8.sensor_format(), SensorFormat::Mono8);
        assert_eq!(OutputFormat::RgbU8.sensor_format(), SensorFormat::BayerBG8);
        assert_eq!(OutputFormat::BgrU8.sensor_format(), SensorFormat::BayerBG8);
        assert_eq!(OutputFormat::BgrU8.image_format(), ImageFormat::Bgr8);
    }

    #[test]
    fn test_default_config_renders_as_toml() {
        let rendered = GigecamConfig::default().to_toml().unwrap();
        assert!(rendered.contains("[camera]"));
        assert!(rendered.contains("[output]"));
        assert!(rendered.contains("GRAY_U8"));
    }
}
