use thiserror::Error;

#[derive(Error, Debug)]
pub enum GigecamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("No camera matching id '{id}' found ({enumerated} devices enumerated)")]
    DeviceNotFound { id: String, enumerated: usize },

    #[error("Camera configuration failed: {details}")]
    ConfigurationFailed { details: String },

    #[error("Unexpected wait result in acquisition loop: {details}")]
    UnexpectedWaitResult { details: String },

    #[error("Device error: {0}")]
    Device(#[from] crate::device::DeviceError),

    #[error("System error: {message}")]
    System { message: String },
}

impl GigecamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn configuration<S: Into<String>>(details: S) -> Self {
        Self::ConfigurationFailed {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GigecamError>;
