use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Capture error on {camera}: {message}")]
    Capture { camera: String, message: String },

    #[error("Detection error: {message}")]
    Detection { message: String },

    #[error("Stream sink error on {camera}: {message}")]
    Stream { camera: String, message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SentinelError {
    pub fn capture<S: Into<String>>(camera: S, message: S) -> Self {
        Self::Capture {
            camera: camera.into(),
            message: message.into(),
        }
    }

    pub fn detection<S: Into<String>>(message: S) -> Self {
        Self::Detection {
            message: message.into(),
        }
    }

    pub fn stream<S: Into<String>>(camera: S, message: S) -> Self {
        Self::Stream {
            camera: camera.into(),
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
