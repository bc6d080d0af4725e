use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request to {url} failed: {status} - {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {step}: {message}")]
    Schema { step: String, message: String },

    #[error("API error {code} in {step}: {message}")]
    Api {
        step: String,
        code: i64,
        message: String,
    },

    #[error("IO error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to save image from {url}: {reason}")]
    InvalidFileName { url: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn schema(step: &str, message: impl Into<String>) -> Self {
        Self::Schema {
            step: step.to_string(),
            message: message.into(),
        }
    }

    pub fn filesystem(path: &Path, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn invalid_file_name(url: &str, reason: &str) -> Self {
        Self::InvalidFileName {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<envy::Error> for AppError {
    fn from(error: envy::Error) -> Self {
        Self::Config(error.to_string())
    }
}
