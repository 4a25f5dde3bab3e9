use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbnailerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object store error on {bucket}/{key}: {message}")]
    Store {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("{tool} failed: {detail}")]
    Tool { tool: String, detail: String },

    #[error("Invalid orientation value: {0:?}")]
    Orientation(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

impl ThumbnailerError {
    pub fn store<B, K, M>(bucket: B, key: K, message: M) -> Self
    where
        B: Into<String>,
        K: Into<String>,
        M: std::fmt::Display,
    {
        ThumbnailerError::Store {
            bucket: bucket.into(),
            key: key.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ThumbnailerError>;
