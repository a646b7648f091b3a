use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV decoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Relocation failed for {path}: {reason}")]
    Relocation { path: String, reason: String },

    #[error("Invocation deadline exhausted before {stage}")]
    TimeoutPreempted { stage: &'static str },

    #[error("Notification failed: {0}")]
    Notify(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
