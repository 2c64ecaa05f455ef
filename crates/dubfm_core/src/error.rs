//! 错误类型

/// 核心错误
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown bitrate: {0}")]
    UnknownBitrate(String),

    #[error("Media session error: {0}")]
    Session(String),

    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(String),
}
