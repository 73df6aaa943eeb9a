use thiserror::Error;

#[derive(Debug, Error)]
pub enum CassetteError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Mode {mode} does not support {direction}")]
    UnsupportedMode {
        mode: String,
        direction: &'static str,
    },

    #[error("Frame of {0} bits does not fit the 64-bit accumulator")]
    FrameTooLong(u32),

    #[error("Config file error: {0}")]
    Config(String),

    #[error("Cannot decode line {line:?}: {reason}")]
    LineDecode { line: String, reason: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio sink accepted no samples")]
    SinkWrite,

    #[error("Sample buffer advance {advance} exceeds {valid} valid samples")]
    BufferInvariant { advance: usize, valid: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stage {0} stopped")]
    StageStopped(String),
}

impl CassetteError {
    /// Errors that only cost the current frame or line; the stream keeps going.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LineDecode { .. } | Self::NotFound(_))
    }
}

impl From<serde_json::Error> for CassetteError {
    fn from(err: serde_json::Error) -> Self {
        CassetteError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CassetteError>;
