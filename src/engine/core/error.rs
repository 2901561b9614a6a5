//! Error types shared by the transcoder and the single-shot tools.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to drive the external engine process at all (as opposed to the
/// engine running and reporting a non-zero exit).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Precondition failures for a transcode request. These abort before any
/// job is dispatched; per-resolution failures live in the report instead.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("preset height must be positive")]
    ZeroHeight,

    #[error("invalid bitrate '{bitrate}' for {height}p (expected e.g. 2500k or 4M)")]
    InvalidBitrate { height: u32, bitrate: String },

    #[error("empty speed preset for {height}p")]
    EmptyPreset { height: u32 },
}

/// Errors from the single-shot tools (audio extraction, merge, overlay, thumbnail).
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("output directory does not exist: {}", .0.display())]
    OutputDirMissing(PathBuf),

    #[error("{tool} failed ({status}):\n{stderr_tail}")]
    Failed {
        tool: &'static str,
        status: String,
        stderr_tail: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
