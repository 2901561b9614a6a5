mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod preset;
mod report;
mod runner;
mod types;

pub use error::{EngineError, PresetError, ToolError, TranscodeError};
pub use ffmpeg_cmd::{
    build_transcode_args, build_transcode_args_to, encode_job, even_height, scale_filter,
};
pub(crate) use ffmpeg_cmd::Args;
pub use ffmpeg_info::{ffmpeg_available, ffmpeg_version, ffprobe_version};
pub use preset::{
    FALLBACK_BITRATE, FALLBACK_PRESET, PresetOverride, PresetTable, ResolutionPreset, SpeedTier,
};
pub use report::{FatalError, TranscodeReport, aggregate};
pub use runner::{
    Engine, EngineOutput, FfmpegEngine, LISTING_TIMEOUT, format_command, listing_deadline,
    run_command,
};
pub use types::{
    FailureKind, JobFailure, TranscodeJob, TranscodeJobResult, TranscodeRequest,
    derive_output_path,
};
