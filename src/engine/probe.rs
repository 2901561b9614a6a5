// Input checks and probing using ffprobe

use crate::engine::core::{EngineOutput, ToolError, run_command};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Extensions accepted as video input
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "f4v",
];

/// ffprobe gets this long before a file is declared malformed
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Check if a path has a video file extension
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileCheckError {
    #[error("video file '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("'{}' is not a file", .0.display())]
    NotAFile(PathBuf),

    #[error("file extension '{ext}' is not supported (supported: {})", VIDEO_EXTENSIONS.join(", "))]
    UnsupportedExtension { ext: String },
}

/// Cheap filesystem-level check done before handing a file to ffmpeg.
pub fn check_video_file(path: &Path) -> Result<(), FileCheckError> {
    if !path.exists() {
        return Err(FileCheckError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(FileCheckError::NotAFile(path.to_path_buf()));
    }
    if !is_video_file(path) {
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        return Err(FileCheckError::UnsupportedExtension { ext });
    }
    Ok(())
}

/// Verdict of an integrity check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoValidation {
    pub valid: bool,
    pub reason: String,
}

impl VideoValidation {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: "Video file is valid.".to_string(),
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: reason.into(),
        }
    }
}

/// Integrity check: can ffprobe read a sane first video stream?
///
/// Problems with the file itself come back as `valid: false` with a
/// reason; only a missing path argument or an unrunnable ffprobe is an error.
pub fn validate_video(ffprobe: &Path, path: &Path) -> Result<VideoValidation, ToolError> {
    if path.as_os_str().is_empty() {
        return Err(ToolError::InvalidInput("video path must be provided".to_string()));
    }
    if !path.exists() {
        return Ok(VideoValidation::invalid("File does not exist."));
    }
    if std::fs::metadata(path)?.len() == 0 {
        return Ok(VideoValidation::invalid("File is empty (corrupt)."));
    }

    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-show_streams",
        "-select_streams",
        "v",
        "-of",
        "json",
    ])
    .arg(path);

    let output = run_command(cmd, Some(Instant::now() + VALIDATION_TIMEOUT))?;
    Ok(classify_probe_output(&output))
}

#[derive(Debug, Deserialize)]
struct StreamsOutput {
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamInfo {
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    width: u32,
}

/// Turn a finished ffprobe run into a verdict
pub fn classify_probe_output(output: &EngineOutput) -> VideoValidation {
    if output.timed_out {
        return VideoValidation::invalid(
            "Validation timed out. File might be malformed or infinite.",
        );
    }

    if !output.success() {
        let stderr = output.stderr.trim();
        let detail = if stderr.is_empty() {
            "Unknown parsing error."
        } else {
            stderr
        };
        return VideoValidation::invalid(format!(
            "File is corrupted or invalid format: {}",
            detail
        ));
    }

    let parsed: StreamsOutput = match serde_json::from_str(&output.stdout) {
        Ok(parsed) => parsed,
        Err(_) => {
            return VideoValidation::invalid("Malicious/Corrupt: File structure is unreadable.");
        }
    };

    let Some(stream) = parsed.streams.first() else {
        return VideoValidation::invalid(
            "Malicious/Invalid: No video stream found. File might be renamed or mislabeled.",
        );
    };
    if stream.codec_name.is_empty() {
        return VideoValidation::invalid("Invalid video stream detected.");
    }
    if stream.width == 0 {
        return VideoValidation::invalid("Corrupted video metadata (invalid resolution).");
    }

    if output.stderr.contains("Invalid data") {
        let snippet: String = output.stderr.chars().take(100).collect();
        return VideoValidation::invalid(format!(
            "Warning: File contains corrupted segments. {}",
            snippet
        ));
    }

    VideoValidation::valid()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
}

/// Probe input file using ffprobe to get video metadata
pub fn probe_input_info(ffprobe: &Path, input_path: &Path) -> Result<InputInfo, ToolError> {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        "-select_streams",
        "v:0", // First video stream only
    ])
    .arg(input_path);

    let output = run_command(cmd, Some(Instant::now() + VALIDATION_TIMEOUT))?;
    if !output.success() {
        return Err(ToolError::Failed {
            tool: "ffprobe",
            status: output.status_label(),
            stderr_tail: output.stderr_tail(10),
        });
    }

    parse_input_info(&output.stdout).map_err(ToolError::InvalidInput)
}

/// Parse the JSON printed by `ffprobe -show_format -show_streams`
pub fn parse_input_info(json_str: &str) -> Result<InputInfo, String> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| format!("Failed to parse ffprobe JSON: {}", e))?;

    let video_stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or("No video stream found")?;

    let width = video_stream["width"]
        .as_u64()
        .ok_or("Failed to get video width")? as u32;
    let height = video_stream["height"]
        .as_u64()
        .ok_or("Failed to get video height")? as u32;

    // r_frame_rate is exact for constant-rate streams; avg_frame_rate otherwise
    let fps_str = video_stream["r_frame_rate"]
        .as_str()
        .or_else(|| video_stream["avg_frame_rate"].as_str())
        .ok_or("Failed to get video framerate")?;
    let fps =
        parse_fraction(fps_str).ok_or_else(|| format!("Failed to parse framerate: {}", fps_str))?;

    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok());

    Ok(InputInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let numerator: f64 = num.trim().parse().ok()?;
    let denominator: f64 = den.trim().parse().ok()?;

    if denominator == 0.0 {
        return None;
    }

    Some(numerator / denominator)
}
