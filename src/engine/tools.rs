//! Single-shot ffmpeg tools: audio extraction, concatenation, image overlay
//! and thumbnails.
//!
//! Each tool validates its inputs, builds one argument list and runs it
//! through an [`Engine`]. Argument builders are public so the exact command
//! line can be shown with `--dry-run` and checked in tests.

use super::core::{Args, Engine, ToolError, format_command};
use super::probe::{FileCheckError, check_video_file};
use clap::ValueEnum;
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const LOG_STDERR_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    pub fn codec(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::Wav => "pcm_s16le",
        }
    }
}

/// `<dir>/<stem>.<format>` next to the video
pub fn default_audio_output(video: &Path, format: AudioFormat) -> PathBuf {
    video.with_extension(format.extension())
}

pub fn build_extract_audio_args(video: &Path, output: &Path, format: AudioFormat) -> Vec<OsString> {
    Args::new()
        .arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        .pair("-i", video)
        .arg("-vn")
        .pair("-c:a", format.codec())
        .arg(output)
        .finish()
}

/// Pull the audio track out of a video.
pub fn extract_audio(
    engine: &dyn Engine,
    video: &Path,
    output: Option<&Path>,
    format: AudioFormat,
) -> Result<PathBuf, ToolError> {
    require_video(video)?;
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_audio_output(video, format));
    require_parent_dir(&output)?;

    run_checked(engine, build_extract_audio_args(video, &output, format))?;
    info!(output = %output.display(), format = format.extension(), "Audio extracted");
    Ok(output)
}

/// Deletes the concat list however the merge ends
struct ConcatList {
    path: PathBuf,
}

impl ConcatList {
    fn write(inputs: &[PathBuf]) -> Result<Self, ToolError> {
        let path = std::env::temp_dir().join(format!("ffclip-concat-{}.txt", Uuid::new_v4()));
        let list = Self { path };
        fs::write(&list.path, concat_list_contents(inputs))?;
        Ok(list)
    }
}

impl Drop for ConcatList {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove concat list");
        }
    }
}

/// One `file '<path>'` line per input, single quotes escaped the way the
/// concat demuxer expects.
pub fn concat_list_contents(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

pub fn build_merge_args(list_file: &Path, output: &Path) -> Vec<OsString> {
    Args::new()
        .arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        .pair("-f", "concat")
        .pair("-safe", "0")
        .pair("-i", list_file)
        .pair("-c", "copy")
        .arg(output)
        .finish()
}

/// Concatenate videos by stream copy. Inputs must share codecs.
pub fn merge_videos(engine: &dyn Engine, inputs: &[PathBuf], output: &Path) -> Result<PathBuf, ToolError> {
    if inputs.len() < 2 {
        return Err(ToolError::InvalidInput(
            "at least two videos are required to merge".to_string(),
        ));
    }

    let mut absolute = Vec::with_capacity(inputs.len());
    for input in inputs {
        if !input.exists() {
            return Err(ToolError::NotFound(input.clone()));
        }
        absolute.push(fs::canonicalize(input)?);
    }
    require_parent_dir(output)?;

    let list = ConcatList::write(&absolute)?;
    run_checked(engine, build_merge_args(&list.path, output))?;
    info!(inputs = inputs.len(), output = %output.display(), "Videos merged");
    Ok(output.to_path_buf())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    #[default]
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl OverlayPosition {
    /// x/y expressions for ffmpeg's overlay filter
    pub fn coordinates(&self) -> (&'static str, &'static str) {
        match self {
            OverlayPosition::TopLeft => ("0", "0"),
            OverlayPosition::TopRight => ("main_w-overlay_w", "0"),
            OverlayPosition::BottomLeft => ("0", "main_h-overlay_h"),
            OverlayPosition::BottomRight => ("main_w-overlay_w", "main_h-overlay_h"),
            OverlayPosition::Center => ("(main_w-overlay_w)/2", "(main_h-overlay_h)/2"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub image: PathBuf,
    /// Show the image from this many seconds in
    pub start: Option<f64>,
    /// Hide it after this many seconds
    pub end: Option<f64>,
    /// 0.0 (invisible) to 1.0 (opaque)
    pub opacity: f64,
    pub codec: String,
    /// Encode with VAAPI instead of `codec`
    pub use_gpu: bool,
    pub position: OverlayPosition,
}

impl OverlayOptions {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            start: None,
            end: None,
            opacity: 1.0,
            codec: "libopenh264".to_string(),
            use_gpu: false,
            position: OverlayPosition::default(),
        }
    }

    /// Time window for the overlay, if one was asked for
    pub fn enable_expr(&self) -> Option<String> {
        match (self.start, self.end) {
            (None, None) => None,
            (start, Some(end)) => Some(format!("between(t,{},{})", start.unwrap_or(0.0), end)),
            (Some(start), None) => Some(format!("gte(t,{})", start)),
        }
    }

    pub fn video_codec(&self) -> &str {
        if self.use_gpu { "h264_vaapi" } else { &self.codec }
    }

    fn validate(&self) -> Result<(), ToolError> {
        if !(0.0..=1.0).contains(&self.opacity) {
            return Err(ToolError::InvalidInput(format!(
                "opacity must be between 0 and 1, got {}",
                self.opacity
            )));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end <= start {
                return Err(ToolError::InvalidInput(format!(
                    "overlay end ({}) must be after start ({})",
                    end, start
                )));
            }
        }
        if self.codec.trim().is_empty() {
            return Err(ToolError::InvalidInput("codec must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `<dir>/<stem>_overlay.mp4` next to the video
pub fn overlay_output_path(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{}_overlay.mp4", stem))
}

pub fn overlay_filter(options: &OverlayOptions) -> String {
    let (x, y) = options.position.coordinates();

    let (prelude, image_label) = if options.opacity < 1.0 {
        (
            format!("[1:v]format=rgba,colorchannelmixer=aa={}[img];", options.opacity),
            "[img]",
        )
    } else {
        (String::new(), "[1:v]")
    };

    let mut overlay = format!("overlay=x={}:y={}", x, y);
    if let Some(expr) = options.enable_expr() {
        overlay.push_str(&format!(":enable='{}'", expr));
    }
    overlay.push_str(":eof_action=repeat:shortest=1");

    format!("{}[0:v]{}{}[v]", prelude, image_label, overlay)
}

pub fn build_overlay_args(video: &Path, options: &OverlayOptions, output: &Path) -> Vec<OsString> {
    let codec = options.video_codec();

    let mut args = Args::new();
    args.arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        .pair("-i", video)
        // Still image becomes an endless stream; shortest=1 ends it with the video
        .pair("-loop", "1")
        .pair("-i", &options.image)
        .pair("-filter_complex", overlay_filter(options))
        .pair("-map", "[v]")
        .pair("-map", "0:a?")
        .pair("-c:v", codec);
    if codec == "mpeg4" {
        args.pair("-qscale:v", "5");
    }
    args.pair("-pix_fmt", "yuv420p")
        .pair("-c:a", "copy")
        .arg(output)
        .finish()
}

/// Burn an image over a video, writing `<stem>_overlay.mp4` beside it.
pub fn composite_image(
    engine: &dyn Engine,
    video: &Path,
    options: &OverlayOptions,
) -> Result<PathBuf, ToolError> {
    require_video(video)?;
    if !options.image.is_file() {
        return Err(ToolError::NotFound(options.image.clone()));
    }
    options.validate()?;

    let output = overlay_output_path(video);
    run_checked(engine, build_overlay_args(video, options, &output))?;
    info!(output = %output.display(), codec = options.video_codec(), "Overlay rendered");
    Ok(output)
}

/// `<dir>/<stem>_thumb.jpg` next to the video
pub fn default_thumbnail_output(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    video.with_file_name(format!("{}_thumb.jpg", stem))
}

pub fn build_thumbnail_args(video: &Path, at: f64, output: &Path, width: Option<u32>) -> Vec<OsString> {
    let mut args = Args::new();
    args.arg("-hide_banner")
        .arg("-nostdin")
        .arg("-y")
        // Seek before -i: fast keyframe seek, then decode to the exact time
        .pair("-ss", at.to_string())
        .pair("-i", video)
        .pair("-frames:v", "1");
    if let Some(w) = width {
        args.pair("-vf", format!("scale={}:-2", w));
    }
    args.pair("-q:v", "2").arg(output).finish()
}

/// Grab a single frame `at` seconds into the video.
pub fn extract_thumbnail(
    engine: &dyn Engine,
    video: &Path,
    at: f64,
    output: Option<&Path>,
    width: Option<u32>,
) -> Result<PathBuf, ToolError> {
    require_video(video)?;
    if !at.is_finite() || at < 0.0 {
        return Err(ToolError::InvalidInput(format!(
            "timestamp must be a non-negative number of seconds, got {}",
            at
        )));
    }
    if width == Some(0) {
        return Err(ToolError::InvalidInput("thumbnail width must be positive".to_string()));
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_thumbnail_output(video));
    require_parent_dir(&output)?;

    run_checked(engine, build_thumbnail_args(video, at, &output, width))?;
    info!(output = %output.display(), at, "Thumbnail written");
    Ok(output)
}

fn require_video(path: &Path) -> Result<(), ToolError> {
    check_video_file(path).map_err(|e| match e {
        FileCheckError::NotFound(p) => ToolError::NotFound(p),
        other => ToolError::InvalidInput(other.to_string()),
    })
}

fn require_parent_dir(output: &Path) -> Result<(), ToolError> {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.is_dir() => {
            Err(ToolError::OutputDirMissing(dir.to_path_buf()))
        }
        _ => Ok(()),
    }
}

fn run_checked(engine: &dyn Engine, args: Vec<OsString>) -> Result<(), ToolError> {
    debug!(command = %format_command(engine.program(), &args), "Running tool");

    let output = engine.run(&args, None)?;
    if output.success() {
        return Ok(());
    }

    Err(ToolError::Failed {
        tool: "ffmpeg",
        status: output.status_label(),
        stderr_tail: output.stderr_tail(LOG_STDERR_LINES),
    })
}
