//! FFmpeg argument builders and the per-resolution job runner.

use super::preset::PresetTable;
use super::runner::{Engine, format_command};
use super::types::{FailureKind, JobFailure, TranscodeJob, TranscodeJobResult};
use crate::engine::hardware::VideoEncoder;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Lines of stderr echoed into the log for a failed job; the full text stays
/// in the job result.
const LOG_STDERR_LINES: usize = 10;

const VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Small builder so argument lists read like the command line they become.
#[derive(Debug, Default)]
pub(crate) struct Args(Vec<OsString>);

impl Args {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.0.push(arg.into());
        self
    }

    pub(crate) fn pair(&mut self, flag: &str, value: impl Into<OsString>) -> &mut Self {
        self.arg(flag).arg(value)
    }

    pub(crate) fn finish(&mut self) -> Vec<OsString> {
        std::mem::take(&mut self.0)
    }
}

/// Encoders reject odd frame dimensions for 4:2:0 output.
pub fn even_height(resolution: u32) -> u32 {
    (resolution - resolution % 2).max(2)
}

/// Scale filter with the height pinned and the width derived from the
/// aspect ratio (rounded to an even number by ffmpeg's `-2`).
pub fn scale_filter(resolution: u32) -> String {
    format!("scale=-2:{}", even_height(resolution))
}

/// Arguments for one resolution of a fan-out transcode, written straight to
/// the job's final output path.
pub fn build_transcode_args(
    job: &TranscodeJob,
    encoder: VideoEncoder,
    bitrate: &str,
    preset: &str,
) -> Vec<OsString> {
    build_transcode_args_to(job, encoder, bitrate, preset, &job.output_path)
}

/// Same as [`build_transcode_args`], with the muxer writing to `destination`.
pub fn build_transcode_args_to(
    job: &TranscodeJob,
    encoder: VideoEncoder,
    bitrate: &str,
    preset: &str,
    destination: &Path,
) -> Vec<OsString> {
    let mut args = Args::new();
    args.arg("-hide_banner").arg("-nostdin").arg("-y");

    // VAAPI scales in software, then uploads frames to a GPU surface
    let filter = if encoder == VideoEncoder::H264Vaapi {
        args.pair("-vaapi_device", VAAPI_DEVICE);
        format!("{},format=nv12,hwupload", scale_filter(job.resolution))
    } else {
        scale_filter(job.resolution)
    };

    args.pair("-i", &job.input_path)
        // First video stream; first audio stream only if there is one
        .pair("-map", "0:v:0")
        .pair("-map", "0:a:0?")
        .pair("-vf", filter)
        .pair("-c:v", encoder.ffmpeg_name())
        .pair("-b:v", bitrate);

    if encoder.accepts_named_preset() {
        args.pair("-preset", preset);
    }

    args.pair("-c:a", "copy")
        .pair("-movflags", "+faststart")
        .arg(destination);

    args.finish()
}

/// Run one resolution to completion. Never fails past its own boundary:
/// every outcome, including a spawn error or an expired deadline, comes back
/// as a [`TranscodeJobResult`].
///
/// The engine writes to [`TranscodeJob::staging_path`]; only a clean exit
/// renames that file onto `output_path`.
pub fn encode_job(
    engine: &dyn Engine,
    job: &TranscodeJob,
    encoder: VideoEncoder,
    presets: &PresetTable,
    deadline: Option<Instant>,
) -> TranscodeJobResult {
    let started = Instant::now();

    if deadline.is_some_and(|d| started >= d) {
        warn!(job_id = %job.id, resolution = job.resolution, "Deadline passed before job started");
        return TranscodeJobResult::failed(
            job,
            JobFailure::new(FailureKind::TimedOut, "deadline expired before the job started"),
            started.elapsed(),
        );
    }

    let (bitrate, preset) = presets.plan_for(job.resolution);
    let staging = job.staging_path();
    let args = build_transcode_args_to(job, encoder, bitrate, preset, &staging);
    debug!(
        job_id = %job.id,
        command = %format_command(engine.program(), &args),
        "Launching transcode"
    );

    let output = match engine.run(&args, deadline) {
        Ok(output) => output,
        Err(e) => {
            warn!(job_id = %job.id, resolution = job.resolution, error = %e, "Could not start engine");
            remove_partial_output(&staging);
            return TranscodeJobResult::failed(
                job,
                JobFailure::new(FailureKind::SpawnFailed, e.to_string()),
                started.elapsed(),
            );
        }
    };

    if output.success() {
        if let Err(e) = fs::rename(&staging, &job.output_path) {
            warn!(
                job_id = %job.id,
                staging = %staging.display(),
                output = %job.output_path.display(),
                error = %e,
                "Could not move finished output into place"
            );
            remove_partial_output(&staging);
            return TranscodeJobResult::failed(
                job,
                JobFailure::new(
                    FailureKind::FinalizeFailed,
                    format!("renaming {} failed: {}", staging.display(), e),
                ),
                started.elapsed(),
            );
        }
        info!(
            job_id = %job.id,
            resolution = job.resolution,
            output = %job.output_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcode finished"
        );
        return TranscodeJobResult::succeeded(job, started.elapsed());
    }

    warn!(
        job_id = %job.id,
        resolution = job.resolution,
        status = %output.status_label(),
        stderr = %output.stderr_tail(LOG_STDERR_LINES),
        "Transcode failed"
    );
    remove_partial_output(&staging);

    TranscodeJobResult::failed(job, JobFailure::from_output(output), started.elapsed())
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
}
