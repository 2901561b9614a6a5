use super::error::TranscodeError;
use super::runner::EngineOutput;
use serde::Serialize;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Extension used when the input has none
const DEFAULT_CONTAINER: &str = "mp4";

/// One fan-out request: a single input, many target heights.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    /// Target heights. Duplicates are allowed; each one runs and overwrites
    /// the same output file.
    pub resolutions: Vec<u32>,
    pub output_dir: PathBuf,
    /// Pool size override; `None` picks `min(DEFAULT_MAX_WORKERS, jobs)`
    pub max_workers: Option<usize>,
    /// Wall-clock budget for the whole request
    pub timeout: Option<Duration>,
}

impl TranscodeRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        resolutions: impl IntoIterator<Item = u32>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            resolutions: resolutions.into_iter().collect(),
            output_dir: output_dir.into(),
            max_workers: None,
            timeout: None,
        }
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Preconditions checked before the scheduler does anything else.
    pub fn validate(&self) -> Result<(), TranscodeError> {
        if self.resolutions.is_empty() {
            return Err(TranscodeError::InvalidRequest(
                "at least one resolution is required".to_string(),
            ));
        }
        if self.resolutions.contains(&0) {
            return Err(TranscodeError::InvalidRequest(
                "resolutions must be positive".to_string(),
            ));
        }
        if self.max_workers == Some(0) {
            return Err(TranscodeError::InvalidRequest(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if !self.input.is_file() {
            return Err(TranscodeError::InputNotFound(self.input.clone()));
        }
        Ok(())
    }
}

/// One (input, resolution, output) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub resolution: u32,
    pub output_path: PathBuf,
}

impl TranscodeJob {
    pub fn new(input_path: &Path, resolution: u32, output_dir: &Path) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path: input_path.to_path_buf(),
            resolution,
            output_path: derive_output_path(input_path, resolution, output_dir),
        }
    }

    /// Where the engine writes while the job runs:
    /// `<basename>_<resolution>p.<job id>.part.<ext>` next to the final file.
    ///
    /// Each job owns its staging file, so duplicate resolutions never write
    /// into (or clean up) each other's output.
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .output_path
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        name.push(format!(".{}.part.", self.id));
        name.push(
            self.output_path
                .extension()
                .unwrap_or_else(|| OsStr::new(DEFAULT_CONTAINER)),
        );
        self.output_path.with_file_name(name)
    }
}

/// `<output_dir>/<basename>_<resolution>p.<ext>`, keeping the input's container.
pub fn derive_output_path(input_path: &Path, resolution: u32, output_dir: &Path) -> PathBuf {
    let mut name = input_path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(format!("_{}p.", resolution));
    name.push(
        input_path
            .extension()
            .unwrap_or_else(|| OsStr::new(DEFAULT_CONTAINER)),
    );

    output_dir.join(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Engine ran and exited non-zero
    NonZeroExit,
    /// Engine was terminated by a signal we did not send
    Signalled,
    /// Request deadline expired before or while the job ran
    TimedOut,
    /// Engine could not be started
    SpawnFailed,
    /// The worker running the job panicked or never reported back
    WorkerLost,
    /// Engine exited cleanly but its output could not be moved into place
    FinalizeFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub exit_code: Option<i32>,
    /// Raw stderr (or other reason text) from the failed attempt
    pub diagnostics: String,
}

impl JobFailure {
    pub fn from_output(output: EngineOutput) -> Self {
        let kind = if output.timed_out {
            FailureKind::TimedOut
        } else if output.code.is_none() {
            FailureKind::Signalled
        } else {
            FailureKind::NonZeroExit
        };

        Self {
            kind,
            exit_code: output.code,
            diagnostics: output.stderr,
        }
    }

    pub fn new(kind: FailureKind, diagnostics: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: None,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Terminal outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscodeJobResult {
    pub job_id: Uuid,
    pub resolution: u32,
    /// Only meaningful when `success` is true
    pub output_path: PathBuf,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub elapsed_ms: u128,
}

impl TranscodeJobResult {
    pub fn succeeded(job: &TranscodeJob, elapsed: Duration) -> Self {
        Self {
            job_id: job.id,
            resolution: job.resolution,
            output_path: job.output_path.clone(),
            success: true,
            failure: None,
            elapsed_ms: elapsed.as_millis(),
        }
    }

    pub fn failed(job: &TranscodeJob, failure: JobFailure, elapsed: Duration) -> Self {
        Self {
            job_id: job.id,
            resolution: job.resolution,
            output_path: job.output_path.clone(),
            success: false,
            failure: Some(failure),
            elapsed_ms: elapsed.as_millis(),
        }
    }

    pub fn diagnostics(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.diagnostics.as_str())
    }
}
