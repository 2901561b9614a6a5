// Transcoding engine: ffmpeg plumbing, encoder discovery, scheduling, tools

pub mod core;
pub mod hardware;
pub mod probe;
pub mod tools;
pub mod worker;

pub use self::core::*;
pub use hardware::{VideoEncoder, probe_encoder, select_encoder};
pub use worker::{DEFAULT_MAX_WORKERS, Transcoder, WorkerPool, transcode};
