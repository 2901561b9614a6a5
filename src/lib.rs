//! ffclip: concurrent multi-resolution transcoding on top of ffmpeg, plus a
//! handful of single-shot video tools.

pub mod config;
pub mod engine;
