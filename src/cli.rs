use clap::{ArgAction, Parser, Subcommand};
use ffclip::engine::tools::{AudioFormat, OverlayPosition};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ffclip", version)]
#[command(about = "FFmpeg clip toolkit: multi-resolution transcoding and single-shot video tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcode one video into several resolutions in parallel
    Transcode {
        /// Source video
        input: PathBuf,

        /// Target heights, e.g. 360,720,1080 (defaults to the config's list)
        #[arg(short, long, value_delimiter = ',')]
        resolutions: Vec<u32>,

        /// Directory for the outputs (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Maximum concurrent ffmpeg processes
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Give up on unfinished resolutions after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Show ffmpeg commands without executing
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract the audio track of a video
    ExtractAudio {
        video: PathBuf,

        /// Output file (defaults to <video stem>.<format> next to the video)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = AudioFormat::Mp3)]
        format: AudioFormat,
    },

    /// Concatenate videos without re-encoding
    Merge {
        /// Videos in playback order
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Composite an image over a video
    Overlay {
        video: PathBuf,
        image: PathBuf,

        /// Show the image from this time (seconds)
        #[arg(long)]
        start: Option<f64>,

        /// Hide the image after this time (seconds)
        #[arg(long)]
        end: Option<f64>,

        /// Image opacity, 0.0 to 1.0
        #[arg(long, default_value_t = 1.0)]
        opacity: f64,

        /// Video encoder for the result
        #[arg(long, default_value = "libopenh264")]
        codec: String,

        /// Encode with VAAPI
        #[arg(long)]
        gpu: bool,

        #[arg(long, value_enum, default_value_t = OverlayPosition::TopLeft)]
        position: OverlayPosition,
    },

    /// Save a single frame as an image
    Thumbnail {
        video: PathBuf,

        /// Timestamp in seconds
        #[arg(long, default_value_t = 1.0)]
        at: f64,

        /// Output image (defaults to <video stem>_thumb.jpg next to the video)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Scale to this width, keeping the aspect ratio
        #[arg(long)]
        width: Option<u32>,
    },

    /// Check that a video file is readable and not corrupt
    Validate {
        file: PathBuf,

        /// Print the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show dimensions, frame rate and duration of a video
    Info { file: PathBuf },

    /// List the H.264 encoders ffmpeg offers and the one that would be used
    Encoders,

    /// Show the resolution ladder (builtin plus config overrides)
    Presets,

    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
