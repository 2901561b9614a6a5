use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use ffclip::config::Config;
use ffclip::engine::{
    self, Engine, FfmpegEngine, PresetTable, TranscodeJob, TranscodeReport, TranscodeRequest,
    Transcoder, hardware, probe, tools,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Every requested resolution was produced (or the command succeeded)
pub const EXIT_OK: i32 = 0;
/// Nothing useful happened: bad input, no encoder, tool failure
pub const EXIT_FATAL: i32 = 1;
/// Some resolutions were produced and some failed
pub const EXIT_PARTIAL: i32 = 2;

pub fn run(cli: Cli) -> i32 {
    init_logging(cli.verbose, cli.quiet);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return EXIT_FATAL;
        }
    };

    match dispatch(cli.command, &config, cli.config.as_deref()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FATAL
        }
    }
}

fn dispatch(command: Commands, config: &Config, config_file: Option<&Path>) -> Result<i32> {
    match command {
        Commands::Transcode {
            input,
            resolutions,
            output_dir,
            workers,
            timeout,
            json,
            dry_run,
        } => {
            let opts = TranscodeOpts {
                input,
                resolutions,
                output_dir,
                workers,
                timeout,
                json,
            };
            if dry_run {
                handle_dry_run(config, opts)
            } else {
                handle_transcode(config, opts)
            }
        }
        Commands::ExtractAudio {
            video,
            output,
            format,
        } => {
            let path = tools::extract_audio(&ffmpeg(config), &video, output.as_deref(), format)?;
            Ok(report_written("Audio", &path))
        }
        Commands::Merge { inputs, output } => {
            let path = tools::merge_videos(&ffmpeg(config), &inputs, &output)?;
            Ok(report_written("Merged video", &path))
        }
        Commands::Overlay {
            video,
            image,
            start,
            end,
            opacity,
            codec,
            gpu,
            position,
        } => {
            let options = tools::OverlayOptions {
                image,
                start,
                end,
                opacity,
                codec,
                use_gpu: gpu,
                position,
            };
            let path = tools::composite_image(&ffmpeg(config), &video, &options)?;
            Ok(report_written("Overlay", &path))
        }
        Commands::Thumbnail {
            video,
            at,
            output,
            width,
        } => {
            let path =
                tools::extract_thumbnail(&ffmpeg(config), &video, at, output.as_deref(), width)?;
            Ok(report_written("Thumbnail", &path))
        }
        Commands::Validate { file, json } => handle_validate(config, &file, json),
        Commands::Info { file } => handle_info(config, &file),
        Commands::Encoders => handle_encoders(config),
        Commands::Presets => handle_presets(config),
        Commands::CheckFfmpeg => handle_check_ffmpeg(config),
        Commands::InitConfig => handle_init_config(config_file),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from(path)
        }
        None => Config::load(),
    }
}

fn ffmpeg(config: &Config) -> FfmpegEngine {
    FfmpegEngine::new(&config.engine.ffmpeg_path)
}

fn report_written(what: &str, path: &Path) -> i32 {
    println!("{} written to {}", what, path.display());
    EXIT_OK
}

struct TranscodeOpts {
    input: PathBuf,
    resolutions: Vec<u32>,
    output_dir: Option<PathBuf>,
    workers: Option<usize>,
    timeout: Option<u64>,
    json: bool,
}

impl TranscodeOpts {
    fn request(self, config: &Config) -> TranscodeRequest {
        let resolutions = if self.resolutions.is_empty() {
            config.transcode.default_resolutions.clone()
        } else {
            self.resolutions
        };
        let output_dir = self.output_dir.unwrap_or_else(|| {
            self.input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .or_else(|| config.transcode.job_timeout());

        TranscodeRequest::new(self.input, resolutions, output_dir)
            .with_max_workers(Some(self.workers.unwrap_or(config.transcode.max_workers)))
            .with_timeout(timeout)
    }
}

fn handle_transcode(config: &Config, opts: TranscodeOpts) -> Result<i32> {
    let json = opts.json;
    let request = opts.request(config);

    let transcoder = Transcoder::new(Arc::new(ffmpeg(config)))
        .with_presets(config.preset_table()?)
        .with_preferred_encoder(config.engine.preferred_encoder.clone());
    let report = transcoder.run(request)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_report(&report);
    }

    Ok(exit_code(&report))
}

pub fn exit_code(report: &TranscodeReport) -> i32 {
    if report.is_fatal() || report.produced.is_empty() {
        EXIT_FATAL
    } else if report.has_failures() {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}

fn print_report(report: &TranscodeReport) {
    if let Some(fatal) = &report.fatal {
        eprintln!("Error: {}", fatal);
        return;
    }

    println!(
        "Transcoded {} with {}",
        report.input.display(),
        report.encoder.as_deref().unwrap_or("unknown encoder")
    );
    for result in &report.produced {
        println!(
            "  ok    {:>5}p  {}  ({:.1}s)",
            result.resolution,
            result.output_path.display(),
            result.elapsed_ms as f64 / 1000.0
        );
    }
    for result in &report.failures {
        let reason = result
            .failure
            .as_ref()
            .map(|f| format!("{:?}", f.kind))
            .unwrap_or_default();
        println!("  FAIL  {:>5}p  {}", result.resolution, reason);
        if let Some(diag) = result.diagnostics() {
            for line in diag.lines().rev().take(3).collect::<Vec<_>>().into_iter().rev() {
                println!("          {}", line);
            }
        }
    }
    println!(
        "{} produced, {} failed in {:.1}s",
        report.produced.len(),
        report.failures.len(),
        report.total_duration_ms as f64 / 1000.0
    );
}

fn handle_dry_run(config: &Config, opts: TranscodeOpts) -> Result<i32> {
    let request = opts.request(config);
    request.validate()?;

    let engine = ffmpeg(config);
    let Some(encoder) =
        engine::probe_encoder(&engine, config.engine.preferred_encoder.as_deref(), None)
    else {
        eprintln!("Error: {}", engine::FatalError::EncoderUnavailable);
        return Ok(EXIT_FATAL);
    };
    let presets = config.preset_table()?;

    println!(
        "Dry run: {} resolution(s) of {} with {}",
        request.resolutions.len(),
        request.input.display(),
        encoder
    );
    for &res in &request.resolutions {
        let job = TranscodeJob::new(&request.input, res, &request.output_dir);
        let (bitrate, preset) = presets.plan_for(res);
        let args = engine::build_transcode_args(&job, encoder, bitrate, preset);
        println!("{}", engine::format_command(engine.program(), &args));
    }
    Ok(EXIT_OK)
}

fn handle_validate(config: &Config, file: &Path, json: bool) -> Result<i32> {
    let verdict = probe::validate_video(&config.engine.ffprobe_path, file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else if verdict.valid {
        println!("OK: {}", verdict.reason);
    } else {
        println!("INVALID: {}", verdict.reason);
    }

    Ok(if verdict.valid { EXIT_OK } else { EXIT_FATAL })
}

fn handle_info(config: &Config, file: &Path) -> Result<i32> {
    probe::check_video_file(file)?;
    let info = probe::probe_input_info(&config.engine.ffprobe_path, file)?;

    println!("File:       {}", file.display());
    println!("Resolution: {}x{}", info.width, info.height);
    println!("Frame rate: {:.3} fps", info.fps);
    match info.duration {
        Some(d) => println!("Duration:   {:.2}s", d),
        None => println!("Duration:   unknown"),
    }
    Ok(EXIT_OK)
}

fn handle_encoders(config: &Config) -> Result<i32> {
    let engine = ffmpeg(config);
    let listing = engine.list_encoders(None)?;
    if !listing.success() {
        anyhow::bail!("ffmpeg -encoders failed ({})", listing.status_label());
    }

    let available = hardware::available_encoders(&listing.stdout);
    let chosen = hardware::select_encoder(&listing.stdout, config.engine.preferred_encoder.as_deref());

    if available.is_empty() {
        println!("No supported H.264 encoders found.");
        return Ok(EXIT_FATAL);
    }
    for encoder in available {
        let marker = if Some(encoder) == chosen { "*" } else { " " };
        let kind = if encoder.is_hardware() { "hardware" } else { "software" };
        println!(
            "{} {:<20} {:<9} {}",
            marker,
            encoder.ffmpeg_name(),
            kind,
            encoder.display_name()
        );
    }
    Ok(EXIT_OK)
}

fn handle_presets(config: &Config) -> Result<i32> {
    let table: PresetTable = config.preset_table()?;

    println!("{:>7}  {:>8}  preset", "height", "bitrate");
    for (height, plan) in table.iter() {
        println!("{:>6}p  {:>8}  {}", height, plan.bitrate, plan.preset);
    }
    println!(
        "  other  {:>8}  {}",
        engine::FALLBACK_BITRATE,
        engine::FALLBACK_PRESET
    );
    Ok(EXIT_OK)
}

fn handle_check_ffmpeg(config: &Config) -> Result<i32> {
    let version = engine::ffmpeg_version(&config.engine.ffmpeg_path)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&config.engine.ffprobe_path)?;
    println!("ffprobe found: {}", probe_version);
    Ok(EXIT_OK)
}

fn handle_init_config(explicit: Option<&Path>) -> Result<i32> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    if path.exists() {
        match Config::load_from(&path) {
            Ok(cfg) => {
                println!("Config loaded successfully from {}", path.display());
                println!("{:#?}", cfg);
                return Ok(EXIT_OK);
            }
            Err(e) => {
                println!("Config missing or invalid: {:#}", e);
                return Ok(EXIT_FATAL);
            }
        }
    }

    println!("Creating default config...");
    Config::default().save_to(&path)?;
    println!("Default config saved to {}", path.display());
    Ok(EXIT_OK)
}
