use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// First line of `<program> -version`
fn tool_version(program: &Path) -> Result<String> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .with_context(|| {
            format!(
                "Failed to execute {}. Is it installed and in PATH?",
                program.display()
            )
        })?;

    if !output.status.success() {
        anyhow::bail!(
            "{} -version failed with status: {}",
            program.display(),
            output.status
        );
    }

    Ok(first_line(&String::from_utf8_lossy(&output.stdout)))
}

/// Check if ffmpeg is available and return its version
pub fn ffmpeg_version(program: &Path) -> Result<String> {
    tool_version(program)
}

/// Check if ffprobe is available and return its version
pub fn ffprobe_version(program: &Path) -> Result<String> {
    tool_version(program)
}

pub fn ffmpeg_available(program: &Path) -> bool {
    ffmpeg_version(program).is_ok()
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("Unknown version").to_string()
}
