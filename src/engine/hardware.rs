//! Video encoder discovery and selection

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::engine::core::Engine;

// ============================================================================
// Video Encoder Selection
// ============================================================================

/// H.264 encoders we know how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoEncoder {
    // Software encoders
    Libx264,     // x264 (preferred)
    Libopenh264, // Cisco OpenH264 (ships with most distro builds)
    Mpeg4,       // native MPEG-4 part 2, always built in

    // Hardware encoders
    H264Nvenc,        // NVIDIA NVENC
    H264Qsv,          // Intel Quick Sync
    H264Vaapi,        // VAAPI (Intel/AMD)
    H264Videotoolbox, // Apple VideoToolbox
    H264Amf,          // AMD AMF
}

/// Selection order: best software, fallback software, then hardware
pub const ENCODER_PRIORITY: &[VideoEncoder] = &[
    VideoEncoder::Libx264,
    VideoEncoder::Libopenh264,
    VideoEncoder::Mpeg4,
    VideoEncoder::H264Nvenc,
    VideoEncoder::H264Qsv,
    VideoEncoder::H264Vaapi,
    VideoEncoder::H264Videotoolbox,
    VideoEncoder::H264Amf,
];

impl VideoEncoder {
    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Libopenh264 => "libopenh264",
            Self::Mpeg4 => "mpeg4",
            Self::H264Nvenc => "h264_nvenc",
            Self::H264Qsv => "h264_qsv",
            Self::H264Vaapi => "h264_vaapi",
            Self::H264Videotoolbox => "h264_videotoolbox",
            Self::H264Amf => "h264_amf",
        }
    }

    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        ENCODER_PRIORITY
            .iter()
            .copied()
            .find(|e| e.ffmpeg_name() == name)
    }

    /// Check if this is a hardware encoder
    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Libx264 | Self::Libopenh264 | Self::Mpeg4)
    }

    /// Whether the encoder understands x264-style `-preset` names
    /// (veryfast, fast, medium, slow). Others get no `-preset` at all.
    pub fn accepts_named_preset(&self) -> bool {
        matches!(self, Self::Libx264 | Self::H264Qsv)
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Libx264 => "x264 (Software)",
            Self::Libopenh264 => "OpenH264 (Software)",
            Self::Mpeg4 => "MPEG-4 Part 2 (Software)",
            Self::H264Nvenc => "H.264 NVENC (NVIDIA)",
            Self::H264Qsv => "H.264 Quick Sync (Intel)",
            Self::H264Vaapi => "H.264 VAAPI (Hardware)",
            Self::H264Videotoolbox => "H.264 VideoToolbox (Apple)",
            Self::H264Amf => "H.264 AMF (AMD)",
        }
    }
}

impl std::fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Encoders from our priority list that appear in an `ffmpeg -encoders`
/// listing, in priority order.
///
/// Matches whole whitespace-separated tokens so `libx264rgb` does not count
/// as `libx264`.
pub fn available_encoders(listing: &str) -> Vec<VideoEncoder> {
    ENCODER_PRIORITY
        .iter()
        .copied()
        .filter(|e| {
            listing
                .split_whitespace()
                .any(|token| token == e.ffmpeg_name())
        })
        .collect()
}

/// Pick the encoder for a run from a listing.
///
/// A preferred encoder wins when it is present; otherwise the first hit in
/// [`ENCODER_PRIORITY`] is used.
pub fn select_encoder(listing: &str, preferred: Option<&str>) -> Option<VideoEncoder> {
    let available = available_encoders(listing);

    if let Some(pref) = preferred {
        match VideoEncoder::from_ffmpeg_name(pref) {
            Some(encoder) if available.contains(&encoder) => return Some(encoder),
            Some(_) => warn!(preferred = pref, "Preferred encoder not available, using fallback"),
            None => warn!(preferred = pref, "Preferred encoder is not a supported H.264 encoder"),
        }
    }

    available.first().copied()
}

/// Query the engine once and choose the encoder for a whole request.
///
/// A failed, unreadable or timed-out listing counts as "nothing installed"
/// and yields `None`; the caller decides whether that is fatal.
pub fn probe_encoder(
    engine: &dyn Engine,
    preferred: Option<&str>,
    deadline: Option<Instant>,
) -> Option<VideoEncoder> {
    let listing = match engine.list_encoders(deadline) {
        Ok(output) if output.success() => output.stdout,
        Ok(output) => {
            warn!(
                status = %output.status_label(),
                stderr = %output.stderr_tail(5),
                "Encoder listing failed; treating as no encoders"
            );
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Could not run encoder listing; treating as no encoders");
            return None;
        }
    };

    debug!(
        found = ?available_encoders(&listing),
        "Encoders discovered"
    );

    let choice = select_encoder(&listing, preferred);
    match choice {
        Some(encoder) => info!(
            encoder = encoder.ffmpeg_name(),
            hardware = encoder.is_hardware(),
            "Selected video encoder"
        ),
        None => warn!("No supported video encoder found"),
    }
    choice
}
