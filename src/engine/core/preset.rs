//! Resolution → encoding plan lookup.
//!
//! The table is built once (builtin ladder plus optional config overrides)
//! and only read afterwards, so `plan_for` is a pure lookup that any number
//! of workers can call without synchronization.

use super::error::PresetError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bitrate used for heights missing from the table.
pub const FALLBACK_BITRATE: &str = "1500k";
/// Speed preset used for heights missing from the table.
pub const FALLBACK_PRESET: &str = "medium";

/// Standard ladder: (height, target video bitrate)
const BUILTIN_LADDER: &[(u32, &str)] = &[
    (240, "400k"),
    (360, "800k"),
    (480, "1200k"),
    (720, "2500k"),
    (1080, "5000k"),
    (1440, "8000k"),
    (2160, "16000k"),
];

/// Speed/quality tier of an x264-style preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    Fast,
    Balanced,
    Quality,
}

impl SpeedTier {
    /// Small outputs favour speed, large ones favour quality.
    pub fn for_height(height: u32) -> Self {
        match height {
            0..=360 => Self::Fast,
            361..=480 => Self::Balanced,
            _ => Self::Quality,
        }
    }

    pub fn preset_name(&self) -> &'static str {
        match self {
            Self::Fast => "veryfast",
            Self::Balanced => "fast",
            Self::Quality => "slow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPreset {
    pub bitrate: String,
    pub preset: String,
}

/// A `[[presets]]` entry from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetOverride {
    pub height: u32,
    pub bitrate: String,
    /// Defaults to the speed tier for `height` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetTable {
    entries: BTreeMap<u32, ResolutionPreset>,
}

impl PresetTable {
    pub fn builtin() -> Self {
        let entries = BUILTIN_LADDER
            .iter()
            .map(|&(height, bitrate)| {
                (
                    height,
                    ResolutionPreset {
                        bitrate: bitrate.to_string(),
                        preset: SpeedTier::for_height(height).preset_name().to_string(),
                    },
                )
            })
            .collect();

        Self { entries }
    }

    /// Builtin ladder with config entries replacing or extending it.
    pub fn with_overrides(overrides: &[PresetOverride]) -> Result<Self, PresetError> {
        let mut table = Self::builtin();

        for entry in overrides {
            if entry.height == 0 {
                return Err(PresetError::ZeroHeight);
            }
            if !is_valid_bitrate(&entry.bitrate) {
                return Err(PresetError::InvalidBitrate {
                    height: entry.height,
                    bitrate: entry.bitrate.clone(),
                });
            }
            let preset = match &entry.preset {
                Some(p) if p.trim().is_empty() => {
                    return Err(PresetError::EmptyPreset {
                        height: entry.height,
                    });
                }
                Some(p) => p.trim().to_string(),
                None => SpeedTier::for_height(entry.height)
                    .preset_name()
                    .to_string(),
            };

            table.entries.insert(
                entry.height,
                ResolutionPreset {
                    bitrate: entry.bitrate.trim().to_string(),
                    preset,
                },
            );
        }

        Ok(table)
    }

    /// (bitrate, preset) for a target height. Total: unknown heights get
    /// the fallback plan rather than an error.
    pub fn plan_for(&self, resolution: u32) -> (&str, &str) {
        match self.entries.get(&resolution) {
            Some(p) => (p.bitrate.as_str(), p.preset.as_str()),
            None => (FALLBACK_BITRATE, FALLBACK_PRESET),
        }
    }

    pub fn contains(&self, resolution: u32) -> bool {
        self.entries.contains_key(&resolution)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ResolutionPreset)> {
        self.entries.iter().map(|(h, p)| (*h, p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Accepts ffmpeg-style rates such as `800k`, `2.5M` or `1500000`: ASCII
/// digits with at most one `.`, then an optional single `k`/`M` suffix.
fn is_valid_bitrate(s: &str) -> bool {
    let digits = s
        .strip_suffix(['k', 'K', 'm', 'M'])
        .unwrap_or(s);
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(frac) {
        return false;
    }
    if digits.ends_with('.') {
        return false;
    }
    digits.parse::<f64>().is_ok_and(|v| v > 0.0)
}
