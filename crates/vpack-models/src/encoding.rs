//! Process-wide encoder tunables.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default encoding preset
pub const DEFAULT_PRESET: &str = "veryfast";
/// Default keyframe interval in frames; segment boundaries must land on
/// keyframes, so this is also the smallest addressable segment unit
pub const DEFAULT_KEYINT: u32 = 48;
/// Default number of B-frames between references
pub const DEFAULT_BFRAMES: u32 = 2;
/// Default number of reference frames
pub const DEFAULT_REFS: u32 = 3;
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default ceiling on simultaneous heavy encode processes per worker
pub const DEFAULT_ENCODE_CONCURRENCY: usize = 4;

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_keyint() -> u32 {
    DEFAULT_KEYINT
}
fn default_bframes() -> u32 {
    DEFAULT_BFRAMES
}
fn default_refs() -> u32 {
    DEFAULT_REFS
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_encode_concurrency() -> usize {
    DEFAULT_ENCODE_CONCURRENCY
}

/// Encoder settings shared by every rung of every job in the process.
///
/// Loaded once at worker start and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingProfile {
    /// Speed/quality preset (e.g. "veryfast", "medium")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Optional tuning mode (e.g. "film", "zerolatency")
    #[serde(default)]
    pub tune: Option<String>,

    /// Keyframe interval in frames
    #[serde(default = "default_keyint")]
    pub keyint: u32,

    /// B-frame count
    #[serde(default = "default_bframes")]
    pub bframes: u32,

    /// Reference frame count
    #[serde(default = "default_refs")]
    pub refs: u32,

    /// Encoder thread count; 0 lets the encoder pick
    #[serde(default)]
    pub threads: u32,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Prefer a hardware-accelerated video encoder when one probes OK
    #[serde(default)]
    pub prefer_hwaccel: bool,

    /// Ceiling on simultaneous heavy encode processes across all jobs
    #[serde(default = "default_encode_concurrency")]
    pub encode_concurrency: usize,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            preset: default_preset(),
            tune: None,
            keyint: DEFAULT_KEYINT,
            bframes: DEFAULT_BFRAMES,
            refs: DEFAULT_REFS,
            threads: 0,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            prefer_hwaccel: false,
            encode_concurrency: DEFAULT_ENCODE_CONCURRENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile() {
        let profile = EncodingProfile::default();
        assert_eq!(profile.preset, "veryfast");
        assert_eq!(profile.keyint, 48);
        assert_eq!(profile.encode_concurrency, 4);
        assert!(!profile.prefer_hwaccel);
        assert!(profile.tune.is_none());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let profile: EncodingProfile = serde_json::from_str("{}").unwrap();
        assert_eq!(profile.audio_codec, "aac");
        assert_eq!(profile.bframes, 2);
        assert_eq!(profile.threads, 0);
    }
}
