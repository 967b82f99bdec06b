//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use vpack_models::{EncodingProfile, Ladder, ManifestMode};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Work directory for per-job workspaces
    pub work_dir: PathBuf,
    /// Directory holding job ownership lease files
    pub lock_dir: PathBuf,
    /// Lease lifetime; an older lease from a crashed worker may be reclaimed
    pub lock_ttl: Duration,
    /// Which manifests to produce
    pub manifest_mode: ManifestMode,
    /// Segment duration passed to the packager, in milliseconds
    pub segment_ms: u32,
    /// Keep muxed rendition files alongside packaged output
    pub keep_renditions: bool,
    /// How often the worker scans for orphaned pending jobs
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Encoding parameters shared by every rung
    pub profile: EncodingProfile,
    /// The rendition ladder
    pub ladder: Ladder,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/vpack/work"),
            lock_dir: PathBuf::from("/tmp/vpack/locks"),
            lock_ttl: Duration::from_secs(1800),
            manifest_mode: ManifestMode::default(),
            segment_ms: 4000,
            keep_renditions: false,
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            profile: EncodingProfile::default(),
            ladder: Ladder::standard(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let manifest_mode = match std::env::var("MANIFEST_MODE") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Invalid MANIFEST_MODE '{}', using default", raw);
                ManifestMode::default()
            }),
            Err(_) => ManifestMode::default(),
        };

        let mut ladder = Ladder::standard();
        if let Ok(raw) = std::env::var("ENABLED_RUNGS") {
            let names: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            ladder = ladder.restrict_to(&names);
        }

        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/vpack/work")),
            lock_dir: std::env::var("WORKER_LOCK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/vpack/locks")),
            lock_ttl: Duration::from_secs(
                std::env::var("WORKER_LOCK_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            manifest_mode,
            segment_ms: std::env::var("SEGMENT_DURATION_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4000),
            keep_renditions: std::env::var("KEEP_RENDITIONS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            profile: profile_from_env(),
            ladder,
        }
    }
}

fn profile_from_env() -> EncodingProfile {
    let defaults = EncodingProfile::default();
    EncodingProfile {
        preset: std::env::var("ENCODE_PRESET").unwrap_or(defaults.preset),
        tune: std::env::var("ENCODE_TUNE").ok().filter(|s| !s.is_empty()),
        keyint: std::env::var("ENCODE_KEYINT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.keyint),
        bframes: std::env::var("ENCODE_BFRAMES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.bframes),
        refs: std::env::var("ENCODE_REFS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.refs),
        threads: std::env::var("ENCODE_THREADS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.threads),
        audio_codec: defaults.audio_codec,
        audio_bitrate: std::env::var("ENCODE_AUDIO_BITRATE").unwrap_or(defaults.audio_bitrate),
        prefer_hwaccel: std::env::var("ENCODE_HWACCEL")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.prefer_hwaccel),
        encode_concurrency: std::env::var("ENCODE_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.encode_concurrency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.segment_ms, 4000);
        assert_eq!(config.manifest_mode, ManifestMode::Both);
        assert!(!config.keep_renditions);
        assert!(config.ladder.has_enabled());
    }
}
