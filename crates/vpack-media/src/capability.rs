//! Hardware encoder capability detection.
//!
//! Candidates are probed once at worker start with a tiny synthetic encode;
//! the winning codec is a fixed decision reused by every job. This replaces
//! a per-encode fallback handshake.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// A concrete H.264 encoder implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// NVIDIA NVENC
    H264Nvenc,
    /// Intel Quick Sync
    H264Qsv,
    /// Software x264
    Libx264,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoCodec::H264Nvenc => "h264_nvenc",
            VideoCodec::H264Qsv => "h264_qsv",
            VideoCodec::Libx264 => "libx264",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, VideoCodec::Libx264)
    }

    /// The per-encoder constant-quality flag taking a rung's quality factor.
    pub fn quality_flag(&self) -> &'static str {
        match self {
            VideoCodec::H264Nvenc => "-cq",
            VideoCodec::H264Qsv => "-global_quality",
            VideoCodec::Libx264 => "-crf",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered candidates, best first. Software x264 is the unconditional
/// fallback and must stay last.
const CANDIDATES: [VideoCodec; 3] = [
    VideoCodec::H264Nvenc,
    VideoCodec::H264Qsv,
    VideoCodec::Libx264,
];

/// Pick the video encoder for this process.
///
/// When hardware acceleration is not preferred this returns software x264
/// without probing. Otherwise candidates are tried in order and the first
/// one that can encode a couple of synthetic frames wins.
pub async fn detect_video_codec(prefer_hwaccel: bool) -> MediaResult<VideoCodec> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

    if !prefer_hwaccel {
        return Ok(VideoCodec::Libx264);
    }

    for codec in CANDIDATES {
        if probe_codec(codec).await {
            if codec.is_hardware() {
                info!("selected hardware video encoder: {}", codec);
            } else {
                info!("hardware encoders unavailable, using {}", codec);
            }
            return Ok(codec);
        }
        debug!("video encoder {} failed probe", codec);
    }

    Err(MediaError::NoUsableCodec)
}

/// Encode two black frames to the null muxer with the candidate encoder.
async fn probe_codec(codec: VideoCodec) -> bool {
    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "color=c=black:s=128x72:r=30:d=0.2",
            "-frames:v",
            "2",
            "-c:v",
            codec.as_str(),
            "-f",
            "null",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    matches!(status, Ok(s) if s.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_names() {
        assert_eq!(VideoCodec::H264Nvenc.as_str(), "h264_nvenc");
        assert_eq!(VideoCodec::Libx264.as_str(), "libx264");
    }

    #[test]
    fn quality_flags_differ_per_encoder() {
        assert_eq!(VideoCodec::Libx264.quality_flag(), "-crf");
        assert_eq!(VideoCodec::H264Nvenc.quality_flag(), "-cq");
        assert_eq!(VideoCodec::H264Qsv.quality_flag(), "-global_quality");
    }

    #[test]
    fn software_fallback_is_last_candidate() {
        assert_eq!(*CANDIDATES.last().unwrap(), VideoCodec::Libx264);
        assert!(!VideoCodec::Libx264.is_hardware());
    }

    #[tokio::test]
    #[ignore = "requires FFmpeg"]
    async fn no_hwaccel_preference_skips_probing() {
        let codec = detect_video_codec(false).await.expect("detect codec");
        assert_eq!(codec, VideoCodec::Libx264);
    }
}
