//! Source duration probing via ffprobe.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Read the container duration of a media file, in seconds.
pub async fn media_duration(input: impl AsRef<Path>) -> MediaResult<f64> {
    let input = input.as_ref();
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "json",
        ])
        .arg(input)
        .stdin(Stdio::null())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::probe_failed(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            stderr.trim()
        )));
    }

    let duration = parse_duration(&String::from_utf8_lossy(&output.stdout))?;
    debug!("probed duration of {}: {:.3}s", input.display(), duration);
    Ok(duration)
}

fn parse_duration(json: &str) -> MediaResult<f64> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| MediaError::probe_failed("no duration in ffprobe output"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_well_formed_output() {
        let json = r#"{"format": {"duration": "123.456000"}}"#;
        assert!((parse_duration(json).unwrap() - 123.456).abs() < 1e-6);
    }

    #[test]
    fn reject_missing_duration() {
        assert!(parse_duration(r#"{"format": {}}"#).is_err());
        assert!(parse_duration(r#"{}"#).is_err());
    }

    #[test]
    fn reject_zero_duration() {
        let json = r#"{"format": {"duration": "0.000000"}}"#;
        assert!(parse_duration(json).is_err());
    }
}
