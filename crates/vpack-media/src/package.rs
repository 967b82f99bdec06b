//! Segmentation and manifest generation via MP4Box.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};
use vpack_models::ManifestFormat;

use crate::error::{MediaError, MediaResult};

/// Stream selector applied to a rendition file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn selector(&self) -> &'static str {
        match self {
            StreamKind::Video => "#video",
            StreamKind::Audio => "#audio",
        }
    }
}

/// Builder for one MP4Box segmentation invocation.
///
/// Each invocation produces one manifest that enumerates every referenced
/// rendition as an alternative quality level.
#[derive(Debug, Clone)]
pub struct PackagerCommand {
    segment_ms: u32,
    manifest_path: PathBuf,
    profile: String,
    inputs: Vec<(PathBuf, StreamKind)>,
}

impl PackagerCommand {
    pub fn new(segment_ms: u32, manifest_path: impl AsRef<Path>) -> Self {
        Self {
            segment_ms,
            manifest_path: manifest_path.as_ref().to_path_buf(),
            profile: packager_profile(ManifestFormat::Dash).to_string(),
            inputs: Vec::new(),
        }
    }

    /// Build a command preconfigured for the given manifest format.
    pub fn for_format(
        segment_ms: u32,
        manifest_path: impl AsRef<Path>,
        format: ManifestFormat,
    ) -> Self {
        let mut cmd = Self::new(segment_ms, manifest_path);
        cmd.profile = packager_profile(format).to_string();
        cmd
    }

    /// Reference one stream of a rendition file.
    pub fn input(mut self, path: impl AsRef<Path>, kind: StreamKind) -> Self {
        self.inputs.push((path.as_ref().to_path_buf(), kind));
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-dash".to_string(),
            self.segment_ms.to_string(),
            "-rap".to_string(),
            "-frag-rap".to_string(),
            "-profile".to_string(),
            self.profile.clone(),
            "-out".to_string(),
            self.manifest_path.to_string_lossy().to_string(),
        ];
        for (path, kind) in &self.inputs {
            args.push(format!("{}{}", path.to_string_lossy(), kind.selector()));
        }
        args
    }
}

/// MP4Box DASH profile per manifest format.
fn packager_profile(format: ManifestFormat) -> &'static str {
    match format {
        ManifestFormat::Dash => "dashavc264:onDemand",
        ManifestFormat::Hls => "live",
    }
}

/// Run one segmentation invocation. Exit code 0 is the only success signal.
pub async fn run_packager(cmd: &PackagerCommand) -> MediaResult<()> {
    which::which("MP4Box").map_err(|_| MediaError::PackagerNotFound)?;

    let args = cmd.build_args();
    debug!("running MP4Box {}", args.join(" "));

    let output = Command::new("MP4Box")
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await?;

    if output.status.success() {
        info!(manifest = %cmd.manifest_path.display(), "segmentation complete");
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr.lines().last().unwrap_or("").trim().to_string();
        let message = if tail.is_empty() {
            "MP4Box exited with non-zero status".to_string()
        } else {
            tail
        };
        Err(MediaError::packager_failed(message, output.status.code()))
    }
}

/// Check that MP4Box is available.
pub fn check_packager() -> MediaResult<PathBuf> {
    which::which("MP4Box").map_err(|_| MediaError::PackagerNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_reference_every_stream() {
        let cmd = PackagerCommand::for_format(4000, "out/manifest.mpd", ManifestFormat::Dash)
            .input("240p.mp4", StreamKind::Video)
            .input("240p.mp4", StreamKind::Audio)
            .input("720p.mp4", StreamKind::Video)
            .input("720p.mp4", StreamKind::Audio);

        let args = cmd.build_args();
        assert_eq!(args[0], "-dash");
        assert_eq!(args[1], "4000");
        assert!(args.contains(&"240p.mp4#video".to_string()));
        assert!(args.contains(&"240p.mp4#audio".to_string()));
        assert!(args.contains(&"720p.mp4#video".to_string()));
        assert!(args.contains(&"720p.mp4#audio".to_string()));

        let out = args.iter().position(|a| a == "-out").unwrap();
        assert_eq!(args[out + 1], "out/manifest.mpd");
    }

    #[test]
    fn profiles_differ_per_format() {
        let dash = PackagerCommand::for_format(4000, "manifest.mpd", ManifestFormat::Dash);
        let hls = PackagerCommand::for_format(4000, "master.m3u8", ManifestFormat::Hls);
        assert!(dash.build_args().contains(&"dashavc264:onDemand".to_string()));
        assert!(hls.build_args().contains(&"live".to_string()));
    }
}
