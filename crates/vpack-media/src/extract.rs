//! Auxiliary extractions: thumbnail and audio track.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Width of the generated thumbnail; height follows the source aspect.
pub const THUMBNAIL_WIDTH: u32 = 480;
/// Where in the video the thumbnail frame is taken from.
pub const THUMBNAIL_OFFSET_SECS: f64 = 1.0;

/// Extract a single poster frame from the input.
pub async fn extract_thumbnail(input: &Path, output: &Path) -> MediaResult<PathBuf> {
    if !input.is_file() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    debug!(output = %output.display(), "extracting thumbnail");
    FfmpegRunner::new()
        .run(&thumbnail_command(input, output))
        .await?;
    Ok(output.to_path_buf())
}

fn thumbnail_command(input: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(THUMBNAIL_OFFSET_SECS)
        .single_frame()
        .video_filter(format!("scale={THUMBNAIL_WIDTH}:-2"))
}

/// Extract the audio track into a standalone file.
pub async fn extract_audio(
    input: &Path,
    output: &Path,
    audio_codec: &str,
    audio_bitrate: &str,
) -> MediaResult<PathBuf> {
    if !input.is_file() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    debug!(output = %output.display(), "extracting audio track");
    FfmpegRunner::new()
        .run(&audio_command(input, output, audio_codec, audio_bitrate))
        .await?;
    Ok(output.to_path_buf())
}

fn audio_command(input: &Path, output: &Path, codec: &str, bitrate: &str) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .output_arg("-vn")
        .audio_codec(codec)
        .output_args(["-b:a", bitrate])
}
