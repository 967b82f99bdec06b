//! Per-rung rendition encoding.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use vpack_models::{EncodingProfile, RungSpec};

use crate::capability::VideoCodec;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::progress::EncodeProgress;

/// Encode one rung of the ladder from a materialized local input.
///
/// The caller is responsible for holding a concurrency permit for the
/// duration of this call and for removing partial output during workspace
/// teardown if the encode fails.
pub async fn encode_rendition<F>(
    input: &Path,
    out_dir: &Path,
    rung: &RungSpec,
    profile: &EncodingProfile,
    codec: VideoCodec,
    on_progress: F,
) -> MediaResult<PathBuf>
where
    F: Fn(EncodeProgress) + Send + 'static,
{
    if !input.is_file() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let output = out_dir.join(rung.output_filename());
    let cmd = rendition_command(input, &output, rung, profile, codec);

    debug!(rung = %rung.name, codec = %codec, "encoding rendition");
    FfmpegRunner::new()
        .run_with_progress(&cmd, on_progress)
        .await?;

    info!(rung = %rung.name, output = %output.display(), "rendition encoded");
    Ok(output)
}

/// Build the FFmpeg invocation for one rung.
fn rendition_command(
    input: &Path,
    output: &Path,
    rung: &RungSpec,
    profile: &EncodingProfile,
    codec: VideoCodec,
) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(input, output)
        .video_filter(&rung.scale)
        .video_codec(codec.as_str())
        .output_args(["-preset", &profile.preset]);

    if let Some(tune) = &profile.tune {
        cmd = cmd.output_args(["-tune", tune]);
    }

    // Constant quality capped by the rung's bitrate target: crf/cq picks
    // the quality, maxrate+bufsize keeps the stream deliverable.
    cmd = cmd
        .output_args([codec.quality_flag(), &rung.crf.to_string()])
        .output_args(["-b:v", &rung.video_bitrate])
        .output_args(["-maxrate", &rung.video_bitrate])
        .output_args(["-bufsize", &double_bitrate(&rung.video_bitrate)]);

    // Fixed keyframe cadence so segment boundaries align across rungs.
    let keyint = profile.keyint.to_string();
    cmd = cmd
        .output_args(["-g", &keyint])
        .output_args(["-keyint_min", &keyint])
        .output_args(["-sc_threshold", "0"])
        .output_args(["-bf", &profile.bframes.to_string()])
        .output_args(["-refs", &profile.refs.to_string()]);

    if profile.threads > 0 {
        cmd = cmd.output_args(["-threads", &profile.threads.to_string()]);
    }

    cmd.audio_codec(&profile.audio_codec)
        .output_args(["-b:a", &profile.audio_bitrate])
        .output_args(["-movflags", "+faststart"])
}

/// Double a bitrate string like "2500k" for the VBV buffer size.
///
/// Unparseable values fall back to the original string; FFmpeg will then
/// size the buffer equal to maxrate, which is safe.
fn double_bitrate(bitrate: &str) -> String {
    let (digits, suffix) = bitrate.split_at(
        bitrate
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(bitrate.len()),
    );
    match digits.parse::<u64>() {
        Ok(n) => format!("{}{}", n * 2, suffix),
        Err(_) => bitrate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args_for(codec: VideoCodec) -> Vec<String> {
        let rung = RungSpec::new("720p", 720, "2500k", 26);
        let profile = EncodingProfile::default();
        rendition_command(
            &PathBuf::from("source.mp4"),
            &PathBuf::from("720p.mp4"),
            &rung,
            &profile,
            codec,
        )
        .build_args()
    }

    #[test]
    fn software_encode_uses_crf() {
        let args = args_for(VideoCodec::Libx264);
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(!args.contains(&"-cq".to_string()));
        assert!(args.contains(&"scale=-2:720".to_string()));
        assert!(args.contains(&"-maxrate".to_string()));
        assert!(args.contains(&"5000k".to_string()), "bufsize is 2x bitrate");
    }

    #[test]
    fn hardware_encode_uses_cq() {
        let args = args_for(VideoCodec::H264Nvenc);
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string()));
        assert!(!args.contains(&"-crf".to_string()));
    }

    #[test]
    fn keyframe_cadence_is_pinned() {
        let args = args_for(VideoCodec::Libx264);
        let g = args.iter().position(|a| a == "-g").unwrap();
        assert_eq!(args[g + 1], "48");
        assert!(args.contains(&"-sc_threshold".to_string()));
    }

    #[test]
    fn tune_only_when_set() {
        let rung = RungSpec::new("240p", 240, "350k", 30);
        let profile = EncodingProfile {
            tune: Some("film".to_string()),
            ..Default::default()
        };
        let args = rendition_command(
            &PathBuf::from("source.mp4"),
            &PathBuf::from("240p.mp4"),
            &rung,
            &profile,
            VideoCodec::Libx264,
        )
        .build_args();
        assert!(args.contains(&"-tune".to_string()));
        assert!(args.contains(&"film".to_string()));

        assert!(!args_for(VideoCodec::Libx264).contains(&"-tune".to_string()));
    }

    #[test]
    fn double_bitrate_handles_suffixes() {
        assert_eq!(double_bitrate("2500k"), "5000k");
        assert_eq!(double_bitrate("4M"), "8M");
        assert_eq!(double_bitrate("800000"), "1600000");
        assert_eq!(double_bitrate("auto"), "auto");
    }
}
