//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::progress::EncodeProgress;

/// Builder for a single FFmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Add an argument before `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add an argument after `-i`.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple arguments after `-i`.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek before decoding the input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{seconds:.3}"))
    }

    /// Set the video filter chain.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set the video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set the audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Emit exactly one output frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Full argument list for the invocation.
    ///
    /// Progress key/value output is routed to stderr so the runner can
    /// parse it line by line.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Spawns FFmpeg and waits for it, forwarding progress events.
///
/// There is no cancellation or timeout here; a watchdog is an external
/// collaborator's responsibility.
#[derive(Debug, Default)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run an FFmpeg command, discarding progress.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    /// Run an FFmpeg command, invoking `on_progress` for each progress
    /// report parsed from stderr.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(EncodeProgress) + Send + 'static,
    {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("running ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = match child.stderr.take() {
            Some(stderr) => stderr,
            None => return Err(MediaError::internal("ffmpeg stderr not captured")),
        };
        let mut lines = BufReader::new(stderr).lines();

        // Progress lines and diagnostics share stderr; the parser picks out
        // the key/value pairs and remembers the last diagnostic line.
        let reader_task = tokio::spawn(async move {
            let mut state = EncodeProgress::default();
            let mut last_diagnostic: Option<String> = None;

            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line, &mut state) {
                    ParsedLine::Report => on_progress(state.clone()),
                    ParsedLine::Field => {}
                    ParsedLine::Other => {
                        if !line.trim().is_empty() {
                            last_diagnostic = Some(line.trim().to_string());
                        }
                    }
                }
            }

            last_diagnostic
        });

        let status = child.wait().await?;
        let last_diagnostic = reader_task.await.unwrap_or(None);

        if status.success() {
            Ok(())
        } else {
            let message = last_diagnostic
                .unwrap_or_else(|| "ffmpeg exited with non-zero status".to_string());
            Err(MediaError::ffmpeg_failed(message, status.code()))
        }
    }
}

enum ParsedLine {
    /// A progress field was consumed
    Field,
    /// A full progress report is ready (the `progress=` terminator line)
    Report,
    /// Not part of -progress output
    Other,
}

fn parse_progress_line(line: &str, state: &mut EncodeProgress) -> ParsedLine {
    let Some((key, value)) = line.trim().split_once('=') else {
        return ParsedLine::Other;
    };

    match key {
        "frame" => {
            if let Ok(frame) = value.parse() {
                state.frame = frame;
            }
            ParsedLine::Field
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                state.fps = fps;
            }
            ParsedLine::Field
        }
        "out_time_ms" | "out_time_us" => {
            // Despite its name, out_time_ms has reported microseconds for
            // years; both keys carry the same value.
            if let Ok(us) = value.parse::<i64>() {
                state.out_time_ms = us / 1000;
            }
            ParsedLine::Field
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.parse().ok()) {
                state.speed = speed;
            }
            ParsedLine::Field
        }
        "progress" => {
            if value == "end" {
                state.is_complete = true;
            }
            ParsedLine::Report
        }
        _ => ParsedLine::Other,
    }
}

/// Check that FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check that FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_orders_sections() {
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4")
            .seek(1.0)
            .video_codec("libx264")
            .video_filter("scale=-2:240");

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let codec = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(ss < input, "seek must precede -i");
        assert!(input < codec, "codec must follow -i");
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert!(args.contains(&"-progress".to_string()));
    }

    #[test]
    fn parse_progress_fields() {
        let mut state = EncodeProgress::default();

        assert!(matches!(
            parse_progress_line("frame=120", &mut state),
            ParsedLine::Field
        ));
        assert_eq!(state.frame, 120);

        parse_progress_line("out_time_ms=5000000", &mut state);
        assert_eq!(state.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut state);
        assert!((state.speed - 1.5).abs() < 0.01);

        assert!(matches!(
            parse_progress_line("progress=end", &mut state),
            ParsedLine::Report
        ));
        assert!(state.is_complete);
    }

    #[test]
    fn diagnostic_lines_are_not_progress() {
        let mut state = EncodeProgress::default();
        assert!(matches!(
            parse_progress_line("[libx264 @ 0x55] broken header", &mut state),
            ParsedLine::Other
        ));
    }
}
