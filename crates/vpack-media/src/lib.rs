//! External tool glue for the vpack pipeline.
//!
//! This crate wraps the two opaque external processes the pipeline drives:
//! FFmpeg (rendition encodes, thumbnail and audio extraction, duration
//! probing) and MP4Box (segmentation and manifest generation). All heavy
//! work happens in child processes; this crate only builds argument lists,
//! spawns, and interprets exit codes and progress output.

pub mod capability;
pub mod command;
pub mod encode;
pub mod error;
pub mod extract;
pub mod package;
pub mod probe;
pub mod progress;

pub use capability::{detect_video_codec, VideoCodec};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use encode::encode_rendition;
pub use error::{MediaError, MediaResult};
pub use extract::{extract_audio, extract_thumbnail};
pub use package::{check_packager, run_packager, PackagerCommand, StreamKind};
pub use probe::media_duration;
pub use progress::EncodeProgress;
