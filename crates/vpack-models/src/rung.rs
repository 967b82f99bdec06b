//! Adaptive bitrate ladder definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// One target quality tier in the adaptive ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RungSpec {
    /// Symbolic name, e.g. "720p"
    pub name: String,

    /// FFmpeg scale filter expression for this rung
    pub scale: String,

    /// Target video bitrate, e.g. "2500k"
    pub video_bitrate: String,

    /// Target quality factor (CRF for software, CQ for hardware encoders)
    pub crf: u8,

    /// Whether this rung is encoded at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RungSpec {
    /// Create an enabled rung targeting the given output height.
    ///
    /// Width is derived from the source aspect ratio, rounded to an even
    /// number as required by H.264.
    pub fn new(name: impl Into<String>, height: u32, video_bitrate: impl Into<String>, crf: u8) -> Self {
        Self {
            name: name.into(),
            scale: format!("scale=-2:{height}"),
            video_bitrate: video_bitrate.into(),
            crf,
            enabled: true,
        }
    }

    /// Mark the rung as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// File name of this rung's muxed output inside the workspace.
    pub fn output_filename(&self) -> String {
        format!("{}.mp4", self.name)
    }
}

/// The full quality ladder for a worker process.
///
/// The enabled subset is read once at job start and is fixed for the
/// lifetime of that job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Ladder {
    pub rungs: Vec<RungSpec>,
}

impl Default for Ladder {
    fn default() -> Self {
        Self::standard()
    }
}

impl Ladder {
    /// The standard five-rung H.264 ladder.
    pub fn standard() -> Self {
        Self {
            rungs: vec![
                RungSpec::new("240p", 240, "350k", 30),
                RungSpec::new("360p", 360, "700k", 30),
                RungSpec::new("480p", 480, "1200k", 28),
                RungSpec::new("720p", 720, "2500k", 26),
                RungSpec::new("1080p", 1080, "4500k", 24),
            ],
        }
    }

    /// Iterate over the enabled rungs.
    pub fn enabled(&self) -> impl Iterator<Item = &RungSpec> {
        self.rungs.iter().filter(|r| r.enabled)
    }

    /// Number of enabled rungs.
    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }

    /// A ladder with no enabled rungs produces no useful output; callers
    /// fail fast when this returns false.
    pub fn has_enabled(&self) -> bool {
        self.rungs.iter().any(|r| r.enabled)
    }

    /// Restrict the enabled set to the named rungs.
    ///
    /// An empty name list leaves the ladder unchanged.
    pub fn restrict_to(mut self, names: &[String]) -> Self {
        if names.is_empty() {
            return self;
        }
        for rung in &mut self.rungs {
            rung.enabled = names.iter().any(|n| n == &rung.name);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ladder_is_fully_enabled() {
        let ladder = Ladder::standard();
        assert_eq!(ladder.rungs.len(), 5);
        assert_eq!(ladder.enabled_count(), 5);
        assert!(ladder.has_enabled());
    }

    #[test]
    fn restrict_to_disables_unnamed_rungs() {
        let ladder =
            Ladder::standard().restrict_to(&["240p".to_string(), "720p".to_string()]);
        let enabled: Vec<_> = ladder.enabled().map(|r| r.name.as_str()).collect();
        assert_eq!(enabled, vec!["240p", "720p"]);
    }

    #[test]
    fn restrict_to_empty_keeps_ladder() {
        let ladder = Ladder::standard().restrict_to(&[]);
        assert_eq!(ladder.enabled_count(), 5);
    }

    #[test]
    fn restrict_to_unknown_name_disables_everything() {
        let ladder = Ladder::standard().restrict_to(&["4320p".to_string()]);
        assert!(!ladder.has_enabled());
    }

    #[test]
    fn rung_scale_is_even_width() {
        let rung = RungSpec::new("720p", 720, "2500k", 26);
        assert_eq!(rung.scale, "scale=-2:720");
        assert_eq!(rung.output_filename(), "720p.mp4");
    }
}
