//! Encoder progress reporting.
//!
//! Progress events are advisory only; nothing in the pipeline gates on
//! them.

/// Parsed state of FFmpeg's `-progress` key/value output.
#[derive(Debug, Clone, Default)]
pub struct EncodeProgress {
    /// Frames encoded so far
    pub frame: u64,
    /// Current encode rate in frames per second
    pub fps: f64,
    /// Output timestamp reached, in milliseconds
    pub out_time_ms: i64,
    /// Encode speed relative to realtime (1.0 = realtime)
    pub speed: f64,
    /// Whether the encoder reported `progress=end`
    pub is_complete: bool,
}

impl EncodeProgress {
    /// Percentage complete given the source duration in seconds.
    ///
    /// Returns `None` when the duration is unknown or nonsensical.
    pub fn percent(&self, duration_secs: f64) -> Option<u8> {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return None;
        }
        if self.is_complete {
            return Some(100);
        }
        let elapsed = self.out_time_ms.max(0) as f64 / 1000.0;
        let pct = (elapsed / duration_secs * 100.0).clamp(0.0, 100.0);
        Some(pct as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_duration() {
        let progress = EncodeProgress {
            out_time_ms: 30_000,
            ..Default::default()
        };
        assert_eq!(progress.percent(60.0), Some(50));
    }

    #[test]
    fn percent_clamps_past_end() {
        let progress = EncodeProgress {
            out_time_ms: 90_000,
            ..Default::default()
        };
        assert_eq!(progress.percent(60.0), Some(100));
    }

    #[test]
    fn percent_without_duration() {
        let progress = EncodeProgress::default();
        assert_eq!(progress.percent(0.0), None);
        assert_eq!(progress.percent(f64::NAN), None);
    }

    #[test]
    fn complete_is_always_full() {
        let progress = EncodeProgress {
            out_time_ms: 0,
            is_complete: true,
            ..Default::default()
        };
        assert_eq!(progress.percent(60.0), Some(100));
    }
}
