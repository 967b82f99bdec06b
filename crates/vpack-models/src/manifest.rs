//! Manifest output selection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which manifest formats the packaging step should produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ManifestMode {
    /// DASH only
    Dash,
    /// HLS only
    Hls,
    /// Both DASH and HLS
    #[default]
    Both,
    /// Skip packaging entirely; publish the muxed renditions as-is
    None,
}

impl ManifestMode {
    /// The concrete formats to produce, in invocation order.
    pub fn formats(&self) -> Vec<ManifestFormat> {
        match self {
            ManifestMode::Dash => vec![ManifestFormat::Dash],
            ManifestMode::Hls => vec![ManifestFormat::Hls],
            ManifestMode::Both => vec![ManifestFormat::Dash, ManifestFormat::Hls],
            ManifestMode::None => Vec::new(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestMode::Dash => "dash",
            ManifestMode::Hls => "hls",
            ManifestMode::Both => "both",
            ManifestMode::None => "none",
        }
    }
}

impl FromStr for ManifestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dash" => Ok(ManifestMode::Dash),
            "hls" => Ok(ManifestMode::Hls),
            "both" => Ok(ManifestMode::Both),
            "none" => Ok(ManifestMode::None),
            other => Err(format!("unknown manifest mode: {other}")),
        }
    }
}

impl fmt::Display for ManifestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manifest format produced by a single segmenter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ManifestFormat {
    Dash,
    Hls,
}

impl ManifestFormat {
    /// File name of the top-level manifest for this format.
    pub fn manifest_filename(&self) -> &'static str {
        match self {
            ManifestFormat::Dash => "manifest.mpd",
            ManifestFormat::Hls => "master.m3u8",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestFormat::Dash => "dash",
            ManifestFormat::Hls => "hls",
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!("dash".parse::<ManifestMode>().unwrap(), ManifestMode::Dash);
        assert_eq!("HLS".parse::<ManifestMode>().unwrap(), ManifestMode::Hls);
        assert_eq!("both".parse::<ManifestMode>().unwrap(), ManifestMode::Both);
        assert_eq!("none".parse::<ManifestMode>().unwrap(), ManifestMode::None);
        assert!("cmaf".parse::<ManifestMode>().is_err());
    }

    #[test]
    fn both_produces_dash_then_hls() {
        assert_eq!(
            ManifestMode::Both.formats(),
            vec![ManifestFormat::Dash, ManifestFormat::Hls]
        );
        assert!(ManifestMode::None.formats().is_empty());
    }

    #[test]
    fn manifest_filenames() {
        assert_eq!(ManifestFormat::Dash.manifest_filename(), "manifest.mpd");
        assert_eq!(ManifestFormat::Hls.manifest_filename(), "master.m3u8");
    }
}
