use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Maximum distance from a reference ratio (16/9 or 9/16) that still counts as a match.
pub const ASPECT_RATIO_TOLERANCE: f64 = 0.02;

const LANDSCAPE_RATIO: f64 = 16.0 / 9.0;
const PORTRAIT_RATIO: f64 = 9.0 / 16.0;

/// Visual orientation of a video, derived from its primary stream dimensions.
///
/// The orientation is part of the storage key, so classification must be a pure
/// function of `(width, height)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Landscape,
    Portrait,
    #[serde(rename = "square-or-unclassified")]
    Other,
}

impl Orientation {
    /// Classify by the `width / height` ratio.
    ///
    /// A zero height never matches either reference ratio and yields `Other`.
    pub fn classify(width: u32, height: u32) -> Self {
        if height == 0 {
            return Orientation::Other;
        }
        let ratio = width as f64 / height as f64;
        if (ratio - LANDSCAPE_RATIO).abs() <= ASPECT_RATIO_TOLERANCE {
            Orientation::Landscape
        } else if (ratio - PORTRAIT_RATIO).abs() <= ASPECT_RATIO_TOLERANCE {
            Orientation::Portrait
        } else {
            Orientation::Other
        }
    }

    /// Leading path segment used in storage keys.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Other => "other",
        }
    }
}

impl Display for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Orientation::Landscape => write!(f, "landscape"),
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Other => write!(f, "square-or-unclassified"),
        }
    }
}
