//! Disease severity tiers from lesion ratio and lesion count.
//!
//! Tier 1 is the most severe, tier 9 the least. Explicit bands are checked in
//! priority order; anything no band catches is graded by a weighted score.

use crate::lesion_analysis::LeafLesionReport;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u8")]
pub enum SeverityTier {
    Tier1,
    Tier3,
    Tier5,
    Tier7,
    Tier9,
}

impl SeverityTier {
    pub fn value(self) -> u8 {
        match self {
            SeverityTier::Tier1 => 1,
            SeverityTier::Tier3 => 3,
            SeverityTier::Tier5 => 5,
            SeverityTier::Tier7 => 7,
            SeverityTier::Tier9 => 9,
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl TryFrom<u8> for SeverityTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SeverityTier::Tier1),
            3 => Ok(SeverityTier::Tier3),
            5 => Ok(SeverityTier::Tier5),
            7 => Ok(SeverityTier::Tier7),
            9 => Ok(SeverityTier::Tier9),
            other => Err(format!("Severity tier must be one of 1, 3, 5, 7, 9, got {other}")),
        }
    }
}

impl Serialize for SeverityTier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.value())
    }
}

/// Fallback score used when no band matches: `ratio * 10 + count / 20`.
pub fn severity_score(lesion_ratio: f64, lesion_count: u32) -> f64 {
    lesion_ratio * 10.0 + lesion_count as f64 / 20.0
}

/// Grade a leaf. The first matching band wins.
///
/// The bands leave gaps (e.g. ratio 0.5..0.6 with 40+ lesions) which fall
/// through to the score.
pub fn classify(lesion_ratio: f64, lesion_count: u32) -> SeverityTier {
    let r = lesion_ratio;
    let count = lesion_count;

    if count >= 60 && r > 0.6 {
        SeverityTier::Tier1
    } else if count >= 40 && (0.4..=0.5).contains(&r) {
        SeverityTier::Tier3
    } else if count >= 20 && (0.2..0.4).contains(&r) {
        SeverityTier::Tier5
    } else if count >= 5 && (0.05..0.2).contains(&r) {
        SeverityTier::Tier7
    } else if count < 5 && r < 0.05 {
        SeverityTier::Tier9
    } else {
        let score = severity_score(r, count);
        if score >= 6.0 {
            SeverityTier::Tier1
        } else if score >= 4.0 {
            SeverityTier::Tier3
        } else if score >= 2.5 {
            SeverityTier::Tier5
        } else if score >= 1.5 {
            SeverityTier::Tier7
        } else {
            SeverityTier::Tier9
        }
    }
}

impl LeafLesionReport {
    pub fn severity(&self) -> SeverityTier {
        classify(self.lesion_ratio, self.lesion_count)
    }
}
