//! RSSI to distance bucket classification.
//!
//! Signal strength is a coarse distance proxy. Samples are mapped onto four
//! fixed buckets whose boundaries match the copy shown to the user:
//!
//! | RSSI (dBm)          | Level    | Text   |
//! |---------------------|----------|--------|
//! | `rssi > -50`        | `close`  | `< 1m` |
//! | `-70 < rssi <= -50` | `near`   | `1-3m` |
//! | `-85 < rssi <= -70` | `medium` | `3-5m` |
//! | `rssi <= -85`       | `far`    | `> 5m` |

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Strongest boundary: anything above is `close`.
pub const CLOSE_ABOVE_DBM: i16 = -50;

/// Anything above (and at or below [`CLOSE_ABOVE_DBM`]) is `near`.
pub const NEAR_ABOVE_DBM: i16 = -70;

/// Anything above (and at or below [`NEAR_ABOVE_DBM`]) is `medium`.
pub const MEDIUM_ABOVE_DBM: i16 = -85;

/// Discrete distance bucket, ordered by farness.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DistanceLevel {
    /// Less than a metre away.
    Close,
    /// One to three metres.
    Near,
    /// Three to five metres.
    Medium,
    /// More than five metres.
    Far,
}

impl DistanceLevel {
    /// Whether this bucket counts as "away" for alerting (`medium` or `far`).
    #[must_use]
    pub const fn is_away(self) -> bool {
        matches!(self, Self::Medium | Self::Far)
    }

    /// User-facing distance range.
    #[must_use]
    pub const fn text(self) -> &'static str {
        match self {
            Self::Close => "< 1m",
            Self::Near => "1-3m",
            Self::Medium => "3-5m",
            Self::Far => "> 5m",
        }
    }

    /// Lowercase identifier, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Near => "near",
            Self::Medium => "medium",
            Self::Far => "far",
        }
    }
}

impl std::fmt::Display for DistanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one signal sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[schema(example = json!({ "text": "1-3m", "level": "near" }))]
pub struct DistanceInfo {
    /// User-facing distance range.
    #[schema(value_type = String, example = "1-3m")]
    pub text: &'static str,

    /// Distance bucket.
    pub level: DistanceLevel,
}

/// Classify an RSSI sample (dBm) into a distance bucket.
///
/// Total over every `i16`; there is no error case.
#[must_use]
pub const fn classify(rssi: i16) -> DistanceInfo {
    let level = if rssi > CLOSE_ABOVE_DBM {
        DistanceLevel::Close
    } else if rssi > NEAR_ABOVE_DBM {
        DistanceLevel::Near
    } else if rssi > MEDIUM_ABOVE_DBM {
        DistanceLevel::Medium
    } else {
        DistanceLevel::Far
    };

    DistanceInfo {
        text: level.text(),
        level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(rssi: i16) -> DistanceLevel {
        classify(rssi).level
    }

    #[test]
    fn test_close_boundary() {
        assert_eq!(level(-49), DistanceLevel::Close);
        assert_eq!(level(-50), DistanceLevel::Near);
        assert_eq!(classify(-49).text, "< 1m");
    }

    #[test]
    fn test_near_boundary() {
        assert_eq!(level(-69), DistanceLevel::Near);
        assert_eq!(level(-70), DistanceLevel::Medium);
        assert_eq!(classify(-60).text, "1-3m");
    }

    #[test]
    fn test_medium_boundary() {
        assert_eq!(level(-84), DistanceLevel::Medium);
        assert_eq!(level(-85), DistanceLevel::Far);
        assert_eq!(classify(-80).text, "3-5m");
        assert_eq!(classify(-85).text, "> 5m");
    }

    #[test]
    fn test_extremes_are_total() {
        assert_eq!(level(i16::MAX), DistanceLevel::Close);
        assert_eq!(level(0), DistanceLevel::Close);
        assert_eq!(level(i16::MIN), DistanceLevel::Far);
        assert_eq!(level(-127), DistanceLevel::Far);
    }

    #[test]
    fn test_scenario_sequence() {
        let levels: Vec<_> = [-40, -60, -90, -95, -60].into_iter().map(level).collect();
        assert_eq!(
            levels,
            vec![
                DistanceLevel::Close,
                DistanceLevel::Near,
                DistanceLevel::Far,
                DistanceLevel::Far,
                DistanceLevel::Near,
            ]
        );
    }

    #[test]
    fn test_away_classes() {
        assert!(!DistanceLevel::Close.is_away());
        assert!(!DistanceLevel::Near.is_away());
        assert!(DistanceLevel::Medium.is_away());
        assert!(DistanceLevel::Far.is_away());
        assert!(DistanceLevel::Close < DistanceLevel::Far);
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let json = serde_json::to_string(&classify(-90)).unwrap();
        assert_eq!(json, r#"{"text":"> 5m","level":"far"}"#);
    }
}
