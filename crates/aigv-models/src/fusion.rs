//! Branch fusion results and verdicts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ConfigError;

/// Weight of the RGB-frame branch in the combined probability.
pub const ORIGINAL_BRANCH_WEIGHT: f64 = 0.5;

/// Weight of the optical-flow branch in the combined probability.
pub const FLOW_BRANCH_WEIGHT: f64 = 0.5;

/// Default decision threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Accept a decision threshold within `[0, 1]`.
///
/// Outside that range every combined probability lands on the same side, so
/// the verdict no longer depends on the video.
pub fn validate_threshold(threshold: f64) -> Result<f64, ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ConfigError::Invalid(format!(
            "threshold must be within [0, 1], got {}",
            threshold
        )))
    }
}

/// One of the two detection pathways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// Raw RGB frames.
    Original,
    /// Colour-wheel optical flow images.
    OpticalFlow,
}

impl Branch {
    /// Returns the branch name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Original => "original",
            Branch::OpticalFlow => "optical_flow",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final real/fake decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Real,
    Fake,
}

impl Verdict {
    /// Decide from a combined probability.
    ///
    /// The comparison is closed at the boundary: a probability equal to the
    /// threshold is `Fake`.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Verdict::Fake
        } else {
            Verdict::Real
        }
    }

    pub fn is_fake(&self) -> bool {
        matches!(self, Verdict::Fake)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Real => f.write_str("REAL VIDEO"),
            Verdict::Fake => f.write_str("FAKE VIDEO (AI-Generated)"),
        }
    }
}

/// Outcome of fusing both branch means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FusionResult {
    /// Mean fake-probability over the RGB frames.
    pub original_mean_probability: f64,
    /// Mean fake-probability over the flow images.
    pub flow_mean_probability: f64,
    /// Weighted combination of both means.
    pub combined_probability: f64,
    /// Decision against `threshold_used`.
    pub verdict: Verdict,
    /// Threshold the verdict was taken against.
    pub threshold_used: f64,
    /// Number of RGB frames classified.
    pub original_count: usize,
    /// Number of flow images classified.
    pub flow_count: usize,
}

impl FusionResult {
    /// Combine two branch means with the fixed equal weighting.
    pub fn combine(
        original_mean_probability: f64,
        flow_mean_probability: f64,
        threshold: f64,
        original_count: usize,
        flow_count: usize,
    ) -> Self {
        let combined_probability = original_mean_probability * ORIGINAL_BRANCH_WEIGHT
            + flow_mean_probability * FLOW_BRANCH_WEIGHT;

        Self {
            original_mean_probability,
            flow_mean_probability,
            combined_probability,
            verdict: Verdict::from_probability(combined_probability, threshold),
            threshold_used: threshold,
            original_count,
            flow_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_is_fake() {
        assert_eq!(Verdict::from_probability(0.5, 0.5), Verdict::Fake);
        assert_eq!(Verdict::from_probability(0.4999, 0.5), Verdict::Real);
    }

    #[test]
    fn test_threshold_range() {
        assert_eq!(validate_threshold(0.0).unwrap(), 0.0);
        assert_eq!(validate_threshold(1.0).unwrap(), 1.0);
        assert!(matches!(validate_threshold(1.5), Err(ConfigError::Invalid(_))));
        assert!(validate_threshold(-0.1).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }

    #[test]
    fn test_combine_equal_weights() {
        let result = FusionResult::combine(0.2, 0.8, 0.6, 3, 2);
        assert!((result.combined_probability - 0.5).abs() < 1e-12);
        assert_eq!(result.verdict, Verdict::Real);

        let result = FusionResult::combine(0.2, 0.8, 0.4, 3, 2);
        assert_eq!(result.verdict, Verdict::Fake);
        assert_eq!(result.threshold_used, 0.4);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Real.to_string(), "REAL VIDEO");
        assert_eq!(Verdict::Fake.to_string(), "FAKE VIDEO (AI-Generated)");
    }

    #[test]
    fn test_fusion_result_serialization() {
        let result = FusionResult::combine(0.1, 0.3, DEFAULT_THRESHOLD, 10, 9);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["verdict"], "real");
        assert_eq!(json["flow_count"], 9);
    }
}
