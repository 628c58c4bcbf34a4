use crate::enums::OriginPolicy;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sub-steps sampled towards each neighbour when no resolution is configured.
pub const DEFAULT_SEARCH_RESOLUTION: u32 = 32;

/// Resolution whose only non-zero sample lies halfway to each neighbour.
pub const MIDPOINT_SEARCH_RESOLUTION: u32 = 2;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Dose difference fraction must be in (0, 1], got {0}")]
    DoseDifference(f64),

    #[error("Distance to agreement must be positive, got {0}")]
    DistanceToAgreement(f64),

    #[error("Dose threshold must be non-negative, got {0}")]
    DoseThreshold(f64),

    #[error("Search resolution must be at least 1")]
    SearchResolution,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ParameterError),
}

/// Keys present in a parameter file. Absent keys leave the base value untouched.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParameterOverrides {
    dose_difference_fraction: Option<f64>,
    distance_to_agreement: Option<f64>,
    dose_threshold: Option<f64>,
    search_resolution: Option<u32>,
    origin_policy: Option<OriginPolicy>,
}

/// Gamma criteria for one comparison.
///
/// Deserializes from a table such as
///
/// ```toml
/// dose_difference_fraction = 0.03
/// distance_to_agreement = 3.0
/// dose_threshold = 0.5
/// search_resolution = 32
/// origin_policy = "strict"
/// ```
///
/// Missing keys fall back to [`GammaParameters::default`], or to the values
/// of the receiver with [`GammaParameters::overlay_toml_str`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaParameters {
    dose_difference_fraction: f64,
    distance_to_agreement: f64,
    dose_threshold: f64,
    search_resolution: u32,
    origin_policy: OriginPolicy,
}

impl Default for GammaParameters {
    fn default() -> Self {
        Self {
            dose_difference_fraction: 0.01,
            distance_to_agreement: 3.0,
            dose_threshold: 0.1,
            search_resolution: DEFAULT_SEARCH_RESOLUTION,
            origin_policy: OriginPolicy::Strict,
        }
    }
}

impl GammaParameters {
    pub fn new(
        dose_difference_fraction: f64,
        distance_to_agreement: f64,
        dose_threshold: f64,
    ) -> Self {
        Self {
            dose_difference_fraction,
            distance_to_agreement,
            dose_threshold,
            ..Self::default()
        }
    }

    /// Same as [`GammaParameters::new`] with the dose criterion given in percent.
    pub fn from_percent(
        dose_difference_percent: f64,
        distance_to_agreement: f64,
        dose_threshold: f64,
    ) -> Self {
        Self::new(dose_difference_percent / 100.0, distance_to_agreement, dose_threshold)
    }

    /// Single-sample search halfway towards each neighbour.
    pub fn midpoint(
        dose_difference_fraction: f64,
        distance_to_agreement: f64,
        dose_threshold: f64,
    ) -> Self {
        Self::new(dose_difference_fraction, distance_to_agreement, dose_threshold)
            .with_search_resolution(MIDPOINT_SEARCH_RESOLUTION)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Self::default().overlay_toml_str(source)
    }

    /// Replaces the values set in `source` and keeps the others.
    pub fn overlay_toml_str(self, source: &str) -> Result<Self, ConfigError> {
        let overrides: ParameterOverrides = toml::from_str(source)?;
        let parameters = Self {
            dose_difference_fraction: overrides
                .dose_difference_fraction
                .unwrap_or(self.dose_difference_fraction),
            distance_to_agreement: overrides
                .distance_to_agreement
                .unwrap_or(self.distance_to_agreement),
            dose_threshold: overrides.dose_threshold.unwrap_or(self.dose_threshold),
            search_resolution: overrides.search_resolution.unwrap_or(self.search_resolution),
            origin_policy: overrides.origin_policy.unwrap_or(self.origin_policy),
        };
        parameters.validate()?;
        Ok(parameters)
    }

    pub fn with_dose_difference_fraction(mut self, fraction: f64) -> Self {
        self.dose_difference_fraction = fraction;
        self
    }

    pub fn with_distance_to_agreement(mut self, distance: f64) -> Self {
        self.distance_to_agreement = distance;
        self
    }

    pub fn with_dose_threshold(mut self, threshold: f64) -> Self {
        self.dose_threshold = threshold;
        self
    }

    /// Samples at `i / resolution` for `i` in `0..resolution`. Sample sets are
    /// only nested when the resolution is doubled, so an odd resolution may
    /// pass fewer voxels than the even one below it.
    pub fn with_search_resolution(mut self, resolution: u32) -> Self {
        self.search_resolution = resolution;
        self
    }

    pub fn with_origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.origin_policy = policy;
        self
    }

    pub fn dose_difference_fraction(&self) -> f64 {
        self.dose_difference_fraction
    }

    pub fn dose_difference_percent(&self) -> f64 {
        self.dose_difference_fraction * 100.0
    }

    pub fn distance_to_agreement(&self) -> f64 {
        self.distance_to_agreement
    }

    pub fn dose_threshold(&self) -> f64 {
        self.dose_threshold
    }

    pub fn search_resolution(&self) -> u32 {
        self.search_resolution
    }

    pub fn origin_policy(&self) -> OriginPolicy {
        self.origin_policy
    }

    pub fn validate(&self) -> Result<(), ParameterError> {
        let fraction = self.dose_difference_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ParameterError::DoseDifference(fraction));
        }
        if !(self.distance_to_agreement > 0.0 && self.distance_to_agreement.is_finite()) {
            return Err(ParameterError::DistanceToAgreement(self.distance_to_agreement));
        }
        if !(self.dose_threshold >= 0.0 && self.dose_threshold.is_finite()) {
            return Err(ParameterError::DoseThreshold(self.dose_threshold));
        }
        if self.search_resolution == 0 {
            return Err(ParameterError::SearchResolution);
        }
        Ok(())
    }
}
