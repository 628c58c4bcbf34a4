use crate::gamma::GammaError;

/// Running pass/fail counts and extrema of one comparison.
///
/// Tallies of disjoint parts of a grid combine with [`GammaTally::merge`];
/// rounding only happens in [`GammaTally::finalize`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GammaTally {
    pass_count: u64,
    fail_count: u64,
    max_absolute_difference: f64,
    max_reference_dose: f64,
}

impl GammaTally {
    /// Records one voxel above threshold.
    pub fn record(&mut self, reference_dose: f64, absolute_difference: f64, passed: bool) {
        self.max_absolute_difference = self.max_absolute_difference.max(absolute_difference);
        self.max_reference_dose = self.max_reference_dose.max(reference_dose);
        if passed {
            self.pass_count += 1;
        } else {
            self.fail_count += 1;
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            pass_count: self.pass_count + other.pass_count,
            fail_count: self.fail_count + other.fail_count,
            max_absolute_difference: self
                .max_absolute_difference
                .max(other.max_absolute_difference),
            max_reference_dose: self.max_reference_dose.max(other.max_reference_dose),
        }
    }

    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count
    }

    pub fn evaluated_count(&self) -> u64 {
        self.pass_count + self.fail_count
    }

    pub fn finalize(self) -> Result<GammaSummary, GammaError> {
        let evaluated = self.evaluated_count();
        if evaluated == 0 {
            return Err(GammaError::NoEligibleVoxels);
        }

        let pass_rate = ratio_to_percent(self.pass_count as f64 / evaluated as f64);
        let max_relative_difference = if self.max_reference_dose > 0.0 {
            ratio_to_percent(self.max_absolute_difference / self.max_reference_dose)
        } else if self.max_absolute_difference == 0.0 {
            0.0
        } else {
            f64::INFINITY
        };

        Ok(GammaSummary {
            pass_count: self.pass_count,
            fail_count: self.fail_count,
            pass_rate,
            max_absolute_difference: round_to_tenth(self.max_absolute_difference),
            max_relative_difference,
            max_reference_dose: self.max_reference_dose,
        })
    }
}

/// Finalized result of a gamma comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaSummary {
    pass_count: u64,
    fail_count: u64,
    pass_rate: f64,
    max_absolute_difference: f64,
    max_relative_difference: f64,
    max_reference_dose: f64,
}

impl GammaSummary {
    /// Percentage of evaluated voxels that passed, rounded to 0.1.
    pub fn pass_rate(&self) -> f64 {
        self.pass_rate
    }

    /// Largest co-located dose difference, rounded to 0.1 dose units.
    pub fn max_absolute_difference(&self) -> f64 {
        self.max_absolute_difference
    }

    /// Largest co-located dose difference as a percentage of the largest
    /// evaluated reference dose, rounded to 0.1.
    pub fn max_relative_difference(&self) -> f64 {
        self.max_relative_difference
    }

    pub fn max_reference_dose(&self) -> f64 {
        self.max_reference_dose
    }

    pub fn pass_count(&self) -> u64 {
        self.pass_count
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count
    }

    pub fn evaluated_count(&self) -> u64 {
        self.pass_count + self.fail_count
    }
}

// Ties round to even.
#[inline]
fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

#[inline]
fn ratio_to_percent(ratio: f64) -> f64 {
    (ratio * 1000.0).round_ties_even() / 10.0
}
