use crate::dose_grid::{DoseGrid, LinearDoseMap, derive_linear_dose_map};
use crate::enums::{Axis, Execution, OriginPolicy, Step};
use crate::interpolator::Interpolator;
use crate::parameters::{GammaParameters, ParameterError};
use crate::summary::{GammaSummary, GammaTally};

use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use web_time::Instant;

#[derive(Debug, Error)]
pub enum GammaError {
    #[error("Dose grids are not aligned: {0}")]
    DimensionMismatch(#[source] GridMismatch),

    #[error("No voxel reached the dose threshold")]
    NoEligibleVoxels,

    #[error("Invalid gamma parameters: {0}")]
    InvalidParameters(#[from] ParameterError),

    #[error("Gamma evaluation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridMismatch {
    #[error("reference size {reference:?} differs from target size {target:?}")]
    Size {
        reference: (usize, usize, usize),
        target: (usize, usize, usize),
    },

    #[error("reference origin {reference:?} differs from target origin {target:?}")]
    Origin {
        reference: (f64, f64, f64),
        target: (f64, f64, f64),
    },
}

/// Shared flag to stop a running evaluation. Checked once per Z-plane.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
struct SearchDirection {
    axis: Axis,
    step: Step,
}

const SEARCH_DIRECTIONS: [SearchDirection; 6] = [
    SearchDirection {
        axis: Axis::X,
        step: Step::Backward,
    },
    SearchDirection {
        axis: Axis::X,
        step: Step::Forward,
    },
    SearchDirection {
        axis: Axis::Y,
        step: Step::Backward,
    },
    SearchDirection {
        axis: Axis::Y,
        step: Step::Forward,
    },
    SearchDirection {
        axis: Axis::Z,
        step: Step::Backward,
    },
    SearchDirection {
        axis: Axis::Z,
        step: Step::Forward,
    },
];

/// Gamma index of a single candidate point.
///
/// A zero dose difference contributes nothing, even with a zero tolerance.
#[inline]
pub fn gamma_index(
    dose_difference: f64,
    dose_tolerance: f64,
    distance: f64,
    distance_to_agreement: f64,
) -> f64 {
    let dose_term = if dose_difference == 0.0 {
        0.0
    } else {
        dose_difference / dose_tolerance
    };
    let distance_term = distance / distance_to_agreement;
    (dose_term * dose_term + distance_term * distance_term).sqrt()
}

/// Reusable raw-sample buffers for one reference plane and the three target
/// planes around it.
struct PlaneBuffers {
    reference: Array2<i32>,
    below: Array2<i32>,
    current: Array2<i32>,
    above: Array2<i32>,
}

impl PlaneBuffers {
    fn new(x_size: usize, y_size: usize) -> Self {
        let shape = (y_size, x_size);
        Self {
            reference: Array2::zeros(shape),
            below: Array2::zeros(shape),
            current: Array2::zeros(shape),
            above: Array2::zeros(shape),
        }
    }

    #[inline]
    fn neighbor(&self, direction: SearchDirection, x: usize, y: usize) -> i32 {
        match (direction.axis, direction.step) {
            (Axis::X, step) => self.current[[y, step.apply(x)]],
            (Axis::Y, step) => self.current[[step.apply(y), x]],
            (Axis::Z, Step::Backward) => self.below[[y, x]],
            (Axis::Z, Step::Forward) => self.above[[y, x]],
        }
    }
}

/// Per-evaluation constants shared by every plane.
struct ScanContext {
    reference_map: LinearDoseMap,
    target_map: LinearDoseMap,
    spacing: (f64, f64, f64),
    sizes: (usize, usize, usize),
    dose_difference_fraction: f64,
    distance_to_agreement: f64,
    dose_threshold: f64,
    search_resolution: u32,
}

impl ScanContext {
    fn spacing(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.spacing.0,
            Axis::Y => self.spacing.1,
            Axis::Z => self.spacing.2,
        }
    }

    fn scan_plane<R, T>(
        &self,
        reference: &R,
        target: &T,
        z: usize,
        buffers: &mut PlaneBuffers,
        cancel: Option<&CancelFlag>,
    ) -> Result<GammaTally, GammaError>
    where
        R: DoseGrid + ?Sized,
        T: DoseGrid + ?Sized,
    {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(GammaError::Cancelled);
        }

        let mut tally = GammaTally::default();
        reference.fetch_plane(z, &mut buffers.reference);

        // Assumes the border voxels of a skipped plane are below threshold too.
        if self.plane_max_dose(&buffers.reference) < self.dose_threshold {
            debug!("Skipping plane z={z}: below dose threshold");
            return Ok(tally);
        }

        target.fetch_plane(z - 1, &mut buffers.below);
        target.fetch_plane(z, &mut buffers.current);
        target.fetch_plane(z + 1, &mut buffers.above);

        let (x_size, y_size, _) = self.sizes;
        for y in 1..y_size - 1 {
            for x in 1..x_size - 1 {
                let reference_dose = self.reference_map.to_dose(buffers.reference[[y, x]]);
                if reference_dose < self.dose_threshold {
                    continue;
                }

                let target_dose = self.target_map.to_dose(buffers.current[[y, x]]);
                let difference = (target_dose - reference_dose).abs();
                let passed = self.passes(buffers, x, y, reference_dose, target_dose, difference);
                tally.record(reference_dose, difference, passed);
            }
        }

        Ok(tally)
    }

    fn plane_max_dose(&self, plane: &Array2<i32>) -> f64 {
        if plane.is_empty() {
            return f64::NEG_INFINITY;
        }
        let (min_raw, max_raw) = plane
            .iter()
            .fold((i32::MAX, i32::MIN), |(lo, hi), &raw| (lo.min(raw), hi.max(raw)));
        self.reference_map.dose_range(min_raw, max_raw).1
    }

    fn passes(
        &self,
        buffers: &PlaneBuffers,
        x: usize,
        y: usize,
        reference_dose: f64,
        target_dose: f64,
        difference: f64,
    ) -> bool {
        let dose_tolerance = reference_dose.abs() * self.dose_difference_fraction;
        if difference <= dose_tolerance {
            return true;
        }

        SEARCH_DIRECTIONS.iter().any(|&direction| {
            let neighbor_dose = self.target_map.to_dose(buffers.neighbor(direction, x, y));
            self.search_direction(
                reference_dose,
                dose_tolerance,
                target_dose,
                neighbor_dose,
                self.spacing(direction.axis),
            )
        })
    }

    /// Walks from the co-located target dose towards the neighbour dose and
    /// stops at the first sample with a gamma index below one.
    fn search_direction(
        &self,
        reference_dose: f64,
        dose_tolerance: f64,
        target_dose: f64,
        neighbor_dose: f64,
        spacing: f64,
    ) -> bool {
        Interpolator::sample_fractions(self.search_resolution).any(|fraction| {
            let dose = Interpolator::linear_interpolate(target_dose, neighbor_dose, fraction);
            gamma_index(
                dose - reference_dose,
                dose_tolerance,
                fraction * spacing,
                self.distance_to_agreement,
            ) < 1.0
        })
    }
}

/// Bounded directional gamma evaluation of a target grid against a reference.
///
/// Voxels on the outer faces of the grid are never evaluated. A voxel passes
/// when its co-located dose difference is within the dose criterion, or when
/// one of `search_resolution` samples interpolated towards any of its six
/// axis neighbours has a gamma index below one.
#[derive(Debug, Clone)]
pub struct GammaEngine {
    parameters: GammaParameters,
    execution: Execution,
    cancel: Option<CancelFlag>,
}

impl GammaEngine {
    /// # Errors
    ///
    /// Returns [`GammaError::InvalidParameters`] if `parameters` do not validate.
    pub fn new(parameters: GammaParameters) -> Result<Self, GammaError> {
        parameters.validate()?;
        Ok(Self {
            parameters,
            execution: Execution::default(),
            cancel: None,
        })
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn parameters(&self) -> &GammaParameters {
        &self.parameters
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    /// Compares `target` against `reference` and finalizes the statistics.
    ///
    /// # Errors
    ///
    /// * [`GammaError::DimensionMismatch`] if the grids are not aligned
    /// * [`GammaError::NoEligibleVoxels`] if no voxel reached the threshold
    /// * [`GammaError::Cancelled`] if the cancel flag was raised
    pub fn evaluate<R, T>(&self, reference: &R, target: &T) -> Result<GammaSummary, GammaError>
    where
        R: DoseGrid + ?Sized,
        T: DoseGrid + ?Sized,
    {
        let start = Instant::now();
        let summary = self.tally(reference, target)?.finalize()?;
        info!(
            "Gamma {}%/{}: pass rate {}% ({} of {} voxels), max difference {} ({}%) in {:?}",
            self.parameters.dose_difference_percent(),
            self.parameters.distance_to_agreement(),
            summary.pass_rate(),
            summary.pass_count(),
            summary.evaluated_count(),
            summary.max_absolute_difference(),
            summary.max_relative_difference(),
            start.elapsed()
        );
        Ok(summary)
    }

    /// Runs the scan and returns the unrounded tally.
    pub fn tally<R, T>(&self, reference: &R, target: &T) -> Result<GammaTally, GammaError>
    where
        R: DoseGrid + ?Sized,
        T: DoseGrid + ?Sized,
    {
        self.check_alignment(reference, target)?;

        let sizes = reference.sizes();
        let (x_size, y_size, z_size) = sizes;
        let context = ScanContext {
            reference_map: derive_linear_dose_map(reference),
            target_map: derive_linear_dose_map(target),
            spacing: reference.resolution(),
            sizes,
            dose_difference_fraction: self.parameters.dose_difference_fraction(),
            distance_to_agreement: self.parameters.distance_to_agreement(),
            dose_threshold: self.parameters.dose_threshold(),
            search_resolution: self.parameters.search_resolution(),
        };
        debug!(
            "Scanning {x_size}x{y_size}x{z_size} grid, spacing {:?}, reference map {:?}, target map {:?}",
            context.spacing, context.reference_map, context.target_map
        );

        if x_size < 3 || y_size < 3 || z_size < 3 {
            debug!("Grid has no interior voxels");
            return Ok(GammaTally::default());
        }

        let mut planes = 1..z_size - 1;
        let cancel = self.cancel.as_ref();
        match self.execution {
            Execution::Serial => {
                let mut buffers = PlaneBuffers::new(x_size, y_size);
                planes.try_fold(
                    GammaTally::default(),
                    |tally, z| -> Result<GammaTally, GammaError> {
                        let plane =
                            context.scan_plane(reference, target, z, &mut buffers, cancel)?;
                        Ok(tally.merge(plane))
                    },
                )
            }
            Execution::Parallel => planes
                .into_par_iter()
                .map_init(
                    || PlaneBuffers::new(x_size, y_size),
                    |buffers, z| context.scan_plane(reference, target, z, buffers, cancel),
                )
                .try_reduce(GammaTally::default, |a, b| Ok(a.merge(b))),
        }
    }

    fn check_alignment<R, T>(&self, reference: &R, target: &T) -> Result<(), GammaError>
    where
        R: DoseGrid + ?Sized,
        T: DoseGrid + ?Sized,
    {
        let (reference_sizes, target_sizes) = (reference.sizes(), target.sizes());
        if reference_sizes != target_sizes {
            return Err(GammaError::DimensionMismatch(GridMismatch::Size {
                reference: reference_sizes,
                target: target_sizes,
            }));
        }

        if self.parameters.origin_policy() == OriginPolicy::Strict {
            let (reference_origin, target_origin) = (reference.origin(), target.origin());
            if reference_origin != target_origin {
                return Err(GammaError::DimensionMismatch(GridMismatch::Origin {
                    reference: reference_origin,
                    target: target_origin,
                }));
            }
        }
        Ok(())
    }
}

/// Validates `parameters` and evaluates `target` against `reference` with
/// the default execution mode.
pub fn evaluate<R, T>(
    reference: &R,
    target: &T,
    parameters: GammaParameters,
) -> Result<GammaSummary, GammaError>
where
    R: DoseGrid + ?Sized,
    T: DoseGrid + ?Sized,
{
    GammaEngine::new(parameters)?.evaluate(reference, target)
}
