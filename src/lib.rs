//! # dose-gamma
//!
//! This crate compares two volumetric radiation dose distributions with the
//! gamma index and reports how well a target dose agrees with a reference.

//!
//! Both distributions are read through the [`DoseGrid`] trait: integer raw
//! samples per Z-plane plus a linear raw-to-dose conversion. The engine
//! evaluates every interior reference voxel above a dose threshold:
//!  - Voxels whose co-located dose difference is within the dose criterion
//!    pass immediately
//!  - Otherwise the target dose is interpolated towards each of the six axis
//!    neighbours and the voxel passes if any sample has a gamma index below 1
//!
//!  The result is summarized into a pass rate, the maximum absolute dose
//!  difference and that difference relative to the maximum reference dose.
//!  The grids are assumed to be aligned:
//!   - Same number of voxels along every axis
//!   - Same origin (unless [`OriginPolicy::Ignore`] is configured)
//!   - No resampling or registration is performed
//!
//!  Z-planes are evaluated in parallel using rayon unless
//!  [`Execution::Serial`] is requested.
//!
//! # Examples
//!
//! ## Comparing two in-memory grids
//!
//! ```
//! # use dose_gamma::{DoseVolume, GammaEngine, GammaParameters, LinearDoseMap};
//! # use ndarray::Array3;
//! let reference = DoseVolume::from_doses(
//!     &Array3::from_elem((5, 5, 5), 10.0),
//!     (1.0, 1.0, 1.0),
//!     LinearDoseMap::IDENTITY,
//! );
//! let mut target = reference.clone();
//! target.set_dose(2, 2, 2, 12.0);
//!
//! let engine = GammaEngine::new(GammaParameters::new(0.01, 1.0, 1.0).with_search_resolution(4))
//!     .expect("should have accepted parameters");
//! let summary = engine
//!     .evaluate(&reference, &target)
//!     .expect("should have evaluated grids");
//! assert_eq!(summary.fail_count(), 1);
//! assert_eq!(summary.max_absolute_difference(), 2.0);
//! assert_eq!(summary.max_relative_difference(), 20.0);
//! ```
//!
//! ## Reading RT Dose files
//!
//! ```no_run
//! # use dose_gamma::{DoseGrid, DoseLoader, GammaParameters, evaluate};
//! let reference = DoseLoader::load_from_file("reference.dcm")
//!     .expect("should have loaded reference dose");
//! let target = DoseLoader::load_from_file("target.dcm")
//!     .expect("should have loaded target dose");
//! let parameters = GammaParameters::from_percent(3.0, reference.resolution().0, 0.1);
//! let summary = evaluate(&reference, &target, parameters).expect("should have compared doses");
//! println!("Gamma pass rate: {}%", summary.pass_rate());
//! ```

pub mod dose_grid;
pub mod dose_loader;
pub mod enums;
pub mod gamma;
mod interpolator;
pub mod parameters;
pub mod summary;

pub use dose_grid::{DoseGrid, DoseVolume, LinearDoseMap, derive_linear_dose_map};
pub use dose_loader::{DoseLoader, DoseLoaderError};
pub use enums::{Axis, Execution, OriginPolicy, Step};
pub use gamma::{CancelFlag, GammaEngine, GammaError, GridMismatch, evaluate, gamma_index};
pub use parameters::{
    ConfigError, DEFAULT_SEARCH_RESOLUTION, GammaParameters, MIDPOINT_SEARCH_RESOLUTION,
    ParameterError,
};
pub use summary::{GammaSummary, GammaTally};
