use approx::assert_relative_eq;
use dose_gamma::{
    DoseVolume, Execution, GammaEngine, GammaError, GammaParameters, GammaSummary, GridMismatch,
    LinearDoseMap,
};
use ndarray::Array3;

const UNIT_SPACING: (f64, f64, f64) = (1.0, 1.0, 1.0);

fn volume_from_fn(
    size: (usize, usize, usize),
    dose_map: LinearDoseMap,
    dose: impl Fn(usize, usize, usize) -> f64,
) -> DoseVolume {
    let (x_size, y_size, z_size) = size;
    let doses = Array3::from_shape_fn((z_size, y_size, x_size), |(z, y, x)| dose(x, y, z));
    DoseVolume::from_doses(&doses, UNIT_SPACING, dose_map)
}

fn constant_volume(size: usize, dose: f64) -> DoseVolume {
    volume_from_fn((size, size, size), LinearDoseMap::IDENTITY, |_, _, _| dose)
}

fn smooth_dose(x: usize, y: usize, z: usize) -> f64 {
    let (x, y, z) = (x as f64, y as f64, z as f64);
    20.0 + 5.0 * (0.7 * x).sin() + 3.0 * (0.5 * y).cos() + 2.0 * (0.3 * z + 1.0).sin()
}

fn perturbed_dose(x: usize, y: usize, z: usize) -> f64 {
    let phase = 1.3 * x as f64 + 0.9 * y as f64 + 0.4 * z as f64;
    smooth_dose(x, y, z) * (1.0 + 0.04 * phase.sin())
}

fn patterned_pair() -> (DoseVolume, DoseVolume) {
    let size = (12, 10, 9);
    let dose_map = LinearDoseMap::new(0.001, 0.0);
    (
        volume_from_fn(size, dose_map, smooth_dose),
        volume_from_fn(size, dose_map, perturbed_dose),
    )
}

fn evaluate(
    reference: &DoseVolume,
    target: &DoseVolume,
    parameters: GammaParameters,
) -> GammaSummary {
    GammaEngine::new(parameters)
        .expect("should have accepted parameters")
        .evaluate(reference, target)
        .expect("should have evaluated grids")
}

fn assert_non_decreasing(rates: &[f64]) {
    assert!(
        rates.windows(2).all(|pair| pair[0] <= pair[1]),
        "pass rates decreased: {rates:?}"
    );
}

#[test]
fn constant_grids_pass_everywhere() {
    let reference = constant_volume(5, 10.0);
    let target = constant_volume(5, 10.0);
    let parameters = GammaParameters::new(0.01, 1.0, 1.0).with_search_resolution(4);

    let summary = evaluate(&reference, &target, parameters);
    assert_eq!(summary.pass_rate(), 100.0);
    assert_eq!(summary.max_absolute_difference(), 0.0);
    assert_eq!(summary.max_relative_difference(), 0.0);
    assert_eq!(summary.evaluated_count(), 27);
}

#[test]
fn raised_center_voxel_is_the_only_failure() {
    let reference = constant_volume(5, 10.0);
    let mut target = constant_volume(5, 10.0);
    target.set_dose(2, 2, 2, 12.0);
    let parameters = GammaParameters::new(0.01, 1.0, 1.0).with_search_resolution(4);

    let summary = evaluate(&reference, &target, parameters);
    assert_eq!(summary.fail_count(), 1);
    assert_eq!(summary.pass_count(), 26);
    assert_eq!(summary.pass_rate(), 96.3);
    assert_eq!(summary.max_absolute_difference(), 2.0);
    assert_eq!(summary.max_relative_difference(), 20.0);
}

#[test]
fn identical_grids_pass_for_any_parameters() {
    let (reference, _) = patterned_pair();
    let target = reference.clone();
    let parameter_sets = [
        GammaParameters::new(0.01, 1.0, 0.0),
        GammaParameters::new(0.03, 3.0, 18.0),
        GammaParameters::new(1.0, 0.1, 5.0).with_search_resolution(1),
        GammaParameters::midpoint(0.005, 2.0, 1.0),
    ];

    for parameters in parameter_sets {
        let summary = evaluate(&reference, &target, parameters);
        assert_eq!(summary.pass_rate(), 100.0, "{parameters:?}");
        assert_eq!(summary.max_absolute_difference(), 0.0);
        assert_eq!(summary.max_relative_difference(), 0.0);
    }
}

#[test]
fn repeated_and_parallel_evaluations_agree() {
    let (reference, target) = patterned_pair();
    let engine = GammaEngine::new(GammaParameters::new(0.02, 1.0, 15.0))
        .expect("should have accepted parameters");

    let first = engine
        .evaluate(&reference, &target)
        .expect("should have evaluated grids");
    let second = engine
        .evaluate(&reference, &target)
        .expect("should have evaluated grids");
    let serial = engine
        .clone()
        .with_execution(Execution::Serial)
        .evaluate(&reference, &target)
        .expect("should have evaluated grids");

    assert_eq!(first, second);
    assert_eq!(first, serial);
}

#[test]
fn looser_dose_criterion_never_lowers_pass_rate() {
    let (reference, target) = patterned_pair();
    let rates: Vec<f64> = [0.0001, 0.002, 0.005, 0.01, 0.02, 0.03, 0.05, 0.1]
        .into_iter()
        .map(|fraction| {
            evaluate(&reference, &target, GammaParameters::new(fraction, 1.0, 15.0)).pass_rate()
        })
        .collect();

    assert_non_decreasing(&rates);
    assert!(rates[0] < 100.0);
    assert_eq!(rates[rates.len() - 1], 100.0);
}

#[test]
fn larger_distance_to_agreement_never_lowers_pass_rate() {
    let (reference, target) = patterned_pair();
    let rates: Vec<f64> = [0.25, 0.5, 1.0, 2.0, 3.0, 5.0]
        .into_iter()
        .map(|dta| {
            evaluate(&reference, &target, GammaParameters::new(0.01, dta, 15.0)).pass_rate()
        })
        .collect();

    assert_non_decreasing(&rates);
}

#[test]
fn finer_search_never_lowers_pass_rate_and_converges() {
    let (reference, target) = patterned_pair();
    let rates: Vec<f64> = [1, 2, 4, 8, 16, 32, 64]
        .into_iter()
        .map(|resolution| {
            let parameters =
                GammaParameters::new(0.01, 2.0, 15.0).with_search_resolution(resolution);
            evaluate(&reference, &target, parameters).pass_rate()
        })
        .collect();

    assert_non_decreasing(&rates);
    assert!(rates[0] < rates[6]);
    assert_eq!(rates[5], rates[6]);
}

#[test]
fn voxels_below_threshold_do_not_contribute() {
    let size = (7, 7, 7);
    let dose_map = LinearDoseMap::new(0.001, 0.0);
    let dose = |x: usize, y: usize, z: usize| if x < 3 { 0.5 } else { smooth_dose(x, y, z) };
    let reference = volume_from_fn(size, dose_map, dose);
    let quiet = reference.clone();
    let noisy = volume_from_fn(size, dose_map, |x, y, z| {
        if x < 3 { 100.0 } else { dose(x, y, z) }
    });
    let parameters = GammaParameters::new(0.01, 1.0, 1.0);

    let quiet_summary = evaluate(&reference, &quiet, parameters);
    let noisy_summary = evaluate(&reference, &noisy, parameters);

    assert_eq!(quiet_summary, noisy_summary);
    assert_eq!(noisy_summary.evaluated_count(), 75);
    assert_eq!(noisy_summary.pass_rate(), 100.0);
    assert_eq!(noisy_summary.max_absolute_difference(), 0.0);
}

#[test]
fn edge_voxels_are_never_evaluated() {
    let reference = constant_volume(5, 10.0);
    let target = volume_from_fn((5, 5, 5), LinearDoseMap::IDENTITY, |x, y, z| {
        let on_edge = [x, y, z].iter().any(|&index| index == 0 || index == 4);
        if on_edge { 50.0 } else { 10.0 }
    });

    let summary = evaluate(&reference, &target, GammaParameters::new(0.01, 1.0, 1.0));
    assert_eq!(summary.evaluated_count(), 27);
    assert_eq!(summary.pass_rate(), 100.0);
    assert_eq!(summary.max_absolute_difference(), 0.0);
}

#[test]
fn differing_dose_maps_are_compared_in_physical_units() {
    let reference = volume_from_fn((5, 5, 5), LinearDoseMap::new(0.01, 0.5), |_, _, _| 10.0);
    let target = volume_from_fn((5, 5, 5), LinearDoseMap::new(0.002, 0.0), |_, _, _| 10.3);

    let summary = evaluate(&reference, &target, GammaParameters::new(0.01, 1.0, 1.0));
    assert_eq!(summary.pass_rate(), 0.0);
    assert_eq!(summary.max_absolute_difference(), 0.3);
    assert_eq!(summary.max_relative_difference(), 3.0);
    assert_relative_eq!(summary.max_reference_dose(), 10.0, epsilon = 1e-9);

    let loose = evaluate(&reference, &target, GammaParameters::new(0.05, 1.0, 1.0));
    assert_eq!(loose.pass_rate(), 100.0);
}

#[test]
fn mismatched_sizes_are_rejected() {
    let reference = constant_volume(5, 10.0);
    let target = volume_from_fn((5, 5, 6), LinearDoseMap::IDENTITY, |_, _, _| 10.0);

    let result = GammaEngine::new(GammaParameters::default())
        .expect("should have accepted parameters")
        .evaluate(&reference, &target);
    match result {
        Err(GammaError::DimensionMismatch(GridMismatch::Size { reference, target })) => {
            assert_eq!(reference, (5, 5, 5));
            assert_eq!(target, (5, 5, 6));
        }
        other => panic!("expected size mismatch, got {other:?}"),
    }
}

#[test]
fn all_doses_below_threshold_is_reported() {
    let reference = constant_volume(5, 0.05);
    let target = constant_volume(5, 0.05);

    let result = dose_gamma::evaluate(&reference, &target, GammaParameters::default());
    assert!(matches!(result, Err(GammaError::NoEligibleVoxels)));
}
