pub(crate) struct Interpolator;

impl Interpolator {
    /// Fractions `i / resolution` for `i` in `0..resolution`.
    pub(crate) fn sample_fractions(resolution: u32) -> impl Iterator<Item = f64> {
        let inv_resolution = 1.0 / f64::from(resolution);
        (0..resolution).map(move |i| f64::from(i) * inv_resolution)
    }

    #[inline]
    pub(crate) fn linear_interpolate(from: f64, to: f64, fraction: f64) -> f64 {
        from + (to - from) * fraction
    }
}
