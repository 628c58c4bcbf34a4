use ndarray::{Array2, Array3, s};

/// Read access to a 3D dose distribution stored as integer raw samples.
///
/// Sizes and resolution are given in (X, Y, Z) order. Planes are handed out
/// row-major as `(YSize, XSize)` arrays, so a sample is addressed as
/// `plane[[y, x]]`.
pub trait DoseGrid: Sync {
    /// Number of voxels along X, Y and Z.
    fn sizes(&self) -> (usize, usize, usize);

    /// Physical voxel spacing along X, Y and Z.
    fn resolution(&self) -> (f64, f64, f64);

    /// Converts one raw sample to physical dose.
    fn raw_to_dose(&self, raw: i32) -> f64;

    /// Copies the raw samples of plane `z` into `plane`.
    ///
    /// `z` must be below the Z size and `plane` must be shaped `(YSize, XSize)`.
    fn fetch_plane(&self, z: usize, plane: &mut Array2<i32>);

    /// Position of the first voxel.
    fn origin(&self) -> (f64, f64, f64);
}

/// Affine raw-to-dose conversion: `dose = raw * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDoseMap {
    pub scale: f64,
    pub offset: f64,
}

impl LinearDoseMap {
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    #[inline]
    pub fn to_dose(&self, raw: i32) -> f64 {
        f64::from(raw) * self.scale + self.offset
    }

    /// Nearest raw sample for `dose`, saturating at the `i32` range.
    pub fn to_raw(&self, dose: f64) -> i32 {
        ((dose - self.offset) / self.scale).round() as i32
    }

    /// Physical dose range covered by raw samples in `[min_raw, max_raw]`.
    pub(crate) fn dose_range(&self, min_raw: i32, max_raw: i32) -> (f64, f64) {
        let (a, b) = (self.to_dose(min_raw), self.to_dose(max_raw));
        (a.min(b), a.max(b))
    }
}

impl Default for LinearDoseMap {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Reconstructs the raw-to-dose map of `grid` from the doses of raw 0 and 1.
///
/// This is the only place [`DoseGrid::raw_to_dose`] is called; the result is
/// applied to every voxel afterwards.
pub fn derive_linear_dose_map<G: DoseGrid + ?Sized>(grid: &G) -> LinearDoseMap {
    let offset = grid.raw_to_dose(0);
    let scale = grid.raw_to_dose(1) - offset;
    LinearDoseMap { scale, offset }
}

/// In-memory dose grid.
#[derive(Debug, Clone, Default)]
pub struct DoseVolume {
    data: Array3<i32>,
    resolution: (f64, f64, f64),
    origin: (f64, f64, f64),
    dose_map: LinearDoseMap,
}

impl DoseVolume {
    /// Creates a volume from raw samples laid out as (depth, height, width),
    /// i.e. indexed `[[z, y, x]]`.
    pub fn new(data: Array3<i32>, resolution: (f64, f64, f64), dose_map: LinearDoseMap) -> Self {
        Self {
            data,
            resolution,
            origin: (0.0, 0.0, 0.0),
            dose_map,
        }
    }

    /// Quantizes physical doses (indexed `[[z, y, x]]`) with `dose_map`.
    pub fn from_doses(
        doses: &Array3<f64>,
        resolution: (f64, f64, f64),
        dose_map: LinearDoseMap,
    ) -> Self {
        let data = doses.mapv(|dose| dose_map.to_raw(dose));
        Self::new(data, resolution, dose_map)
    }

    pub fn with_origin(mut self, origin: (f64, f64, f64)) -> Self {
        self.origin = origin;
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<i32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array3<i32> {
        &mut self.data
    }

    pub fn dose_map(&self) -> LinearDoseMap {
        self.dose_map
    }

    pub fn raw_at(&self, x: usize, y: usize, z: usize) -> Option<i32> {
        self.data.get([z, y, x]).copied()
    }

    pub fn dose_at(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        self.raw_at(x, y, z).map(|raw| self.dose_map.to_dose(raw))
    }

    /// Stores `dose` at (x, y, z). Returns `false` if the index is outside the grid.
    pub fn set_dose(&mut self, x: usize, y: usize, z: usize, dose: f64) -> bool {
        let raw = self.dose_map.to_raw(dose);
        match self.data.get_mut([z, y, x]) {
            Some(sample) => {
                *sample = raw;
                true
            }
            None => false,
        }
    }
}

impl DoseGrid for DoseVolume {
    fn sizes(&self) -> (usize, usize, usize) {
        let (depth, height, width) = self.data.dim();
        (width, height, depth)
    }

    fn resolution(&self) -> (f64, f64, f64) {
        self.resolution
    }

    fn raw_to_dose(&self, raw: i32) -> f64 {
        self.dose_map.to_dose(raw)
    }

    fn fetch_plane(&self, z: usize, plane: &mut Array2<i32>) {
        plane.assign(&self.data.slice(s![z, .., ..]));
    }

    fn origin(&self) -> (f64, f64, f64) {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AffineGrid {
        scale: f64,
        offset: f64,
    }

    impl DoseGrid for AffineGrid {
        fn sizes(&self) -> (usize, usize, usize) {
            (1, 1, 1)
        }

        fn resolution(&self) -> (f64, f64, f64) {
            (1.0, 1.0, 1.0)
        }

        fn raw_to_dose(&self, raw: i32) -> f64 {
            f64::from(raw) * self.scale + self.offset
        }

        fn fetch_plane(&self, _z: usize, plane: &mut Array2<i32>) {
            plane.fill(0);
        }

        fn origin(&self) -> (f64, f64, f64) {
            (0.0, 0.0, 0.0)
        }
    }

    #[test]
    fn derives_scale_and_offset_from_two_conversions() {
        let grid = AffineGrid {
            scale: 0.5,
            offset: 2.0,
        };
        let map = derive_linear_dose_map(&grid);
        assert_eq!(map, LinearDoseMap::new(0.5, 2.0));
        assert_eq!(map.to_dose(10), 7.0);
    }

    #[test]
    fn negative_scale_reports_ordered_range() {
        let map = LinearDoseMap::new(-1.0, 0.0);
        assert_eq!(map.dose_range(-3, 5), (-5.0, 3.0));
    }

    #[test]
    fn quantizes_doses_with_the_given_map() {
        let doses = Array3::from_elem((2, 3, 4), 1.26);
        let volume =
            DoseVolume::from_doses(&doses, (1.0, 1.0, 1.0), LinearDoseMap::new(0.01, 0.0));
        assert_eq!(volume.raw_at(0, 0, 0), Some(126));
        assert_eq!(volume.sizes(), (4, 3, 2));
    }

    #[test]
    fn fetch_plane_copies_the_requested_slice() {
        let mut data = Array3::zeros((3, 2, 2));
        data[[1, 0, 1]] = 7;
        let volume = DoseVolume::new(data, (1.0, 1.0, 1.0), LinearDoseMap::IDENTITY);

        let mut plane = Array2::zeros((2, 2));
        volume.fetch_plane(1, &mut plane);
        assert_eq!(plane[[0, 1]], 7);
        volume.fetch_plane(2, &mut plane);
        assert_eq!(plane[[0, 1]], 0);
    }

    #[test]
    fn set_dose_rejects_out_of_range_index() {
        let mut volume = DoseVolume::new(
            Array3::zeros((2, 2, 2)),
            (1.0, 1.0, 1.0),
            LinearDoseMap::IDENTITY,
        );
        assert!(volume.set_dose(1, 1, 1, 4.0));
        assert!(!volume.set_dose(2, 0, 0, 4.0));
        assert_eq!(volume.dose_at(1, 1, 1), Some(4.0));
    }
}
