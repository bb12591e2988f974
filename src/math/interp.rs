use nalgebra::DMatrix;

/// Bilinear interpolation of a value table on a rectilinear grid.
///
/// Rows of `values` follow `xs`, columns follow `ys`. Queries outside the
/// grid are clamped to its boundary.
#[derive(Debug, Clone)]
pub struct GridInterpolator {
    xs: Vec<f64>,
    ys: Vec<f64>,
    values: DMatrix<f64>,
}

impl GridInterpolator {
    /// Creates a new interpolator. The caller guarantees that `values` is
    /// `xs.len()` by `ys.len()` and that both axes are strictly increasing
    /// with at least two entries.
    #[must_use]
    pub fn new(xs: Vec<f64>, ys: Vec<f64>, values: DMatrix<f64>) -> Self {
        debug_assert_eq!(values.nrows(), xs.len());
        debug_assert_eq!(values.ncols(), ys.len());
        Self { xs, ys, values }
    }

    /// Interpolated value at `(x, y)`.
    #[must_use]
    pub fn value(&self, x: f64, y: f64) -> f64 {
        let (i, tx) = locate(&self.xs, x);
        let (j, ty) = locate(&self.ys, y);

        let v00 = self.values[(i, j)];
        let v01 = self.values[(i, j + 1)];
        let v10 = self.values[(i + 1, j)];
        let v11 = self.values[(i + 1, j + 1)];

        (1.0 - tx) * ((1.0 - ty) * v00 + ty * v01) + tx * ((1.0 - ty) * v10 + ty * v11)
    }
}

/// Finds the cell holding `x` and the fractional position inside it.
fn locate(axis: &[f64], x: f64) -> (usize, f64) {
    let last_cell = axis.len() - 2;
    let i = axis.partition_point(|&a| a <= x).saturating_sub(1).min(last_cell);
    let t = (x - axis[i]) / (axis[i + 1] - axis[i]);
    (i, t.clamp(0.0, 1.0))
}
