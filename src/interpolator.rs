use ndarray::ArrayView2;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Dimensions of the volume once resampled to the finest voxel spacing.
    ///
    /// Both `spacing` and `original_dim` are ordered (x, y, z).
    pub(crate) fn get_isotropic_dimensions(
        spacing: (f32, f32, f32),
        original_dim: (usize, usize, usize),
    ) -> (u32, u32, u32) {
        let (x_spacing, y_spacing, z_spacing) = spacing;
        let min_spacing = x_spacing.min(y_spacing).min(z_spacing);
        if min_spacing.is_nan() || min_spacing <= 0.0 {
            return (
                original_dim.0 as u32,
                original_dim.1 as u32,
                original_dim.2 as u32,
            );
        }
        let inv_min_spacing = 1.0 / min_spacing;

        let new_x = (original_dim.0 as f32 * x_spacing * inv_min_spacing) as u32;
        let new_y = (original_dim.1 as f32 * y_spacing * inv_min_spacing) as u32;
        let new_z = (original_dim.2 as f32 * z_spacing * inv_min_spacing) as u32;

        (new_x.max(1), new_y.max(1), new_z.max(1))
    }

    /// Sample a (row, column) slice at fractional coordinates
    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn isotropic_dimensions_stretch_coarse_axes() {
        let dim = Interpolator::get_isotropic_dimensions((1.0, 1.0, 2.5), (10, 20, 4));
        assert_eq!(dim, (10, 20, 10));
    }

    #[test]
    fn isotropic_dimensions_ignore_missing_spacing() {
        let dim = Interpolator::get_isotropic_dimensions((0.0, 1.0, 1.0), (3, 4, 5));
        assert_eq!(dim, (3, 4, 5));
    }

    #[test]
    fn bilinear_midpoint_is_average() {
        let slice = array![[0.0f32, 2.0], [4.0, 6.0]];
        let v = Interpolator::bilinear_interpolate(&slice.view(), 0.5, 0.5);
        assert!((v - 3.0).abs() < 1e-6);
        let corner = Interpolator::bilinear_interpolate(&slice.view(), 1.0, 1.0);
        assert!((corner - 6.0).abs() < 1e-6);
    }
}
