use crate::enums::{Interpolation, Orientation};
use crate::interpolator::Interpolator;
use crate::lookup_table::LookupTable;

use image::ImageBuffer;
use image::Luma;
use log::debug;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Inclusive voxel index bounds, one `(min, max)` pair per axis (x, y, z)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl Extent {
    /// Extent covering a grid of the given (x, y, z) dimensions
    pub fn from_dim(dim: (usize, usize, usize)) -> Self {
        Self {
            min: [0, 0, 0],
            max: [
                dim.0.saturating_sub(1),
                dim.1.saturating_sub(1),
                dim.2.saturating_sub(1),
            ],
        }
    }

    pub fn axis(&self, axis: usize) -> (usize, usize) {
        (self.min[axis], self.max[axis])
    }

    /// Six-tuple form `(x0, x1, y0, y1, z0, z1)`
    pub fn to_array(&self) -> [usize; 6] {
        [
            self.min[0],
            self.max[0],
            self.min[1],
            self.max[1],
            self.min[2],
            self.max[2],
        ]
    }

    /// Display window of a single plane at `position` along the plane normal.
    ///
    /// The position is clamped into the extent.
    pub fn plane(&self, orientation: Orientation, position: usize) -> Extent {
        let axis = orientation.normal_axis();
        let position = position.clamp(self.min[axis], self.max[axis]);
        let mut plane = *self;
        plane.min[axis] = position;
        plane.max[axis] = position;
        plane
    }

    /// Middle index of the axis a plane of `orientation` moves along
    pub fn center_index(&self, orientation: Orientation) -> usize {
        self.max[orientation.normal_axis()] / 2
    }
}

/// Minimum and maximum sample value of a volume
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalarRange {
    pub min: f32,
    pub max: f32,
}

fn finite_fold((lo, hi): (f32, f32), v: f32) -> (f32, f32) {
    if v.is_finite() {
        (lo.min(v), hi.max(v))
    } else {
        (lo, hi)
    }
}

impl ScalarRange {
    /// Range of the finite samples; NaN and infinities are skipped
    pub fn of(data: &Array3<f32>) -> Self {
        let (min, max) = data
            .as_slice_memory_order()
            .map(|samples| {
                samples
                    .par_iter()
                    .fold(
                        || (f32::INFINITY, f32::NEG_INFINITY),
                        |acc, &v| finite_fold(acc, v),
                    )
                    .reduce(
                        || (f32::INFINITY, f32::NEG_INFINITY),
                        |a, b| (a.0.min(b.0), a.1.max(b.1)),
                    )
            })
            .unwrap_or_else(|| {
                data.iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |acc, &v| finite_fold(acc, v))
            });
        if min > max {
            return Self { min: 0.0, max: 0.0 };
        }
        Self { min, max }
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// A decoded scalar volume. Immutable once loaded.
#[derive(Debug)]
pub struct Volume {
    path: PathBuf,
    /// Samples indexed `[x, y, z]`
    data: Array3<f32>,
    spacing: (f32, f32, f32),
    extent: Extent,
    scalar_range: ScalarRange,
    interpolated_dim: (u32, u32, u32),
}

impl Volume {
    /// Non-finite samples are replaced by the minimum of the finite ones
    pub fn new(path: impl Into<PathBuf>, mut data: Array3<f32>, spacing: (f32, f32, f32)) -> Self {
        let original_dim = data.dim();
        let scalar_range = ScalarRange::of(&data);
        if data.iter().any(|v| !v.is_finite()) {
            debug!("Replacing non-finite samples with {}", scalar_range.min);
            data.mapv_inplace(|v| if v.is_finite() { v } else { scalar_range.min });
        }
        Self {
            path: path.into(),
            extent: Extent::from_dim(original_dim),
            scalar_range,
            interpolated_dim: Interpolator::get_isotropic_dimensions(spacing, original_dim),
            data,
            spacing,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the dimensions of the volume (x, y, z)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn scalar_range(&self) -> ScalarRange {
        self.scalar_range
    }

    #[inline]
    pub fn sample(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[[x, y, z]]
    }

    /// Slice through the volume as a (row, column) view.
    ///
    /// Rows run along y for axial planes and along z for the others.
    pub fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice_result = match orientation {
            Orientation::Axial => self.data.slice(s![.., .., index]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![index, .., ..]),
        };
        Some(slice_result.reversed_axes())
    }

    fn get_output_dimensions(&self, orientation: Orientation) -> (u32, u32) {
        // Always return (width, height) - standard image convention
        let (x, y, z) = self.interpolated_dim;
        match orientation {
            Orientation::Axial => (x, y),
            Orientation::Coronal => (x, z),
            Orientation::Sagittal => (y, z),
        }
    }

    fn slice_to_image(
        slice: &ArrayView2<'_, f32>,
        lut: &LookupTable,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .axis_iter(Axis(0))
            .into_par_iter()
            .flat_map_iter(|row| row.iter().map(|&v| lut.map(v)).collect::<Vec<u8>>())
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    /// Grayscale image of one slice mapped through `lut`
    pub fn get_image_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
        interpolation: Interpolation,
        lut: &LookupTable,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let slice = self.get_slice_from_axis(index, orientation)?;

        match interpolation {
            Interpolation::None => Self::slice_to_image(&slice, lut),
            Interpolation::Bilinear => {
                let (width, height) = self.get_output_dimensions(orientation);
                if (height as usize, width as usize) == slice.dim() {
                    return Self::slice_to_image(&slice, lut);
                }
                Self::interpolate_slice(&slice, width, height, lut)
            }
        }
    }

    fn interpolate_slice(
        slice: &ArrayView2<'_, f32>,
        width: u32,
        height: u32,
        lut: &LookupTable,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (slice_height, slice_width) = slice.dim();

        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map_iter(|y| {
                (0..width)
                    .map(|x| {
                        // Normalized coordinates with half-pixel offset
                        let norm_x = (x as f32 + 0.5) / width as f32;
                        let norm_y = (y as f32 + 0.5) / height as f32;

                        let src_x = norm_x * slice_width as f32 - 0.5;
                        let src_y = norm_y * slice_height as f32 - 0.5;

                        let src_x = src_x.max(0.0).min((slice_width - 1) as f32);
                        let src_y = src_y.max(0.0).min((slice_height - 1) as f32);

                        let value = Interpolator::bilinear_interpolate(slice, src_y, src_x);
                        lut.map(value)
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.data.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.2,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.0,
        };
        index < max_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dim: (usize, usize, usize)) -> Volume {
        let data = Array3::from_shape_fn(dim, |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        Volume::new("ramp.nii.gz", data, (1.0, 1.0, 1.0))
    }

    #[test]
    fn extent_and_range_follow_data() {
        let volume = ramp((4, 3, 2));
        assert_eq!(volume.extent().to_array(), [0, 3, 0, 2, 0, 1]);
        assert_eq!(volume.scalar_range(), ScalarRange { min: 0.0, max: 123.0 });
        assert_eq!(volume.scalar_range().midpoint(), 61.5);
    }

    #[test]
    fn non_finite_samples_take_the_minimum() {
        let mut data = Array3::from_shape_fn((3, 3, 3), |(x, _, _)| 10.0 + x as f32);
        data[[0, 0, 0]] = f32::NAN;
        data[[2, 2, 2]] = f32::INFINITY;
        let volume = Volume::new("nan.nii.gz", data, (1.0, 1.0, 1.0));
        assert_eq!(volume.scalar_range(), ScalarRange { min: 10.0, max: 12.0 });
        assert_eq!(volume.data()[[0, 0, 0]], 10.0);
        assert_eq!(volume.data()[[2, 2, 2]], 10.0);
        assert!(volume.data().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn plane_extent_collapses_one_axis() {
        let extent = Extent::from_dim((10, 20, 30));
        let axial = extent.plane(Orientation::Axial, 7);
        assert_eq!(axial.to_array(), [0, 9, 0, 19, 7, 7]);
        let sagittal = extent.plane(Orientation::Sagittal, 99);
        assert_eq!(sagittal.to_array(), [9, 9, 0, 19, 0, 29]);
        assert_eq!(extent.center_index(Orientation::Coronal), 9);
    }

    #[test]
    fn slices_are_row_major_images() {
        let volume = ramp((4, 3, 2));
        let axial = volume.get_slice_from_axis(1, Orientation::Axial).unwrap();
        assert_eq!(axial.dim(), (3, 4));
        assert_eq!(axial[[2, 3]], 3.0 + 20.0 + 100.0);
        let sagittal = volume.get_slice_from_axis(0, Orientation::Sagittal).unwrap();
        assert_eq!(sagittal.dim(), (2, 3));
        assert!(volume.get_slice_from_axis(2, Orientation::Axial).is_none());
    }

    #[test]
    fn anisotropic_slices_are_resampled() {
        let data = Array3::from_elem((4, 4, 2), 1.0f32);
        let volume = Volume::new("aniso.nii.gz", data, (1.0, 1.0, 2.0));
        let lut = LookupTable::grayscale(ScalarRange { min: 0.0, max: 1.0 }, 1.0);
        let image = volume
            .get_image_from_axis(0, Orientation::Coronal, Interpolation::Bilinear, &lut)
            .unwrap();
        assert_eq!(image.dimensions(), (4, 4));
        let raw = volume
            .get_image_from_axis(0, Orientation::Coronal, Interpolation::None, &lut)
            .unwrap();
        assert_eq!(raw.dimensions(), (4, 2));
    }

    #[test]
    fn constant_volume_has_flat_range() {
        let volume = Volume::new("flat.nii.gz", Array3::zeros((2, 2, 2)), (1.0, 1.0, 1.0));
        assert_eq!(volume.scalar_range(), ScalarRange { min: 0.0, max: 0.0 });
    }
}
