use crate::volume::Volume;

use log::{debug, info};
use ndarray::Array3;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{NiftiObject, NiftiVolume, ReaderOptions};
use std::path::Path;
use thiserror::Error;

/// The only accepted compound file suffix
pub const NIFTI_GZ_SUFFIX: &str = "nii.gz";

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Invalid file extension for {0:?}, expected .{NIFTI_GZ_SUFFIX}")]
    InvalidFileExtension(String),

    #[error("Unsupported volume dimensions {0:?}")]
    UnsupportedDimensions(Vec<usize>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("NIfTI error: {0}")]
    Decode(#[from] nifti::NiftiError),
}

/// Turns a validated path into a scalar volume
pub trait VolumeDecoder {
    fn decode(&self, path: &Path) -> Result<Volume, VolumeLoaderError>;
}

/// Checks that the file name carries exactly the `.nii.gz` compound suffix.
///
/// Only the name is inspected; the file is not opened.
pub fn validate_path(path: &Path) -> Result<(), VolumeLoaderError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, suffix)) if !stem.is_empty() && suffix == NIFTI_GZ_SUFFIX => Ok(()),
        _ => Err(VolumeLoaderError::InvalidFileExtension(
            path.display().to_string(),
        )),
    }
}

/// Decoder for gzip-compressed single-file NIfTI-1 volumes
#[derive(Clone, Copy, Debug, Default)]
pub struct NiftiDecoder;

impl VolumeDecoder for NiftiDecoder {
    fn decode(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        let object = ReaderOptions::new().read_file(path)?;
        let header = object.header();
        let spacing = (header.pixdim[1], header.pixdim[2], header.pixdim[3]);
        let volume = object.into_volume();
        let dim: Vec<usize> = volume.dim().iter().map(|&d| d as usize).collect();
        debug!("{} header dims {:?}, spacing {:?}", path.display(), dim, spacing);

        let samples = volume.into_ndarray::<f32>()?;
        let data = Self::first_frame(samples.shape(), samples.iter().copied())?;
        info!("Decoded {} with shape {:?}", path.display(), data.dim());

        Ok(Volume::new(path, data, Self::sanitize_spacing(spacing)))
    }
}

impl NiftiDecoder {
    /// Collects the first 3D frame of a volume given in logical `[x, y, z, ...]` order
    fn first_frame(
        shape: &[usize],
        samples: impl Iterator<Item = f32>,
    ) -> Result<Array3<f32>, VolumeLoaderError> {
        if shape.len() < 3 || shape.iter().any(|&d| d == 0) {
            return Err(VolumeLoaderError::UnsupportedDimensions(shape.to_vec()));
        }
        let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
        // Trailing axes vary fastest in logical order, so every voxel of the
        // first frame is followed by `frames - 1` samples of later frames.
        let frames: usize = shape[3..].iter().product();
        let data: Vec<f32> = samples.step_by(frames.max(1)).take(nx * ny * nz).collect();
        Array3::from_shape_vec((nx, ny, nz), data)
            .map_err(|_| VolumeLoaderError::UnsupportedDimensions(shape.to_vec()))
    }

    fn sanitize_spacing(spacing: (f32, f32, f32)) -> (f32, f32, f32) {
        let fix = |s: f32| if s.is_finite() && s > 0.0 { s } else { 1.0 };
        (fix(spacing.0), fix(spacing.1), fix(spacing.2))
    }
}
