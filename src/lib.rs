//! # NIfTI-volume library
//!
//! This crate turns a pair of compressed NIfTI volumes, a brain scan and a
//! labeled mask, into an interactive 3D scene: iso-surfaces of the brain
//! tissue and of every mask class, plus textured slice planes through the
//! brain.
//!
//! Surfaces are reconstructed by a fixed pipeline that runs synchronously on
//! the caller's thread, using rayon for the data parallel parts:
//!  - Marching cubes extraction (continuous for the brain, discrete for mask
//!    classes)
//!  - Topology preserving decimation to half the triangle count
//!  - Laplacian smoothing
//!  - Normal estimation with feature edge splitting
//!
//! A [`Session`] owns both volumes and the scene. Drawing is delegated to a
//! [`Renderer`] supplied by the caller, and decoding to a [`VolumeDecoder`]
//! (the default [`NiftiDecoder`] reads `.nii.gz` files).
//! Volumes are assumed to have the following attributes:
//!   - Single file, gzip compressed NIfTI-1
//!   - Only the first 3D frame is used
//!   - Mask classes are stored as integers `1..=n`, with 0 for background
//!
//! # Roadmap
//!
//!  - Trilinear interpolation for oblique planes
//!  - Caching of plane images
//!
//! # Examples
//!
//! ## Loading a brain and a mask
//!
//! Load both volumes, switch the slicer on and move the axial plane.
//!
//! ```no_run
//! # use nifti_volume::{Session, NiftiDecoder, NullRenderer, ViewerConfig, Role, Orientation, NoProgress};
//! let mut session = Session::new(NullRenderer, NiftiDecoder, ViewerConfig::default());
//! session.set_path(Role::Brain, "brain.nii.gz").expect("should accept path");
//! session.set_path(Role::Mask, "mask.nii.gz").expect("should accept path");
//! session.open(&mut NoProgress).expect("should have loaded both volumes");
//!
//! session.set_slicer(true);
//! session.set_slice_position(Orientation::Axial, 40);
//! ```

pub mod camera;
pub mod config;
pub mod controller;
pub mod decimate;
pub mod enums;
pub mod extract;
mod interpolator;
pub mod label;
pub mod lookup_table;
pub mod mesh;
pub mod normals;
pub mod pipeline;
pub mod scene;
pub mod session;
pub mod smooth;
mod tables;
pub mod volume;
pub mod volume_loader;

pub use camera::{Camera, CameraPresenter};
pub use config::ViewerConfig;
pub use controller::{Control, RecomputeClass};
pub use enums::{ColorMode, ExtractionMode, Interpolation, Orientation, PeerMode, Role, ViewPreset};
pub use label::{Label, LabelSet};
pub use mesh::{Bounds, Material, RenderMesh, TriMesh};
pub use pipeline::{BuildOutcome, EventPump, NoProgress, Progress, Stage};
pub use scene::{NullRenderer, Primitive, PrimitiveId, Renderer, SceneManager};
pub use session::{Session, SessionError, Severity, Status};
pub use volume::Volume;
pub use volume_loader::{NiftiDecoder, VolumeDecoder, VolumeLoaderError};
