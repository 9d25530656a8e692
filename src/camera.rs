use crate::enums::{Orientation, ViewPreset};
use crate::mesh::Bounds;

use nalgebra::{Point3, Vector3};

/// Perspective camera handed to the renderer
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub focal_point: Point3<f32>,
    pub view_up: Vector3<f32>,
    /// Vertical view angle in degrees
    pub view_angle: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point3::new(0.0, 0.0, 1.0),
            focal_point: Point3::origin(),
            view_up: Vector3::y(),
            view_angle: DEFAULT_VIEW_ANGLE,
        }
    }
}

const DEFAULT_VIEW_ANGLE: f32 = 30.0;

impl Camera {
    /// Unit vector from the position toward the focal point
    pub fn direction(&self) -> Vector3<f32> {
        (self.focal_point - self.position)
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| -Vector3::z())
    }

    pub fn distance(&self) -> f32 {
        (self.focal_point - self.position).norm()
    }

    /// Narrows the view angle by `factor`; values above 1 magnify
    pub fn zoom(&mut self, factor: f32) {
        if factor > 0.0 {
            self.view_angle /= factor;
        }
    }
}

impl ViewPreset {
    /// Slice orientation facing the camera under this preset
    pub fn orientation(self) -> Orientation {
        match self {
            ViewPreset::Axial => Orientation::Axial,
            ViewPreset::Coronal => Orientation::Coronal,
            ViewPreset::Sagittal => Orientation::Sagittal,
        }
    }

    /// Direction of projection, view-up and zoom of the preset
    fn pose(self) -> (Vector3<f32>, Vector3<f32>, f32) {
        match self {
            ViewPreset::Axial => (-Vector3::z(), Vector3::y(), 1.8),
            ViewPreset::Coronal => (Vector3::y(), Vector3::new(0.0, 0.5, 0.5), 1.8),
            ViewPreset::Sagittal => (-Vector3::x(), Vector3::z(), 1.6),
        }
    }
}

/// Places the camera so the whole scene fits the view
#[derive(Clone, Copy, Debug)]
pub struct CameraPresenter {
    view_angle: f32,
}

impl Default for CameraPresenter {
    fn default() -> Self {
        Self {
            view_angle: DEFAULT_VIEW_ANGLE,
        }
    }
}

impl CameraPresenter {
    /// Distance at which a sphere around `bounds` just fills the view
    fn fit_distance(&self, bounds: &Bounds) -> f32 {
        let mut radius = bounds.diagonal() / 2.0;
        if radius <= 0.0 || !radius.is_finite() {
            radius = 0.5;
        }
        radius / (self.view_angle.to_radians() / 2.0).sin()
    }

    /// Recenters on `bounds`, keeping the direction and view-up of `current`
    pub fn reset(&self, current: &Camera, bounds: &Bounds) -> Camera {
        let focal_point = bounds.center();
        let distance = self.fit_distance(bounds);
        Camera {
            position: focal_point - current.direction() * distance,
            focal_point,
            view_up: current.view_up,
            view_angle: self.view_angle,
        }
    }

    pub fn preset(&self, preset: ViewPreset, bounds: &Bounds) -> Camera {
        let (direction, up, zoom) = preset.pose();
        let focal_point = bounds.center();
        let distance = self.fit_distance(bounds);
        // drop the part of view-up along the direction of projection
        let view_up = (up - direction * up.dot(&direction))
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(|| direction.cross(&Vector3::x()).normalize());
        let mut camera = Camera {
            position: focal_point - direction * distance,
            focal_point,
            view_up,
            view_angle: self.view_angle,
        };
        camera.zoom(zoom);
        camera
    }
}
