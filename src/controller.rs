//! Parameter controls and the work each one triggers.
//!
//! Every handler clamps its input to the control's range, performs the
//! cheapest recompute that keeps the scene consistent, and finishes with a
//! single redraw. Handlers that may rerun the reconstruction pipeline take a
//! [`Progress`] sink; wrap the UI's event hook in [`Session::pump`] to keep
//! the shell responsive while they block.

use crate::config::limits;
use crate::enums::{ColorMode, Orientation, PeerMode, ViewPreset};
use crate::pipeline::{BuildOutcome, Progress};
use crate::scene::{Primitive, Renderer};
use crate::session::{Session, plane_image};
use crate::volume_loader::VolumeDecoder;

use log::debug;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Control {
    BrainThreshold(f32),
    BrainSmoothness(u32),
    BrainOpacity(f32),
    MaskOpacity(f32),
    MaskSmoothness(u32),
    LookupValue(f32),
    MaskColorMode(ColorMode),
    LabelVisible { label: usize, visible: bool },
    SlicePosition { orientation: Orientation, position: usize },
    Slicer(bool),
    Projection(bool),
    View(ViewPreset),
}

/// How much work a control change costs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecomputeClass {
    /// Iso-surface extraction and everything after it
    FullExtraction,
    /// Decimate, smooth and normals on the cached extraction
    Resmooth,
    /// Surface or plane material only
    MaterialOnly,
    /// Plane images remapped through the lookup table
    ImageRemap,
    /// Display window of one slice plane
    DisplayWindow,
    Camera,
    /// Nothing to do, e.g. the control targets a disabled label
    None,
}

impl Control {
    /// Work the control triggers when its target is live
    pub fn class(&self) -> RecomputeClass {
        match self {
            Control::BrainThreshold(_) => RecomputeClass::FullExtraction,
            Control::BrainSmoothness(_) | Control::MaskSmoothness(_) => RecomputeClass::Resmooth,
            Control::BrainOpacity(_)
            | Control::MaskOpacity(_)
            | Control::MaskColorMode(_)
            | Control::LabelVisible { .. }
            | Control::Slicer(_)
            | Control::Projection(_) => RecomputeClass::MaterialOnly,
            Control::LookupValue(_) => RecomputeClass::ImageRemap,
            Control::SlicePosition { .. } => RecomputeClass::DisplayWindow,
            Control::View(_) => RecomputeClass::Camera,
        }
    }
}

fn clamp_smoothness(value: u32) -> u32 {
    value.clamp(limits::SMOOTHNESS.0, limits::SMOOTHNESS.1)
}

fn clamp_opacity(value: f32) -> f32 {
    value.clamp(limits::OPACITY.0, limits::OPACITY.1)
}

fn performed(outcome: Option<BuildOutcome>, class: RecomputeClass) -> RecomputeClass {
    match outcome {
        Some(_) => class,
        None => RecomputeClass::None,
    }
}

impl<R: Renderer, D: VolumeDecoder> Session<R, D> {
    pub fn apply(&mut self, control: Control, progress: &mut dyn Progress) -> RecomputeClass {
        debug!("apply {control:?}");
        match control {
            Control::BrainThreshold(value) => self.set_brain_threshold(value, progress),
            Control::BrainSmoothness(value) => self.set_brain_smoothness(value, progress),
            Control::BrainOpacity(value) => self.set_brain_opacity(value),
            Control::MaskOpacity(value) => self.set_mask_opacity(value),
            Control::MaskSmoothness(value) => self.set_mask_smoothness(value, progress),
            Control::LookupValue(value) => self.set_lookup_value(value),
            Control::MaskColorMode(mode) => self.set_mask_color_mode(mode),
            Control::LabelVisible { label, visible } => self.set_label_visible(label, visible),
            Control::SlicePosition {
                orientation,
                position,
            } => self.set_slice_position(orientation, position),
            Control::Slicer(on) => self.set_slicer(on),
            Control::Projection(on) => self.set_projection(on),
            Control::View(preset) => self.set_view(preset),
        }
    }

    fn finish(&mut self, class: RecomputeClass) -> RecomputeClass {
        self.scene.render();
        class
    }

    /// Moves the brain iso-value, clamped to the brain's scalar range
    pub fn set_brain_threshold(&mut self, value: f32, progress: &mut dyn Progress) -> RecomputeClass {
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let state = &mut brain.surface;
        let value = state.volume.scalar_range().clamp(value);
        let outcome = match state.labels.get_mut(0) {
            Some(label) if label.is_interactive() => {
                label.extractor_value = value;
                state.rebuild(&mut self.scene, 0, progress)
            }
            _ => None,
        };
        if outcome == Some(BuildOutcome::Empty) {
            self.inform(format!(
                "No brain surface at threshold {value}; reload the brain to restore its controls"
            ));
        }
        self.finish(performed(outcome, RecomputeClass::FullExtraction))
    }

    pub fn set_brain_smoothness(&mut self, value: u32, progress: &mut dyn Progress) -> RecomputeClass {
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let state = &mut brain.surface;
        let outcome = match state.labels.get_mut(0) {
            Some(label) if label.is_interactive() => {
                label.smoothness = clamp_smoothness(value);
                state.rebuild(&mut self.scene, 0, progress)
            }
            _ => None,
        };
        self.finish(performed(outcome, RecomputeClass::Resmooth))
    }

    pub fn set_brain_opacity(&mut self, value: f32) -> RecomputeClass {
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let state = &mut brain.surface;
        let material = match state.labels.get_mut(0) {
            Some(label) if label.is_interactive() => {
                label.opacity = clamp_opacity(value);
                Some(label.material())
            }
            _ => None,
        };
        let class = match material {
            Some(material) if state.set_material(&mut self.scene, 0, material) => {
                RecomputeClass::MaterialOnly
            }
            _ => RecomputeClass::None,
        };
        self.finish(class)
    }

    /// Sets the mask opacity slider; hidden labels keep opacity zero
    pub fn set_mask_opacity(&mut self, value: f32) -> RecomputeClass {
        let value = clamp_opacity(value);
        self.controls.mask_opacity = value;
        let Some(mask) = self.mask.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let mut changed = false;
        for index in mask.labels.interactive() {
            let Some(label) = mask.labels.get_mut(index) else {
                continue;
            };
            label.opacity = value;
            let material = Self::mask_material(&self.config, self.controls.color_mode, label);
            changed |= mask.set_material(&mut self.scene, index, material);
        }
        self.finish(if changed {
            RecomputeClass::MaterialOnly
        } else {
            RecomputeClass::None
        })
    }

    pub fn set_mask_smoothness(&mut self, value: u32, progress: &mut dyn Progress) -> RecomputeClass {
        let Some(mask) = self.mask.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let value = clamp_smoothness(value);
        let mut rebuilt = 0;
        for index in mask.labels.interactive() {
            if let Some(label) = mask.labels.get_mut(index) {
                label.smoothness = value;
            }
            if mask.rebuild(&mut self.scene, index, progress).is_some() {
                rebuilt += 1;
            }
        }
        debug!("resmoothed {rebuilt} mask labels at {value} iterations");
        self.finish(if rebuilt > 0 {
            RecomputeClass::Resmooth
        } else {
            RecomputeClass::None
        })
    }

    /// Upper bound of the grayscale ramp used by every brain plane
    pub fn set_lookup_value(&mut self, value: f32) -> RecomputeClass {
        let value = value.clamp(limits::LOOKUP_VALUE.0, limits::LOOKUP_VALUE.1);
        self.controls.lookup_value = value;
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        brain.lut.set_value_range(0.0, value);
        for id in brain.slices.into_iter().chain([brain.projection]) {
            let Some(Primitive::Slice(plane) | Primitive::Projection(plane)) = self.scene.get(id) else {
                continue;
            };
            let image = plane_image(
                &brain.surface.volume,
                &brain.lut,
                plane.orientation,
                plane.position(),
            );
            self.scene.set_plane_image(id, image);
        }
        self.finish(RecomputeClass::ImageRemap)
    }

    pub fn set_mask_color_mode(&mut self, mode: ColorMode) -> RecomputeClass {
        self.controls.color_mode = mode;
        let Some(mask) = self.mask.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let mut changed = false;
        for index in mask.labels.interactive() {
            let Some(label) = mask.labels.get(index) else {
                continue;
            };
            let material = Self::mask_material(&self.config, mode, label);
            changed |= mask.set_material(&mut self.scene, index, material);
        }
        self.finish(if changed {
            RecomputeClass::MaterialOnly
        } else {
            RecomputeClass::None
        })
    }

    /// Checkbox of one mask label; checking restores the current slider value
    pub fn set_label_visible(&mut self, index: usize, visible: bool) -> RecomputeClass {
        let Some(mask) = self.mask.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let material = match mask.labels.get_mut(index) {
            Some(label) if label.is_interactive() => {
                label.visible = visible;
                label.opacity = self.controls.mask_opacity;
                Self::mask_material(&self.config, self.controls.color_mode, label)
            }
            _ => return self.finish(RecomputeClass::None),
        };
        let class = if mask.set_material(&mut self.scene, index, material) {
            RecomputeClass::MaterialOnly
        } else {
            RecomputeClass::None
        };
        self.finish(class)
    }

    /// Moves one slicer plane; ignored while the slicer is off
    pub fn set_slice_position(&mut self, orientation: Orientation, position: usize) -> RecomputeClass {
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        if !brain.modes.controls().slice_sliders {
            return self.finish(RecomputeClass::None);
        }
        let volume = &brain.surface.volume;
        let extent = volume.extent().plane(orientation, position);
        let position = extent.min[orientation.normal_axis()];
        let image = plane_image(volume, &brain.lut, orientation, position);
        let id = brain.slices[orientation.index()];
        self.scene.set_display_extent(id, extent, image);
        self.finish(RecomputeClass::DisplayWindow)
    }

    pub fn set_slicer(&mut self, on: bool) -> RecomputeClass {
        self.set_mode(PeerMode::Slicer, on)
    }

    pub fn set_projection(&mut self, on: bool) -> RecomputeClass {
        self.set_mode(PeerMode::Projection, on)
    }

    fn set_mode(&mut self, mode: PeerMode, on: bool) -> RecomputeClass {
        let Some(brain) = self.brain.as_mut() else {
            return self.finish(RecomputeClass::None);
        };
        let effects = brain.modes.toggle(mode, on);
        for effect in &effects {
            let ids = match effect.mode {
                PeerMode::Slicer => brain.slices.to_vec(),
                PeerMode::Projection => vec![brain.projection],
            };
            for id in ids {
                self.scene.set_plane_opacity(id, effect.opacity);
            }
        }
        self.finish(if effects.is_empty() {
            RecomputeClass::None
        } else {
            RecomputeClass::MaterialOnly
        })
    }

    /// Applies a camera preset and turns the projection plane to face it
    pub fn set_view(&mut self, preset: ViewPreset) -> RecomputeClass {
        self.controls.view = preset;
        if let Some(brain) = self.brain.as_ref() {
            let volume = &brain.surface.volume;
            let orientation = preset.orientation();
            let position = volume.extent().center_index(orientation);
            let image = plane_image(volume, &brain.lut, orientation, position);
            let extent = volume.extent().plane(orientation, position);
            self.scene.update(brain.projection, |primitive| {
                if let Primitive::Projection(plane) = primitive {
                    plane.orientation = orientation;
                    plane.display_extent = extent;
                    plane.image = image;
                }
            });
        }
        let Some(bounds) = self.scene.bounds() else {
            return self.finish(RecomputeClass::None);
        };
        self.camera = self.presenter.preset(preset, &bounds);
        self.scene.set_camera(&self.camera);
        self.finish(RecomputeClass::Camera)
    }
}
