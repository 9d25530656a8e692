//! The viewer session: one brain and one mask volume, their labels, and the
//! scene built from them.
//!
//! [`Session`] is the single owner of all mutable viewer state. Loading a
//! role always decodes first; only a successful decode tears down that
//! role's primitives and builds new ones, so a failed load leaves the
//! previous state of the role exactly as it was.

use crate::camera::{Camera, CameraPresenter};
use crate::config::ViewerConfig;
use crate::enums::{ColorMode, Interpolation, Orientation, Role, ViewPreset};
use crate::label::{Label, LabelSet};
use crate::lookup_table::LookupTable;
use crate::mesh::Material;
use crate::pipeline::{BuildOutcome, EventPump, Progress};
use crate::scene::{BrainModes, ImagePlane, ModeControls, Primitive, PrimitiveId, Renderer, SceneManager};
use crate::volume::Volume;
use crate::volume_loader::{VolumeDecoder, VolumeLoaderError, validate_path};

use image::GrayImage;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Select a file for: {}", roles(.0))]
    MissingInput(Vec<Role>),

    #[error("Could not load {role} volume: {source}")]
    Load {
        role: Role,
        #[source]
        source: VolumeLoaderError,
    },
}

fn roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Inline message shown next to the controls
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub severity: Severity,
}

/// A loaded volume, its labels and the surface primitive of each label
pub(crate) struct VolumeState {
    pub(crate) volume: Volume,
    pub(crate) labels: LabelSet,
    pub(crate) surfaces: Vec<Option<PrimitiveId>>,
}

impl VolumeState {
    fn new<R: Renderer>(volume: Volume, labels: LabelSet, scene: &mut SceneManager<R>) -> Self {
        let role = labels.role();
        let surfaces = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                label.mesh.as_ref().map(|mesh| {
                    scene.add(
                        role,
                        Primitive::Surface {
                            label: i,
                            mesh: mesh.clone(),
                        },
                    )
                })
            })
            .collect();
        Self {
            volume,
            labels,
            surfaces,
        }
    }

    /// Replaces the material of one label's surface
    pub(crate) fn set_material<R: Renderer>(
        &mut self,
        scene: &mut SceneManager<R>,
        index: usize,
        material: Material,
    ) -> bool {
        let Some(mesh) = self.labels.get_mut(index).and_then(|l| l.mesh.as_mut()) else {
            return false;
        };
        mesh.material = material;
        self.surfaces[index].is_some_and(|id| scene.update_material(id, material))
    }

    /// Re-runs one label's pipeline and swaps the new geometry into the scene
    pub(crate) fn rebuild<R: Renderer>(
        &mut self,
        scene: &mut SceneManager<R>,
        index: usize,
        progress: &mut dyn Progress,
    ) -> Option<BuildOutcome> {
        let outcome = self.labels.rebuild(index, &self.volume, progress)?;
        let id = self.surfaces[index]?;
        match self.labels.get(index).and_then(|l| l.mesh.clone()) {
            Some(new_mesh) => {
                scene.update(id, |primitive| {
                    if let Primitive::Surface { mesh, .. } = primitive {
                        *mesh = new_mesh;
                    }
                });
            }
            None => {
                scene.remove(id);
                self.surfaces[index] = None;
            }
        }
        Some(outcome)
    }
}

/// Brain volume state: its surface plus the slicer and projection planes
pub(crate) struct BrainState {
    pub(crate) surface: VolumeState,
    pub(crate) lut: LookupTable,
    /// Slicer planes in [`Orientation::ALL`] order
    pub(crate) slices: [PrimitiveId; 3],
    pub(crate) projection: PrimitiveId,
    pub(crate) modes: BrainModes,
}

/// Grayscale image of one plane of `volume`, empty if `position` is out of range
pub(crate) fn plane_image(
    volume: &Volume,
    lut: &LookupTable,
    orientation: Orientation,
    position: usize,
) -> Arc<GrayImage> {
    let image = volume
        .get_image_from_axis(position, orientation, Interpolation::default(), lut)
        .unwrap_or_else(|| GrayImage::new(0, 0));
    Arc::new(image)
}

fn image_plane(volume: &Volume, lut: &LookupTable, orientation: Orientation) -> ImagePlane {
    let extent = volume.extent();
    let position = extent.center_index(orientation);
    let (sx, sy, sz) = volume.spacing();
    ImagePlane {
        orientation,
        display_extent: extent.plane(orientation, position),
        spacing: [sx, sy, sz],
        opacity: 0.0,
        image: plane_image(volume, lut, orientation, position),
    }
}

/// Values of the controls that are not stored on a label
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ControlValues {
    pub(crate) mask_opacity: f32,
    pub(crate) color_mode: ColorMode,
    pub(crate) lookup_value: f32,
    pub(crate) view: ViewPreset,
}

impl ControlValues {
    fn new(config: &ViewerConfig) -> Self {
        Self {
            mask_opacity: config.mask_opacity,
            color_mode: ColorMode::default(),
            lookup_value: config.lookup_value,
            view: ViewPreset::Axial,
        }
    }
}

pub struct Session<R, D> {
    pub(crate) config: ViewerConfig,
    decoder: D,
    pub(crate) scene: SceneManager<R>,
    pub(crate) presenter: CameraPresenter,
    pub(crate) camera: Camera,
    brain_path: Option<PathBuf>,
    mask_path: Option<PathBuf>,
    pub(crate) brain: Option<BrainState>,
    pub(crate) mask: Option<VolumeState>,
    pub(crate) controls: ControlValues,
    status: Option<Status>,
}

impl<R: Renderer, D: VolumeDecoder> Session<R, D> {
    pub fn new(renderer: R, decoder: D, config: ViewerConfig) -> Self {
        Self {
            controls: ControlValues::new(&config),
            config,
            decoder,
            scene: SceneManager::new(renderer),
            presenter: CameraPresenter::default(),
            camera: Camera::default(),
            brain_path: None,
            mask_path: None,
            brain: None,
            mask: None,
            status: None,
        }
    }

    /// Progress sink that runs `pump` at the configured interval
    pub fn pump<F: FnMut()>(&self, pump: F) -> EventPump<F> {
        EventPump::new(self.config.pump_interval, pump)
    }

    /// Selects the file for `role` without loading it
    pub fn set_path(&mut self, role: Role, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref();
        if let Err(source) = validate_path(path) {
            return Err(self.fail(SessionError::Load { role, source }));
        }
        *self.path_slot(role) = Some(path.to_path_buf());
        self.status = None;
        Ok(())
    }

    pub fn path(&self, role: Role) -> Option<&Path> {
        match role {
            Role::Brain => self.brain_path.as_deref(),
            Role::Mask => self.mask_path.as_deref(),
        }
    }

    fn path_slot(&mut self, role: Role) -> &mut Option<PathBuf> {
        match role {
            Role::Brain => &mut self.brain_path,
            Role::Mask => &mut self.mask_path,
        }
    }

    /// Loads both selected files; each role fails independently
    pub fn open(&mut self, progress: &mut dyn Progress) -> Result<(), SessionError> {
        let (Some(brain), Some(mask)) = (self.brain_path.clone(), self.mask_path.clone()) else {
            let missing = [Role::Brain, Role::Mask]
                .into_iter()
                .filter(|&role| self.path(role).is_none())
                .collect();
            return Err(self.fail(SessionError::MissingInput(missing)));
        };

        let brain = self.load(Role::Brain, &brain, progress);
        let mask = self.load(Role::Mask, &mask, progress);
        self.reset_camera();
        self.scene.render();
        let result = brain.and(mask);
        if result.is_ok() {
            self.status = Some(Status {
                text: "Volumes loaded".to_string(),
                severity: Severity::Info,
            });
        }
        result
    }

    /// Replaces the volume of one role; the other role is not touched
    pub fn reload(
        &mut self,
        role: Role,
        path: impl AsRef<Path>,
        progress: &mut dyn Progress,
    ) -> Result<(), SessionError> {
        let result = self.load(role, path.as_ref(), progress);
        if result.is_ok() {
            self.reset_camera();
        }
        self.scene.render();
        result
    }

    fn load(&mut self, role: Role, path: &Path, progress: &mut dyn Progress) -> Result<(), SessionError> {
        let volume = validate_path(path)
            .and_then(|()| self.decoder.decode(path))
            .map_err(|source| self.fail(SessionError::Load { role, source }))?;

        let removed = self.scene.remove_role(role);
        info!("Loading {role} from {} ({removed} primitives replaced)", path.display());
        match role {
            Role::Brain => {
                self.brain = None;
                self.setup_brain(volume, progress);
            }
            Role::Mask => {
                self.mask = None;
                self.setup_mask(volume, progress);
            }
        }
        *self.path_slot(role) = Some(path.to_path_buf());
        Ok(())
    }

    fn setup_brain(&mut self, volume: Volume, progress: &mut dyn Progress) {
        let labels = LabelSet::brain(&volume, &self.config, progress);
        self.controls.lookup_value = self.config.lookup_value;
        let lut = LookupTable::grayscale(volume.scalar_range(), self.controls.lookup_value);

        let slices = Orientation::ALL
            .map(|o| self.scene.add(Role::Brain, Primitive::Slice(image_plane(&volume, &lut, o))));
        let facing = self.controls.view.orientation();
        let projection = self
            .scene
            .add(Role::Brain, Primitive::Projection(image_plane(&volume, &lut, facing)));

        self.brain = Some(BrainState {
            surface: VolumeState::new(volume, labels, &mut self.scene),
            lut,
            slices,
            projection,
            modes: BrainModes::default(),
        });
    }

    fn setup_mask(&mut self, volume: Volume, progress: &mut dyn Progress) {
        let labels = LabelSet::mask(&volume, &self.config, progress);
        let disabled = labels.len() - labels.interactive().len();
        if disabled > 0 {
            warn!("{disabled} mask labels have no voxels and were disabled");
        }
        self.controls.mask_opacity = self.config.mask_opacity;
        self.controls.color_mode = ColorMode::default();
        self.mask = Some(VolumeState::new(volume, labels, &mut self.scene));
    }

    fn reset_camera(&mut self) {
        if let Some(bounds) = self.scene.bounds() {
            self.camera = self.presenter.reset(&self.camera, &bounds);
            self.scene.set_camera(&self.camera);
        }
    }

    /// Records `error` as the current status and hands it back
    pub(crate) fn fail(&mut self, error: SessionError) -> SessionError {
        warn!("{error}");
        self.status = Some(Status {
            text: error.to_string(),
            severity: Severity::Error,
        });
        error
    }

    pub(crate) fn inform(&mut self, text: String) {
        info!("{text}");
        self.status = Some(Status {
            text,
            severity: Severity::Info,
        });
    }

    /// Material of a mask label under the current color mode
    pub(crate) fn mask_material(config: &ViewerConfig, mode: ColorMode, label: &Label) -> Material {
        let mut material = label.material();
        if mode == ColorMode::Single {
            material.color = config.mask_color(0);
        }
        material
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn scene(&self) -> &SceneManager<R> {
        &self.scene
    }

    pub fn renderer(&self) -> &R {
        self.scene.renderer()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn brain_volume(&self) -> Option<&Volume> {
        self.brain.as_ref().map(|b| &b.surface.volume)
    }

    pub fn mask_volume(&self) -> Option<&Volume> {
        self.mask.as_ref().map(|m| &m.volume)
    }

    pub fn brain_labels(&self) -> Option<&LabelSet> {
        self.brain.as_ref().map(|b| &b.surface.labels)
    }

    pub fn mask_labels(&self) -> Option<&LabelSet> {
        self.mask.as_ref().map(|m| &m.labels)
    }

    /// Surface primitive of one label, if it has one
    pub fn surface_id(&self, role: Role, label: usize) -> Option<PrimitiveId> {
        let state = match role {
            Role::Brain => self.brain.as_ref().map(|b| &b.surface),
            Role::Mask => self.mask.as_ref(),
        }?;
        state.surfaces.get(label).copied().flatten()
    }

    pub fn slice_id(&self, orientation: Orientation) -> Option<PrimitiveId> {
        self.brain.as_ref().map(|b| b.slices[orientation.index()])
    }

    pub fn projection_id(&self) -> Option<PrimitiveId> {
        self.brain.as_ref().map(|b| b.projection)
    }

    pub fn lookup_table(&self) -> Option<&LookupTable> {
        self.brain.as_ref().map(|b| &b.lut)
    }

    pub fn brain_modes(&self) -> BrainModes {
        self.brain.as_ref().map(|b| b.modes).unwrap_or_default()
    }

    /// Enabled state of the mode toggles; everything is off without a brain
    pub fn mode_controls(&self) -> ModeControls {
        match &self.brain {
            Some(brain) => brain.modes.controls(),
            None => ModeControls {
                slicer_control: false,
                projection_control: false,
                slice_sliders: false,
            },
        }
    }

    /// Whether each of the mask label checkboxes can be used
    pub fn mask_slot_states(&self) -> Vec<bool> {
        (0..self.config.max_mask_labels)
            .map(|i| {
                self.mask_labels()
                    .and_then(|labels| labels.get(i))
                    .is_some_and(Label::is_interactive)
            })
            .collect()
    }

    pub fn mask_opacity(&self) -> f32 {
        self.controls.mask_opacity
    }

    pub fn color_mode(&self) -> ColorMode {
        self.controls.color_mode
    }

    pub fn lookup_value(&self) -> f32 {
        self.controls.lookup_value
    }

    pub fn view(&self) -> ViewPreset {
        self.controls.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tests::{ball, labels};
    use crate::pipeline::NoProgress;
    use crate::scene::NullRenderer;
    use ndarray::Array3;

    /// Serves synthetic volumes keyed by file stem
    struct Synthetic;

    impl VolumeDecoder for Synthetic {
        fn decode(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            match name {
                "brain.nii.gz" => Ok(ball(12, 4.0)),
                "mask.nii.gz" => Ok(labels(12)),
                _ => Err(VolumeLoaderError::Io(std::io::ErrorKind::NotFound.into())),
            }
        }
    }

    fn session() -> Session<NullRenderer, Synthetic> {
        Session::new(NullRenderer, Synthetic, ViewerConfig::default())
    }

    #[test]
    fn open_requires_both_paths() {
        let mut session = session();
        session.set_path(Role::Mask, "mask.nii.gz").unwrap();
        let err = session.open(&mut NoProgress).unwrap_err();
        assert!(matches!(&err, SessionError::MissingInput(roles) if roles == &[Role::Brain]));
        assert_eq!(session.status().unwrap().severity, Severity::Error);
        assert!(session.scene().is_empty());
    }

    #[test]
    fn open_builds_both_roles() {
        let mut session = session();
        session.set_path(Role::Brain, "brain.nii.gz").unwrap();
        session.set_path(Role::Mask, "mask.nii.gz").unwrap();
        session.open(&mut NoProgress).unwrap();

        // surface, three slices and the projection plane
        assert_eq!(session.scene().count_for_role(Role::Brain), 5);
        assert_eq!(session.scene().count_for_role(Role::Mask), 2);
        assert_eq!(session.status().unwrap().severity, Severity::Info);
        assert_eq!(session.brain_modes(), BrainModes::default());
        assert_eq!(session.lookup_table().unwrap().value_range(), (0.0, 2.0));
        assert_eq!(session.camera().focal_point, session.scene().bounds().unwrap().center());
    }

    #[test]
    fn planes_start_hidden_at_center() {
        let mut session = session();
        session.reload(Role::Brain, "brain.nii.gz", &mut NoProgress).unwrap();
        for orientation in Orientation::ALL {
            let id = session.slice_id(orientation).unwrap();
            let Some(Primitive::Slice(plane)) = session.scene().get(id) else {
                panic!("missing slice plane");
            };
            assert_eq!(plane.opacity, 0.0);
            assert_eq!(plane.position(), 11 / 2);
        }
    }

    #[test]
    fn failed_decode_keeps_previous_state() {
        let mut session = session();
        session.reload(Role::Mask, "mask.nii.gz", &mut NoProgress).unwrap();
        let err = session.reload(Role::Mask, "missing.nii.gz", &mut NoProgress).unwrap_err();
        assert!(matches!(err, SessionError::Load { role: Role::Mask, .. }));
        assert_eq!(session.scene().count_for_role(Role::Mask), 2);
        assert_eq!(session.path(Role::Mask), Some(Path::new("mask.nii.gz")));
    }

    #[test]
    fn pump_runs_during_load() {
        let mut pumped = 0;
        let mut session = session();
        let mut pump = session.pump(|| pumped += 1);
        session.reload(Role::Brain, "brain.nii.gz", &mut pump).unwrap();
        assert!(pump.pumped() >= 1);
        drop(pump);
        assert!(pumped >= 1);
    }

    #[test]
    fn empty_mask_disables_every_slot() {
        struct Blank;
        impl VolumeDecoder for Blank {
            fn decode(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
                Ok(Volume::new(path, Array3::zeros((4, 4, 4)), (1.0, 1.0, 1.0)))
            }
        }
        let mut session = Session::new(NullRenderer, Blank, ViewerConfig::default());
        session.reload(Role::Mask, "blank.nii.gz", &mut NoProgress).unwrap();
        assert_eq!(session.mask_labels().unwrap().len(), 0);
        assert_eq!(session.mask_slot_states(), vec![false; 10]);
    }
}
