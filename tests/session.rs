use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use ndarray::Array3;
use nifti_volume::scene::ModeControls;
use nifti_volume::volume::Extent;
use nifti_volume::{
    Camera, ColorMode, Control, NoProgress, Orientation, Primitive, PrimitiveId, RecomputeClass,
    Renderer, Role, Session, SessionError, Severity, Stage, ViewPreset, ViewerConfig, Volume,
    VolumeDecoder, VolumeLoaderError,
};

#[derive(Default)]
struct Recording {
    added: Vec<PrimitiveId>,
    removed: Vec<PrimitiveId>,
    updates: usize,
    frames: usize,
    camera: Option<Camera>,
}

impl Renderer for Recording {
    fn add(&mut self, id: PrimitiveId, _primitive: &Primitive) {
        self.added.push(id);
    }
    fn update(&mut self, _id: PrimitiveId, _primitive: &Primitive) {
        self.updates += 1;
    }
    fn remove(&mut self, id: PrimitiveId) {
        self.removed.push(id);
    }
    fn set_camera(&mut self, camera: &Camera) {
        self.camera = Some(*camera);
    }
    fn render(&mut self) {
        self.frames += 1;
    }
}

/// Brain: radial ramp over (0, 1675). Masks: slabs along x with ids `1..=n`.
struct Stub {
    calls: Rc<Cell<usize>>,
}

fn brain_volume(path: &Path) -> Volume {
    let data = Array3::from_shape_fn((13, 13, 13), |(x, y, z)| {
        let d = [x, y, z]
            .iter()
            .map(|&i| (i as f32 - 6.0).powi(2))
            .sum::<f32>()
            .sqrt();
        (1675.0 * (1.0 - d / 6.0)).max(0.0)
    });
    Volume::new(path, data, (1.0, 1.0, 1.0))
}

fn slab_mask(path: &Path, ids: &[usize]) -> Volume {
    let data = Array3::from_shape_fn((16, 6, 6), |(x, y, z)| {
        let inside = (1..=4).contains(&y) && (1..=4).contains(&z);
        if inside && ids.contains(&x) {
            x as f32
        } else {
            0.0
        }
    });
    Volume::new(path, data, (1.0, 1.0, 1.0))
}

impl VolumeDecoder for Stub {
    fn decode(&self, path: &Path) -> Result<Volume, VolumeLoaderError> {
        self.calls.set(self.calls.get() + 1);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        match name {
            "brain.nii.gz" | "brain2.nii.gz" => Ok(brain_volume(path)),
            "mask.nii.gz" => Ok(slab_mask(path, &[1, 2, 3])),
            "mask14.nii.gz" => Ok(slab_mask(path, &(1..=14).collect::<Vec<_>>())),
            "gaps.nii.gz" => Ok(slab_mask(path, &[1, 3])),
            _ => Err(VolumeLoaderError::UnsupportedDimensions(vec![0])),
        }
    }
}

fn session() -> (Session<Recording, Stub>, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let stub = Stub {
        calls: calls.clone(),
    };
    (
        Session::new(Recording::default(), stub, ViewerConfig::default()),
        calls,
    )
}

fn opened(mask: &str) -> Session<Recording, Stub> {
    let (mut session, _) = session();
    session.set_path(Role::Brain, "brain.nii.gz").unwrap();
    session.set_path(Role::Mask, mask).unwrap();
    session.open(&mut NoProgress).unwrap();
    session
}

fn plane_opacity(session: &Session<Recording, Stub>, id: PrimitiveId) -> f32 {
    session.scene().get(id).unwrap().opacity()
}

fn surface_geometry(session: &Session<Recording, Stub>, role: Role, label: usize) -> Arc<nifti_volume::TriMesh> {
    let id = session.surface_id(role, label).unwrap();
    match session.scene().get(id) {
        Some(Primitive::Surface { mesh, .. }) => mesh.geometry.clone(),
        other => panic!("expected a surface, got {other:?}"),
    }
}

#[test]
fn brain_defaults_follow_scalar_range() {
    let session = opened("mask.nii.gz");
    let brain = session.brain_volume().unwrap();
    assert_eq!(brain.scalar_range().min, 0.0);
    assert_eq!(brain.scalar_range().max, 1675.0);

    let label = session.brain_labels().unwrap().get(0).unwrap();
    assert_eq!(label.extractor_value, 837.5);
    assert!(label.mesh.is_some());
    assert_eq!(session.lookup_table().unwrap().value_range(), (0.0, 2.0));
}

#[test]
fn mask_label_count_is_capped() {
    let session = opened("mask14.nii.gz");
    let labels = session.mask_labels().unwrap();
    assert_eq!(labels.len(), 10);
    for (i, label) in labels.iter().enumerate() {
        assert_eq!(label.extractor_value, (i + 1) as f32);
        assert!(label.is_interactive());
    }
    assert_eq!(session.mask_slot_states(), vec![true; 10]);
}

#[test]
fn small_mask_disables_remaining_slots() {
    let session = opened("mask.nii.gz");
    let labels = session.mask_labels().unwrap();
    let values: Vec<f32> = labels.iter().map(|l| l.extractor_value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);

    let mut expected = vec![true; 3];
    expected.extend([false; 7]);
    assert_eq!(session.mask_slot_states(), expected);
}

#[test]
fn invalid_extension_is_rejected_before_decoding() {
    let (mut session, calls) = session();
    let err = session.set_path(Role::Brain, "scan.nii").unwrap_err();
    assert!(matches!(
        err,
        SessionError::Load {
            role: Role::Brain,
            source: VolumeLoaderError::InvalidFileExtension(_)
        }
    ));
    assert_eq!(session.status().unwrap().severity, Severity::Error);
    assert_eq!(session.path(Role::Brain), None);

    assert!(session.reload(Role::Brain, "scan.nii", &mut NoProgress).is_err());
    assert_eq!(calls.get(), 0);
    assert!(session.scene().is_empty());
}

#[test]
fn open_without_both_paths_is_a_no_op() {
    let (mut session, calls) = session();
    let err = session.open(&mut NoProgress).unwrap_err();
    assert!(matches!(&err, SessionError::MissingInput(roles) if roles.len() == 2));
    assert_eq!(calls.get(), 0);
    assert!(session.brain_volume().is_none());
}

#[test]
fn reload_replaces_only_its_own_role() {
    let mut session = opened("mask.nii.gz");
    let brain_before: Vec<_> = session.scene().ids_for_role(Role::Brain).collect();
    let mask_before: Vec<_> = session.scene().ids_for_role(Role::Mask).collect();
    assert_eq!(mask_before.len(), 3);

    session
        .reload(Role::Brain, "brain2.nii.gz", &mut NoProgress)
        .unwrap();

    let brain_after: Vec<_> = session.scene().ids_for_role(Role::Brain).collect();
    let mask_after: Vec<_> = session.scene().ids_for_role(Role::Mask).collect();
    assert_eq!(mask_after, mask_before);
    assert_eq!(brain_after.len(), brain_before.len());
    assert!(brain_after.iter().all(|id| !brain_before.contains(id)));
    assert_eq!(session.renderer().removed, brain_before);
    assert_eq!(
        session.renderer().added.len(),
        2 * brain_before.len() + mask_before.len()
    );
    assert_eq!(session.path(Role::Brain), Some(Path::new("brain2.nii.gz")));
}

#[test]
fn failed_reload_leaves_role_untouched() {
    let mut session = opened("mask.nii.gz");
    let mask_before: Vec<_> = session.scene().ids_for_role(Role::Mask).collect();
    let err = session
        .reload(Role::Mask, "broken.nii.gz", &mut NoProgress)
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Load {
            role: Role::Mask,
            source: VolumeLoaderError::UnsupportedDimensions(_)
        }
    ));
    assert_eq!(session.scene().ids_for_role(Role::Mask).collect::<Vec<_>>(), mask_before);
    assert_eq!(session.mask_labels().unwrap().len(), 3);
    assert!(session.renderer().removed.is_empty());
}

#[test]
fn opacity_changes_keep_geometry() {
    let mut session = opened("mask.nii.gz");
    let brain = surface_geometry(&session, Role::Brain, 0);
    let mask = surface_geometry(&session, Role::Mask, 1);
    let updates = session.renderer().updates;

    for i in 0..5 {
        let opacity = i as f32 / 5.0;
        assert_eq!(session.set_brain_opacity(opacity), RecomputeClass::MaterialOnly);
        assert_eq!(session.set_mask_opacity(opacity), RecomputeClass::MaterialOnly);

        let id = session.surface_id(Role::Brain, 0).unwrap();
        assert_eq!(session.scene().get(id).unwrap().opacity(), opacity);
        assert!(Arc::ptr_eq(&surface_geometry(&session, Role::Brain, 0), &brain));
        assert!(Arc::ptr_eq(&surface_geometry(&session, Role::Mask, 1), &mask));
    }
    // one brain surface and three mask surfaces per round
    assert_eq!(session.renderer().updates, updates + 5 * 4);
    let label = session.brain_labels().unwrap().get(0).unwrap();
    assert!(Arc::ptr_eq(&label.mesh.as_ref().unwrap().geometry, &brain));
}

#[test]
fn opacity_is_clamped() {
    let mut session = opened("mask.nii.gz");
    session.set_brain_opacity(4.0);
    let id = session.surface_id(Role::Brain, 0).unwrap();
    assert_eq!(session.scene().get(id).unwrap().opacity(), 1.0);
    session.set_mask_opacity(-1.0);
    assert_eq!(session.mask_opacity(), 0.0);
}

#[test]
fn hidden_labels_ignore_mask_opacity() {
    let mut session = opened("mask.nii.gz");
    let first = session.surface_id(Role::Mask, 0).unwrap();
    let second = session.surface_id(Role::Mask, 1).unwrap();

    session.set_label_visible(0, false);
    assert_eq!(session.scene().get(first).unwrap().opacity(), 0.0);

    session.set_mask_opacity(0.5);
    assert_eq!(session.scene().get(first).unwrap().opacity(), 0.0);
    assert_eq!(session.scene().get(second).unwrap().opacity(), 0.5);

    session.set_label_visible(0, true);
    assert_eq!(session.scene().get(first).unwrap().opacity(), 0.5);
}

#[test]
fn color_mode_repaints_mask() {
    let mut session = opened("mask.nii.gz");
    let config = ViewerConfig::default();
    let color = |session: &Session<Recording, Stub>, i: usize| {
        let id = session.surface_id(Role::Mask, i).unwrap();
        match session.scene().get(id) {
            Some(Primitive::Surface { mesh, .. }) => mesh.material.color,
            _ => panic!("missing mask surface"),
        }
    };

    assert_eq!(session.set_mask_color_mode(ColorMode::Single), RecomputeClass::MaterialOnly);
    for i in 0..3 {
        assert_eq!(color(&session, i), config.mask_colors[0]);
    }
    session.set_mask_color_mode(ColorMode::Multi);
    for i in 0..3 {
        assert_eq!(color(&session, i), config.mask_colors[i]);
    }
}

#[test]
fn disabled_labels_ignore_controls() {
    let mut session = opened("gaps.nii.gz");
    let labels = session.mask_labels().unwrap();
    assert_eq!(labels.len(), 3);
    assert!(labels.get(1).unwrap().mesh.is_none());
    assert_eq!(session.surface_id(Role::Mask, 1), None);
    assert_eq!(session.scene().count_for_role(Role::Mask), 2);

    assert_eq!(session.set_label_visible(1, true), RecomputeClass::None);
    assert_eq!(session.set_label_visible(1, false), RecomputeClass::None);
    assert!(session.mask_labels().unwrap().get(1).unwrap().visible);

    assert_eq!(session.set_mask_smoothness(200, &mut NoProgress), RecomputeClass::Resmooth);
    let labels = session.mask_labels().unwrap();
    assert_eq!(labels.get(0).unwrap().smoothness, 200);
    assert_eq!(labels.get(1).unwrap().smoothness, 500);
    assert!(labels.get(1).unwrap().mesh.is_none());
}

#[test]
fn empty_threshold_disables_brain_surface() {
    let mut session = opened("mask.nii.gz");
    // clamps to the minimum, where every voxel is inside
    assert_eq!(
        session.set_brain_threshold(-100.0, &mut NoProgress),
        RecomputeClass::FullExtraction
    );
    let label = session.brain_labels().unwrap().get(0).unwrap();
    assert_eq!(label.extractor_value, 0.0);
    assert!(label.mesh.is_none());
    assert!(!label.enabled);
    assert_eq!(session.surface_id(Role::Brain, 0), None);
    let status = session.status().unwrap();
    assert_eq!(status.severity, Severity::Info);
    assert!(status.text.contains("No brain surface"));

    assert_eq!(session.set_brain_threshold(800.0, &mut NoProgress), RecomputeClass::None);
    assert_eq!(session.set_brain_smoothness(200, &mut NoProgress), RecomputeClass::None);
    assert_eq!(session.set_brain_opacity(0.5), RecomputeClass::None);
}

#[test]
fn rebuild_with_same_inputs_is_deterministic() {
    let mut session = opened("mask.nii.gz");
    let before = surface_geometry(&session, Role::Brain, 0);
    assert_eq!(
        session.set_brain_threshold(837.5, &mut NoProgress),
        RecomputeClass::FullExtraction
    );
    let after = surface_geometry(&session, Role::Brain, 0);
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before.vertex_count(), after.vertex_count());
    assert_eq!(before.triangle_count(), after.triangle_count());
}

#[test]
fn smoothness_change_keeps_material() {
    let mut session = opened("mask.nii.gz");
    session.set_brain_opacity(0.6);
    let mut stages = Vec::new();
    let mut record = |stage: Stage, _: f32| stages.push(stage);
    assert_eq!(
        session.set_brain_smoothness(100, &mut record),
        RecomputeClass::Resmooth
    );
    assert!(!stages.contains(&Stage::Extract));
    let id = session.surface_id(Role::Brain, 0).unwrap();
    assert_eq!(session.scene().get(id).unwrap().opacity(), 0.6);
    assert_eq!(session.brain_labels().unwrap().get(0).unwrap().smoothness, 100);
}

#[test]
fn slicer_and_projection_are_exclusive() {
    let mut session = opened("mask.nii.gz");
    let slices = Orientation::ALL.map(|o| session.slice_id(o).unwrap());
    let projection = session.projection_id().unwrap();

    session.set_projection(true);
    assert_eq!(plane_opacity(&session, projection), 1.0);
    assert!(!session.mode_controls().slicer_control);

    session.set_slicer(true);
    assert_eq!(plane_opacity(&session, projection), 0.0);
    for id in slices {
        assert_eq!(plane_opacity(&session, id), 1.0);
    }
    assert_eq!(
        session.mode_controls(),
        ModeControls {
            slicer_control: true,
            projection_control: false,
            slice_sliders: true,
        }
    );

    session.set_projection(true);
    for id in slices {
        assert_eq!(plane_opacity(&session, id), 0.0);
    }
    assert_eq!(plane_opacity(&session, projection), 1.0);
    assert!(!session.mode_controls().slice_sliders);
}

#[test]
fn slice_position_moves_display_window() {
    let mut session = opened("mask.nii.gz");
    let axial = session.slice_id(Orientation::Axial).unwrap();
    assert_eq!(
        session.set_slice_position(Orientation::Axial, 3),
        RecomputeClass::None
    );

    session.set_slicer(true);
    assert_eq!(
        session.set_slice_position(Orientation::Axial, 3),
        RecomputeClass::DisplayWindow
    );
    session.set_slice_position(Orientation::Sagittal, 99);
    let extent = |id| match session.scene().get(id) {
        Some(Primitive::Slice(plane)) => plane.display_extent,
        _ => panic!("missing slice"),
    };
    assert_eq!(extent(axial).to_array(), [0, 12, 0, 12, 3, 3]);
    let sagittal = session.slice_id(Orientation::Sagittal).unwrap();
    assert_eq!(
        extent(sagittal),
        Extent {
            min: [12, 0, 0],
            max: [12, 12, 12]
        }
    );
}

#[test]
fn lookup_value_remaps_plane_images() {
    let mut session = opened("mask.nii.gz");
    let axial = session.slice_id(Orientation::Axial).unwrap();
    let image = |session: &Session<Recording, Stub>| match session.scene().get(axial) {
        Some(Primitive::Slice(plane)) => plane.image.clone(),
        _ => panic!("missing slice"),
    };
    let before = image(&session);
    assert_eq!(session.set_lookup_value(1.0), RecomputeClass::ImageRemap);
    let after = image(&session);
    assert_eq!(before.dimensions(), after.dimensions());
    assert_ne!(*before, *after);
    assert_eq!(session.lookup_table().unwrap().value_range(), (0.0, 1.0));

    session.set_lookup_value(9.0);
    assert_eq!(session.lookup_value(), 3.0);
}

#[test]
fn view_presets_center_the_camera() {
    let mut session = opened("mask.nii.gz");
    let center = session.scene().bounds().unwrap().center();
    for preset in [ViewPreset::Coronal, ViewPreset::Sagittal, ViewPreset::Axial] {
        assert_eq!(session.set_view(preset), RecomputeClass::Camera);
        let camera = session.renderer().camera.unwrap();
        assert_eq!(camera.focal_point, center);
        assert_eq!(session.view(), preset);
        match session.scene().get(session.projection_id().unwrap()) {
            Some(Primitive::Projection(plane)) => assert_eq!(plane.orientation, preset.orientation()),
            _ => panic!("missing projection plane"),
        }
    }
}

#[test]
fn every_handler_renders_once() {
    let mut session = opened("mask.nii.gz");
    let controls = [
        Control::BrainOpacity(0.4),
        Control::MaskOpacity(0.4),
        Control::MaskColorMode(ColorMode::Single),
        Control::LabelVisible {
            label: 2,
            visible: false,
        },
        Control::LabelVisible {
            label: 8,
            visible: true,
        },
        Control::LookupValue(1.5),
        Control::Slicer(true),
        Control::SlicePosition {
            orientation: Orientation::Coronal,
            position: 2,
        },
        Control::Projection(true),
        Control::View(ViewPreset::Sagittal),
        Control::BrainSmoothness(200),
        Control::MaskSmoothness(300),
        Control::BrainThreshold(900.0),
    ];
    for control in controls {
        let frames = session.renderer().frames;
        session.apply(control, &mut NoProgress);
        assert_eq!(session.renderer().frames, frames + 1, "{control:?}");
    }
}

#[test]
fn reload_resets_modes() {
    let mut session = opened("mask.nii.gz");
    session.set_slicer(true);
    session
        .reload(Role::Brain, "brain.nii.gz", &mut NoProgress)
        .unwrap();
    assert_eq!(session.brain_modes(), Default::default());
    for o in Orientation::ALL {
        assert_eq!(plane_opacity(&session, session.slice_id(o).unwrap()), 0.0);
    }
}
