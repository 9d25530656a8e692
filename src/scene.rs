//! Scene ownership and the slicer / projection mode state machine.
//!
//! The [`SceneManager`] is the only owner of renderable primitives. It hands
//! every mutation to an injected [`Renderer`], which stands in for the GPU
//! backend and may draw however it likes.

use crate::camera::Camera;
use crate::enums::{Orientation, PeerMode, Role};
use crate::mesh::{Bounds, Material, RenderMesh};
use crate::volume::Extent;

use image::GrayImage;
use log::debug;
use nalgebra::Point3;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrimitiveId(u64);

/// A textured plane through the brain volume
#[derive(Clone, Debug)]
pub struct ImagePlane {
    pub orientation: Orientation,
    /// Voxel window shown; one axis is collapsed to the plane position
    pub display_extent: Extent,
    pub spacing: [f32; 3],
    pub opacity: f32,
    pub image: Arc<GrayImage>,
}

impl ImagePlane {
    pub fn position(&self) -> usize {
        self.display_extent.min[self.orientation.normal_axis()]
    }

    pub fn bounds(&self) -> Bounds {
        let corner = |index: [usize; 3]| {
            Point3::new(
                index[0] as f32 * self.spacing[0],
                index[1] as f32 * self.spacing[1],
                index[2] as f32 * self.spacing[2],
            )
        };
        Bounds {
            min: corner(self.display_extent.min),
            max: corner(self.display_extent.max),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Primitive {
    /// Reconstructed surface of one label
    Surface { label: usize, mesh: RenderMesh },
    /// One of the three orthogonal slicer planes
    Slice(ImagePlane),
    /// Camera-facing plane through the focal point
    Projection(ImagePlane),
}

impl Primitive {
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Primitive::Surface { mesh, .. } => mesh.geometry.bounds(),
            Primitive::Slice(plane) | Primitive::Projection(plane) => Some(plane.bounds()),
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Primitive::Surface { mesh, .. } => mesh.material.opacity,
            Primitive::Slice(plane) | Primitive::Projection(plane) => plane.opacity,
        }
    }
}

/// Scene mutation interface implemented by the drawing backend
pub trait Renderer {
    fn add(&mut self, id: PrimitiveId, primitive: &Primitive);
    fn update(&mut self, id: PrimitiveId, primitive: &Primitive);
    fn remove(&mut self, id: PrimitiveId);
    fn set_camera(&mut self, camera: &Camera);
    /// Draw a frame; called once at the end of every handler
    fn render(&mut self);
}

/// Renderer that draws nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn add(&mut self, _id: PrimitiveId, _primitive: &Primitive) {}
    fn update(&mut self, _id: PrimitiveId, _primitive: &Primitive) {}
    fn remove(&mut self, _id: PrimitiveId) {}
    fn set_camera(&mut self, _camera: &Camera) {}
    fn render(&mut self) {}
}

pub struct SceneManager<R> {
    renderer: R,
    next_id: u64,
    primitives: BTreeMap<PrimitiveId, (Role, Primitive)>,
}

impl<R: Renderer> SceneManager<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            next_id: 0,
            primitives: BTreeMap::new(),
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn add(&mut self, role: Role, primitive: Primitive) -> PrimitiveId {
        let id = PrimitiveId(self.next_id);
        self.next_id += 1;
        self.renderer.add(id, &primitive);
        self.primitives.insert(id, (role, primitive));
        id
    }

    /// Removes every primitive of `role`, returning how many were dropped
    pub fn remove_role(&mut self, role: Role) -> usize {
        let ids: Vec<PrimitiveId> = self.ids_for_role(role).collect();
        for &id in &ids {
            self.primitives.remove(&id);
            self.renderer.remove(id);
        }
        debug!("removed {} {role} primitives", ids.len());
        ids.len()
    }

    pub fn remove(&mut self, id: PrimitiveId) -> bool {
        let removed = self.primitives.remove(&id).is_some();
        if removed {
            self.renderer.remove(id);
        }
        removed
    }

    pub fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.primitives.get(&id).map(|(_, primitive)| primitive)
    }

    /// Edits a primitive in place and forwards the result to the renderer
    pub fn update(&mut self, id: PrimitiveId, edit: impl FnOnce(&mut Primitive)) -> bool {
        let Some((_, primitive)) = self.primitives.get_mut(&id) else {
            return false;
        };
        edit(primitive);
        self.renderer.update(id, primitive);
        true
    }

    /// Replaces the material of a surface; geometry is left alone
    pub fn update_material(&mut self, id: PrimitiveId, material: Material) -> bool {
        self.update(id, |primitive| {
            if let Primitive::Surface { mesh, .. } = primitive {
                mesh.material = material;
            }
        })
    }

    pub fn set_display_extent(&mut self, id: PrimitiveId, extent: Extent, image: Arc<GrayImage>) -> bool {
        self.update(id, |primitive| {
            if let Primitive::Slice(plane) | Primitive::Projection(plane) = primitive {
                plane.display_extent = extent;
                plane.image = image;
            }
        })
    }

    pub fn set_plane_image(&mut self, id: PrimitiveId, image: Arc<GrayImage>) -> bool {
        self.update(id, |primitive| {
            if let Primitive::Slice(plane) | Primitive::Projection(plane) = primitive {
                plane.image = image;
            }
        })
    }

    pub fn set_plane_opacity(&mut self, id: PrimitiveId, opacity: f32) -> bool {
        self.update(id, |primitive| {
            if let Primitive::Slice(plane) | Primitive::Projection(plane) = primitive {
                plane.opacity = opacity;
            }
        })
    }

    pub fn ids_for_role(&self, role: Role) -> impl Iterator<Item = PrimitiveId> + '_ {
        self.primitives
            .iter()
            .filter(move |(_, (r, _))| *r == role)
            .map(|(&id, _)| id)
    }

    pub fn count_for_role(&self, role: Role) -> usize {
        self.ids_for_role(role).count()
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    /// Union of the bounds of every primitive in the scene
    pub fn bounds(&self) -> Option<Bounds> {
        self.primitives
            .values()
            .filter_map(|(_, primitive)| primitive.bounds())
            .reduce(Bounds::union)
    }

    pub fn set_camera(&mut self, camera: &Camera) {
        self.renderer.set_camera(camera);
    }

    pub fn render(&mut self) {
        self.renderer.render();
    }
}

/// What the UI may touch given the current modes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeControls {
    pub slicer_control: bool,
    pub projection_control: bool,
    pub slice_sliders: bool,
}

/// Opacity change the scene must apply after a mode transition
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneOpacity {
    pub mode: PeerMode,
    pub opacity: f32,
}

/// Slicer and projection toggles of the brain volume.
///
/// At most one is on at a time; the brain surface is untouched by both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrainModes {
    slicer: bool,
    projection: bool,
}

impl BrainModes {
    pub fn is_active(&self, mode: PeerMode) -> bool {
        match mode {
            PeerMode::Slicer => self.slicer,
            PeerMode::Projection => self.projection,
        }
    }

    fn set(&mut self, mode: PeerMode, on: bool) {
        match mode {
            PeerMode::Slicer => self.slicer = on,
            PeerMode::Projection => self.projection = on,
        }
    }

    /// Turns `mode` on, switching its peer off first if needed
    pub fn enable(&mut self, mode: PeerMode) -> Vec<PlaneOpacity> {
        if self.is_active(mode) {
            return Vec::new();
        }
        let mut effects = self.disable(mode.peer());
        self.set(mode, true);
        effects.push(PlaneOpacity { mode, opacity: 1.0 });
        effects
    }

    /// Turns `mode` off, undoing only its own effects
    pub fn disable(&mut self, mode: PeerMode) -> Vec<PlaneOpacity> {
        if !self.is_active(mode) {
            return Vec::new();
        }
        self.set(mode, false);
        vec![PlaneOpacity { mode, opacity: 0.0 }]
    }

    pub fn toggle(&mut self, mode: PeerMode, on: bool) -> Vec<PlaneOpacity> {
        if on {
            self.enable(mode)
        } else {
            self.disable(mode)
        }
    }

    pub fn controls(&self) -> ModeControls {
        ModeControls {
            slicer_control: !self.projection,
            projection_control: !self.slicer,
            slice_sliders: self.slicer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::tetrahedron;

    #[derive(Default)]
    struct Log {
        added: usize,
        updated: usize,
        removed: usize,
        frames: usize,
    }

    impl Renderer for Log {
        fn add(&mut self, _: PrimitiveId, _: &Primitive) {
            self.added += 1;
        }
        fn update(&mut self, _: PrimitiveId, _: &Primitive) {
            self.updated += 1;
        }
        fn remove(&mut self, _: PrimitiveId) {
            self.removed += 1;
        }
        fn set_camera(&mut self, _: &Camera) {}
        fn render(&mut self) {
            self.frames += 1;
        }
    }

    fn surface(label: usize) -> Primitive {
        Primitive::Surface {
            label,
            mesh: RenderMesh::new(
                tetrahedron(),
                Material {
                    color: [1.0; 3],
                    opacity: 1.0,
                },
            ),
        }
    }

    #[test]
    fn remove_role_leaves_other_role() {
        let mut scene = SceneManager::new(Log::default());
        scene.add(Role::Brain, surface(0));
        for i in 0..3 {
            scene.add(Role::Mask, surface(i));
        }
        assert_eq!(scene.remove_role(Role::Brain), 1);
        assert_eq!(scene.count_for_role(Role::Mask), 3);
        assert_eq!(scene.count_for_role(Role::Brain), 0);
        assert_eq!(scene.renderer().removed, 1);
        assert_eq!(scene.remove_role(Role::Brain), 0);
    }

    #[test]
    fn update_forwards_to_renderer() {
        let mut scene = SceneManager::new(Log::default());
        let id = scene.add(Role::Mask, surface(0));
        let edited = scene.update_material(
            id,
            Material {
                color: [0.0, 1.0, 0.0],
                opacity: 0.3,
            },
        );
        assert!(edited);
        assert!(!scene.set_plane_opacity(PrimitiveId(99), 1.0));
        assert_eq!(scene.get(id).unwrap().opacity(), 0.3);
        assert_eq!(scene.renderer().updated, 1);

        scene.remove_role(Role::Mask);
        assert!(!scene.update(id, |_| {}));
    }

    #[test]
    fn ids_are_never_reused() {
        let mut scene = SceneManager::new(NullRenderer);
        let a = scene.add(Role::Brain, surface(0));
        scene.remove_role(Role::Brain);
        let b = scene.add(Role::Brain, surface(0));
        assert_ne!(a, b);
    }

    #[test]
    fn scene_bounds_union() {
        let mut scene = SceneManager::new(NullRenderer);
        assert!(scene.bounds().is_none());
        scene.add(Role::Brain, surface(0));
        let plane = ImagePlane {
            orientation: Orientation::Axial,
            display_extent: Extent::from_dim((4, 4, 4)).plane(Orientation::Axial, 2),
            spacing: [2.0, 2.0, 2.0],
            opacity: 0.0,
            image: Arc::new(GrayImage::new(4, 4)),
        };
        assert_eq!(plane.position(), 2);
        scene.add(Role::Brain, Primitive::Slice(plane));
        let bounds = scene.bounds().unwrap();
        assert_eq!(bounds.min, Point3::origin());
        assert_eq!(bounds.max, Point3::new(6.0, 6.0, 4.0));
    }

    #[test]
    fn modes_start_off() {
        let modes = BrainModes::default();
        assert!(!modes.is_active(PeerMode::Slicer));
        assert!(!modes.is_active(PeerMode::Projection));
        assert_eq!(
            modes.controls(),
            ModeControls {
                slicer_control: true,
                projection_control: true,
                slice_sliders: false,
            }
        );
    }

    #[test]
    fn enabling_one_mode_turns_off_the_other() {
        let mut modes = BrainModes::default();
        assert_eq!(
            modes.enable(PeerMode::Projection),
            vec![PlaneOpacity {
                mode: PeerMode::Projection,
                opacity: 1.0
            }]
        );
        assert!(!modes.controls().slicer_control);

        let effects = modes.enable(PeerMode::Slicer);
        assert_eq!(
            effects,
            vec![
                PlaneOpacity {
                    mode: PeerMode::Projection,
                    opacity: 0.0
                },
                PlaneOpacity {
                    mode: PeerMode::Slicer,
                    opacity: 1.0
                },
            ]
        );
        assert!(modes.is_active(PeerMode::Slicer));
        assert!(!modes.is_active(PeerMode::Projection));
        assert_eq!(
            modes.controls(),
            ModeControls {
                slicer_control: true,
                projection_control: false,
                slice_sliders: true,
            }
        );
    }

    #[test]
    fn exclusivity_holds_for_every_sequence() {
        let moves = [
            (PeerMode::Slicer, true),
            (PeerMode::Slicer, false),
            (PeerMode::Projection, true),
            (PeerMode::Projection, false),
        ];
        // all sequences of length four
        for code in 0..moves.len().pow(4) {
            let mut modes = BrainModes::default();
            let mut c = code;
            for _ in 0..4 {
                let (mode, on) = moves[c % moves.len()];
                c /= moves.len();
                modes.toggle(mode, on);
                assert!(!(modes.is_active(PeerMode::Slicer) && modes.is_active(PeerMode::Projection)));
                assert_eq!(modes.is_active(mode), on);
            }
        }
    }

    #[test]
    fn repeated_toggles_have_no_effect() {
        let mut modes = BrainModes::default();
        assert!(modes.disable(PeerMode::Slicer).is_empty());
        modes.enable(PeerMode::Slicer);
        assert!(modes.enable(PeerMode::Slicer).is_empty());
    }
}
