//! Iso-surface extraction over a scalar volume.
//!
//! Both flavors walk every cell of the voxel grid with the classic marching
//! cubes tables and weld vertices per grid edge, so the output is a single
//! indexed mesh whose triangles face away from the inside region.

use crate::enums::ExtractionMode;
use crate::mesh::TriMesh;
use crate::pipeline::{Progress, Stage};
use crate::tables::{EDGE_TABLE, TRI_TABLE};
use crate::volume::Volume;

use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;

const CORNER_OFFSETS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

const EDGE_ENDPOINTS: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

/// Cell layers handled between two progress reports
const LAYERS_PER_CHUNK: usize = 8;

/// Grid edge identified by its lower endpoint and axis
type EdgeKey = ([usize; 3], usize);

struct Classifier {
    mode: ExtractionMode,
    value: f32,
}

impl Classifier {
    #[inline]
    fn inside(&self, sample: f32) -> bool {
        match self.mode {
            ExtractionMode::Continuous => sample >= self.value,
            ExtractionMode::Discrete => sample.round() == self.value.round(),
        }
    }

    /// Fraction along the edge from `a` to `b` where the surface crosses
    #[inline]
    fn crossing(&self, a: f32, b: f32) -> f32 {
        match self.mode {
            ExtractionMode::Continuous => {
                let delta = b - a;
                if delta == 0.0 {
                    0.5
                } else {
                    ((self.value - a) / delta).clamp(0.0, 1.0)
                }
            }
            ExtractionMode::Discrete => 0.5,
        }
    }
}

/// Extracts the surface at `value`, returning an empty mesh if nothing crosses it
pub fn extract_surface(
    volume: &Volume,
    value: f32,
    mode: ExtractionMode,
    progress: &mut dyn Progress,
) -> TriMesh {
    let (nx, ny, nz) = volume.dim();
    if nx < 2 || ny < 2 || nz < 2 {
        return TriMesh::default();
    }
    let classifier = Classifier { mode, value };
    let layers = nz - 1;

    let mut builder = MeshBuilder::new(volume, &classifier);
    let mut z0 = 0;
    while z0 < layers {
        let z1 = (z0 + LAYERS_PER_CHUNK).min(layers);
        let chunk: Vec<Vec<[EdgeKey; 3]>> = (z0..z1)
            .into_par_iter()
            .map(|z| march_layer(volume, &classifier, z))
            .collect();
        for layer in chunk {
            builder.extend(layer);
        }
        progress.tick(Stage::Extract, z1 as f32 / layers as f32);
        z0 = z1;
    }

    let mesh = builder.finish();
    debug!(
        "{:?} extraction at {} produced {} triangles",
        mode,
        value,
        mesh.triangle_count()
    );
    mesh
}

fn march_layer(volume: &Volume, classifier: &Classifier, z: usize) -> Vec<[EdgeKey; 3]> {
    let (nx, ny, _) = volume.dim();
    let mut triangles = Vec::new();
    for y in 0..(ny - 1) {
        for x in 0..(nx - 1) {
            let mut case_index = 0usize;
            for (corner, offset) in CORNER_OFFSETS.iter().enumerate() {
                let sample = volume.sample(x + offset[0], y + offset[1], z + offset[2]);
                if classifier.inside(sample) {
                    case_index |= 1 << corner;
                }
            }
            if EDGE_TABLE[case_index] == 0 {
                continue;
            }

            for tri in TRI_TABLE[case_index].chunks_exact(3) {
                if tri[0] < 0 {
                    break;
                }
                let key = |edge: i8| edge_key([x, y, z], edge as usize);
                triangles.push([key(tri[0]), key(tri[1]), key(tri[2])]);
            }
        }
    }
    triangles
}

fn edge_key(cell: [usize; 3], edge: usize) -> EdgeKey {
    let [a, b] = EDGE_ENDPOINTS[edge];
    let (ca, cb) = (CORNER_OFFSETS[a], CORNER_OFFSETS[b]);
    let axis = (0..3).find(|&i| ca[i] != cb[i]).unwrap_or(0);
    let lower = [
        cell[0] + ca[0].min(cb[0]),
        cell[1] + ca[1].min(cb[1]),
        cell[2] + ca[2].min(cb[2]),
    ];
    (lower, axis)
}

struct MeshBuilder<'a> {
    volume: &'a Volume,
    classifier: &'a Classifier,
    spacing: [f32; 3],
    vertices: HashMap<EdgeKey, u32>,
    mesh: TriMesh,
}

impl<'a> MeshBuilder<'a> {
    fn new(volume: &'a Volume, classifier: &'a Classifier) -> Self {
        let (sx, sy, sz) = volume.spacing();
        Self {
            volume,
            classifier,
            spacing: [sx, sy, sz],
            vertices: HashMap::new(),
            mesh: TriMesh::default(),
        }
    }

    fn extend(&mut self, triangles: Vec<[EdgeKey; 3]>) {
        self.mesh.triangles.reserve(triangles.len());
        for keys in triangles {
            let tri = keys.map(|key| self.vertex(key));
            self.mesh.triangles.push(tri);
        }
    }

    fn vertex(&mut self, key: EdgeKey) -> u32 {
        if let Some(&index) = self.vertices.get(&key) {
            return index;
        }
        let (lower, axis) = key;
        let mut upper = lower;
        upper[axis] += 1;
        let a = self.volume.sample(lower[0], lower[1], lower[2]);
        let b = self.volume.sample(upper[0], upper[1], upper[2]);
        let t = self.classifier.crossing(a, b);

        let mut position = [0.0f32; 3];
        for i in 0..3 {
            let coord = lower[i] as f32 + if i == axis { t } else { 0.0 };
            position[i] = coord * self.spacing[i];
        }

        let index = self.mesh.positions.len() as u32;
        self.mesh.positions.push(position);
        self.vertices.insert(key, index);
        index
    }

    fn finish(self) -> TriMesh {
        self.mesh
    }
}
