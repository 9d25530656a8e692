use crate::config::Rgb;

use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;
use std::sync::Arc;

/// Indexed triangle mesh produced by the reconstruction stages.
///
/// `normals` is either empty or holds one unit normal per position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriMesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

/// Interleaved vertex layout handed to a GPU renderer
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl TriMesh {
    pub fn new(positions: Vec<[f32; 3]>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            normals: Vec::new(),
            triangles,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    #[inline]
    pub fn position(&self, index: u32) -> Vector3<f32> {
        Vector3::from(self.positions[index as usize])
    }

    /// Unnormalized face normal; its length is twice the triangle area
    pub fn face_normal(&self, triangle: usize) -> Vector3<f32> {
        let [a, b, c] = self.triangles[triangle];
        let a = self.position(a);
        (self.position(b) - a).cross(&(self.position(c) - a))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(self.positions.iter().map(|&p| Point3::from(p)))
    }

    /// Sorted, deduplicated one-ring of every vertex
    pub fn vertex_neighbors(&self) -> Vec<Vec<u32>> {
        let mut neighbors = vec![Vec::new(); self.positions.len()];
        for &[a, b, c] in &self.triangles {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                neighbors[u as usize].push(v);
                neighbors[v as usize].push(u);
            }
        }
        for ring in &mut neighbors {
            ring.sort_unstable();
            ring.dedup();
        }
        neighbors
    }

    /// Number of undirected edges used by exactly one triangle
    pub fn boundary_edge_count(&self) -> usize {
        let mut uses: HashMap<(u32, u32), usize> = HashMap::new();
        for &[a, b, c] in &self.triangles {
            for (u, v) in [(a, b), (b, c), (c, a)] {
                *uses.entry((u.min(v), u.max(v))).or_default() += 1;
            }
        }
        uses.values().filter(|&&n| n == 1).count()
    }

    /// True when every directed edge is matched by its reverse exactly once
    pub fn is_closed_and_oriented(&self) -> bool {
        let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
        for &[a, b, c] in &self.triangles {
            for edge in [(a, b), (b, c), (c, a)] {
                *directed.entry(edge).or_default() += 1;
            }
        }
        directed
            .iter()
            .all(|(&(u, v), &n)| n == 1 && directed.get(&(v, u)) == Some(&1))
    }

    /// Drops positions no triangle refers to, renumbering the rest in order
    pub fn compact(&mut self) {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        for tri in &mut self.triangles {
            for index in tri.iter_mut() {
                let slot = &mut remap[*index as usize];
                if *slot == u32::MAX {
                    *slot = positions.len() as u32;
                    positions.push(self.positions[*index as usize]);
                    if let Some(n) = self.normals.get(*index as usize) {
                        normals.push(*n);
                    }
                }
                *index = *slot;
            }
        }
        self.positions = positions;
        self.normals = normals;
    }

    /// Interleaved vertices; missing normals are zero
    pub fn vertices(&self) -> Vec<Vertex> {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, &position)| Vertex {
                position,
                normal: self.normals.get(i).copied().unwrap_or_default(),
            })
            .collect()
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.triangles)
    }
}

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Point3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |b, p| b.include(p)))
    }

    pub fn include(self, p: Point3<f32>) -> Self {
        Self {
            min: self.min.inf(&p),
            max: self.max.sup(&p),
        }
    }

    pub fn union(self, other: Bounds) -> Self {
        self.include(other.min).include(other.max)
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn diagonal(&self) -> f32 {
        (self.max - self.min).norm()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub color: Rgb,
    pub opacity: f32,
}

/// Geometry plus material of one surface primitive.
///
/// Material edits never touch `geometry`, which is shared with the scene.
#[derive(Clone, Debug)]
pub struct RenderMesh {
    pub geometry: Arc<TriMesh>,
    pub material: Material,
}

impl RenderMesh {
    pub fn new(geometry: TriMesh, material: Material) -> Self {
        Self {
            geometry: Arc::new(geometry),
            material,
        }
    }
}
