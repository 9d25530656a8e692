//! Topology-preserving decimation.
//!
//! Repeated half-edge collapses ordered by quadric error. A collapse `u -> v`
//! is only taken when the edge passes the link condition, no surviving face
//! flips, no duplicate face appears and `u` does not sit on an open boundary.
//! Vertex positions are never moved, only removed.

use crate::mesh::TriMesh;
use crate::pipeline::{Progress, Stage};

use log::debug;
use nalgebra::{Matrix4, Vector3, Vector4};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Collapses between two progress reports
const REPORT_EVERY: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    cost: OrderedFloat<f64>,
    from: u32,
    to: u32,
    from_version: u32,
    to_version: u32,
}

struct Decimator {
    positions: Vec<Vector3<f64>>,
    triangles: Vec<[u32; 3]>,
    alive: Vec<bool>,
    vertex_tris: Vec<Vec<u32>>,
    quadrics: Vec<Matrix4<f64>>,
    version: Vec<u32>,
    removed: Vec<bool>,
    boundary: Vec<bool>,
    heap: BinaryHeap<Reverse<Candidate>>,
    live: usize,
}

/// Removes up to `target_reduction` of the triangles of `mesh`.
///
/// Stops early, returning a less reduced mesh, when no collapse remains that
/// keeps the topology intact.
pub fn decimate(mesh: &TriMesh, target_reduction: f32, progress: &mut dyn Progress) -> TriMesh {
    let reduction = target_reduction.clamp(0.0, 1.0) as f64;
    if mesh.is_empty() || reduction == 0.0 {
        return mesh.clone();
    }
    let target = ((1.0 - reduction) * mesh.triangle_count() as f64).round() as usize;

    let mut decimator = Decimator::new(mesh);
    let wanted = decimator.live.saturating_sub(target).max(1);
    let mut collapses = 0;
    while decimator.live > target {
        let Some(Reverse(candidate)) = decimator.heap.pop() else {
            break;
        };
        if !decimator.is_current(&candidate) || !decimator.can_collapse(candidate.from, candidate.to) {
            continue;
        }
        decimator.collapse(candidate.from, candidate.to);
        collapses += 1;
        if collapses % REPORT_EVERY == 0 {
            let done = mesh.triangle_count() - decimator.live;
            progress.tick(Stage::Decimate, (done as f32 / wanted as f32).min(1.0));
        }
    }
    progress.tick(Stage::Decimate, 1.0);

    let out = decimator.finish();
    debug!(
        "decimated {} -> {} triangles (target {})",
        mesh.triangle_count(),
        out.triangle_count(),
        target
    );
    out
}

impl Decimator {
    fn new(mesh: &TriMesh) -> Self {
        let n = mesh.vertex_count();
        let positions: Vec<Vector3<f64>> = mesh
            .positions
            .iter()
            .map(|p| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();

        let mut vertex_tris = vec![Vec::new(); n];
        let mut quadrics = vec![Matrix4::zeros(); n];
        let mut edge_uses: HashMap<(u32, u32), u32> = HashMap::new();
        for (t, tri) in mesh.triangles.iter().enumerate() {
            let q = Self::plane_quadric(&positions, tri);
            for &v in tri {
                vertex_tris[v as usize].push(t as u32);
                quadrics[v as usize] += q;
            }
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *edge_uses.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        let mut boundary = vec![false; n];
        for (&(a, b), &uses) in &edge_uses {
            if uses != 2 {
                boundary[a as usize] = true;
                boundary[b as usize] = true;
            }
        }

        let mut decimator = Self {
            positions,
            triangles: mesh.triangles.clone(),
            alive: vec![true; mesh.triangle_count()],
            vertex_tris,
            quadrics,
            version: vec![0; n],
            removed: vec![false; n],
            boundary,
            heap: BinaryHeap::new(),
            live: mesh.triangle_count(),
        };
        let mut edges: Vec<(u32, u32)> = edge_uses.into_keys().collect();
        edges.sort_unstable();
        for (a, b) in edges {
            decimator.push(a, b);
            decimator.push(b, a);
        }
        decimator
    }

    /// Area-weighted quadric of the plane through a triangle
    fn plane_quadric(positions: &[Vector3<f64>], tri: &[u32; 3]) -> Matrix4<f64> {
        let [a, b, c] = tri.map(|i| positions[i as usize]);
        let cross = (b - a).cross(&(c - a));
        let double_area = cross.norm();
        if double_area <= f64::EPSILON {
            return Matrix4::zeros();
        }
        let n = cross / double_area;
        let plane = Vector4::new(n.x, n.y, n.z, -n.dot(&a));
        plane * plane.transpose() * (double_area / 2.0)
    }

    fn cost(&self, from: u32, to: u32) -> f64 {
        let q = self.quadrics[from as usize] + self.quadrics[to as usize];
        let p = self.positions[to as usize];
        let h = Vector4::new(p.x, p.y, p.z, 1.0);
        (h.transpose() * q * h)[(0, 0)].max(0.0)
    }

    fn push(&mut self, from: u32, to: u32) {
        if self.boundary[from as usize] {
            return;
        }
        let candidate = Candidate {
            cost: OrderedFloat(self.cost(from, to)),
            from,
            to,
            from_version: self.version[from as usize],
            to_version: self.version[to as usize],
        };
        self.heap.push(Reverse(candidate));
    }

    fn is_current(&self, c: &Candidate) -> bool {
        !self.removed[c.from as usize]
            && !self.removed[c.to as usize]
            && self.version[c.from as usize] == c.from_version
            && self.version[c.to as usize] == c.to_version
    }

    fn live_tris(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.vertex_tris[v as usize]
            .iter()
            .copied()
            .filter(|&t| self.alive[t as usize])
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut ring: Vec<u32> = self
            .live_tris(v)
            .flat_map(|t| self.triangles[t as usize])
            .filter(|&w| w != v)
            .collect();
        ring.sort_unstable();
        ring.dedup();
        ring
    }

    fn face_normal(&self, tri: [u32; 3]) -> Vector3<f64> {
        let [a, b, c] = tri.map(|i| self.positions[i as usize]);
        (b - a).cross(&(c - a))
    }

    fn can_collapse(&self, from: u32, to: u32) -> bool {
        if self.boundary[from as usize] {
            return false;
        }

        // Link condition: the shared one-ring must be exactly the apexes of
        // the faces on the edge.
        let mut apexes: Vec<u32> = self
            .live_tris(from)
            .map(|t| self.triangles[t as usize])
            .filter(|tri| tri.contains(&to))
            .flat_map(move |tri| tri.into_iter().filter(move |&w| w != from && w != to))
            .collect();
        if apexes.is_empty() {
            return false;
        }
        apexes.sort_unstable();
        let to_ring = self.neighbors(to);
        let shared: Vec<u32> = self
            .neighbors(from)
            .into_iter()
            .filter(|w| to_ring.binary_search(w).is_ok())
            .collect();
        if shared != apexes {
            return false;
        }

        let mut kept_faces: Vec<[u32; 3]> = self
            .live_tris(to)
            .map(|t| self.triangles[t as usize])
            .filter(|tri| !tri.contains(&from))
            .map(sorted)
            .collect();
        kept_faces.sort_unstable();

        for t in self.live_tris(from) {
            let tri = self.triangles[t as usize];
            if tri.contains(&to) {
                continue;
            }
            let moved = tri.map(|w| if w == from { to } else { w });
            if self.face_normal(tri).dot(&self.face_normal(moved)) < 0.0 {
                return false;
            }
            if kept_faces.binary_search(&sorted(moved)).is_ok() {
                return false;
            }
        }
        true
    }

    fn collapse(&mut self, from: u32, to: u32) {
        let incident = std::mem::take(&mut self.vertex_tris[from as usize]);
        for t in incident {
            if !self.alive[t as usize] {
                continue;
            }
            let tri = &mut self.triangles[t as usize];
            if tri.contains(&to) {
                self.alive[t as usize] = false;
                self.live -= 1;
            } else {
                for w in tri.iter_mut() {
                    if *w == from {
                        *w = to;
                    }
                }
                self.vertex_tris[to as usize].push(t);
            }
        }
        let alive = &self.alive;
        self.vertex_tris[to as usize].retain(|&t| alive[t as usize]);

        self.removed[from as usize] = true;
        let q = self.quadrics[from as usize];
        self.quadrics[to as usize] += q;
        self.version[to as usize] += 1;

        for w in self.neighbors(to) {
            self.push(w, to);
            self.push(to, w);
        }
    }

    fn finish(self) -> TriMesh {
        let triangles = self
            .triangles
            .into_iter()
            .zip(self.alive)
            .filter_map(|(tri, alive)| alive.then_some(tri))
            .collect();
        let positions = self
            .positions
            .iter()
            .map(|p| [p.x as f32, p.y as f32, p.z as f32])
            .collect();
        let mut mesh = TriMesh::new(positions, triangles);
        mesh.compact();
        mesh
    }
}

fn sorted(mut tri: [u32; 3]) -> [u32; 3] {
    tri.sort_unstable();
    tri
}
