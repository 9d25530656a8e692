use crate::mesh::TriMesh;
use crate::pipeline::{Progress, Stage};

use nalgebra::Vector3;
use rayon::prelude::*;
use std::collections::HashMap;

/// Iterations between two progress reports
const REPORT_EVERY: u32 = 50;

/// Laplacian smoothing: each pass moves every vertex `relaxation` of the way
/// toward the average of its neighbors.
///
/// Vertices on an open boundary only average along the boundary, so holes keep
/// their outline. Connectivity is never changed.
pub fn smooth(
    mesh: &TriMesh,
    iterations: u32,
    relaxation: f32,
    progress: &mut dyn Progress,
) -> TriMesh {
    let mut out = mesh.clone();
    if mesh.is_empty() || iterations == 0 || relaxation == 0.0 {
        return out;
    }
    let neighbors = smoothing_neighbors(mesh);

    let mut current: Vec<Vector3<f32>> = mesh.positions.iter().map(|&p| p.into()).collect();
    let mut next = current.clone();
    for i in 0..iterations {
        next.par_iter_mut().enumerate().for_each(|(v, slot)| {
            let ring = &neighbors[v];
            let p = current[v];
            if ring.is_empty() {
                *slot = p;
                return;
            }
            let sum = ring
                .iter()
                .fold(Vector3::zeros(), |acc, &w| acc + current[w as usize]);
            let average = sum / ring.len() as f32;
            *slot = p + (average - p) * relaxation;
        });
        std::mem::swap(&mut current, &mut next);
        if (i + 1) % REPORT_EVERY == 0 {
            progress.tick(Stage::Smooth, (i + 1) as f32 / iterations as f32);
        }
    }
    progress.tick(Stage::Smooth, 1.0);

    out.positions = current.iter().map(|p| [p.x, p.y, p.z]).collect();
    out.normals.clear();
    out
}

/// One-rings used for smoothing; boundary vertices keep boundary neighbors only
fn smoothing_neighbors(mesh: &TriMesh) -> Vec<Vec<u32>> {
    let mut uses: HashMap<(u32, u32), u32> = HashMap::new();
    for &[a, b, c] in &mesh.triangles {
        for (u, v) in [(a, b), (b, c), (c, a)] {
            *uses.entry((u.min(v), u.max(v))).or_default() += 1;
        }
    }
    let mut boundary_ring = vec![Vec::new(); mesh.vertex_count()];
    for (&(u, v), &n) in &uses {
        if n == 1 {
            boundary_ring[u as usize].push(v);
            boundary_ring[v as usize].push(u);
        }
    }

    mesh.vertex_neighbors()
        .into_iter()
        .zip(boundary_ring)
        .map(|(ring, mut boundary)| {
            if boundary.is_empty() {
                ring
            } else {
                boundary.sort_unstable();
                boundary
            }
        })
        .collect()
}
