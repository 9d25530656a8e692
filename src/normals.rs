use crate::mesh::TriMesh;
use crate::pipeline::{Progress, Stage};

use nalgebra::Vector3;
use rayon::prelude::*;
use std::collections::HashMap;

/// Per-vertex normals with feature-edge splitting.
///
/// Around each vertex, faces are grouped by walking across edges whose
/// dihedral angle stays within `feature_angle` degrees. Every group gets its
/// own copy of the vertex carrying the average of the group's face normals,
/// so sharp creases shade flat while smooth regions stay shared.
pub fn compute_normals(mesh: &TriMesh, feature_angle: f32, progress: &mut dyn Progress) -> TriMesh {
    if mesh.is_empty() {
        return TriMesh::default();
    }
    let cos_feature = feature_angle.to_radians().cos();

    let face_normals: Vec<Vector3<f32>> = (0..mesh.triangle_count())
        .into_par_iter()
        .map(|t| mesh.face_normal(t).try_normalize(f32::EPSILON).unwrap_or_else(Vector3::zeros))
        .collect();

    let mut vertex_faces = vec![Vec::new(); mesh.vertex_count()];
    let mut edge_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::new();
    for (t, &[a, b, c]) in mesh.triangles.iter().enumerate() {
        for v in [a, b, c] {
            vertex_faces[v as usize].push(t as u32);
        }
        for (u, v) in [(a, b), (b, c), (c, a)] {
            edge_faces.entry((u.min(v), u.max(v))).or_default().push(t as u32);
        }
    }
    progress.tick(Stage::Normals, 0.25);

    let groups: Vec<Vec<usize>> = (0..mesh.vertex_count())
        .into_par_iter()
        .map(|v| {
            group_faces(
                v as u32,
                &vertex_faces[v],
                mesh,
                &edge_faces,
                &face_normals,
                cos_feature,
            )
        })
        .collect();
    progress.tick(Stage::Normals, 0.75);

    // Output vertex of every (vertex, group) pair, numbered in vertex order
    let mut out = TriMesh::default();
    let mut first_output = vec![0u32; mesh.vertex_count()];
    for (v, group_of) in groups.iter().enumerate() {
        first_output[v] = out.positions.len() as u32;
        let count = group_of.iter().copied().max().map_or(0, |g| g + 1);
        for g in 0..count {
            let members = vertex_faces[v]
                .iter()
                .zip(group_of)
                .filter(|&(_, &group)| group == g)
                .map(|(&t, _)| face_normals[t as usize]);
            out.positions.push(mesh.positions[v]);
            out.normals.push(average_normal(members));
        }
    }

    out.triangles = mesh
        .triangles
        .iter()
        .enumerate()
        .map(|(t, tri)| {
            tri.map(|v| {
                let local = vertex_faces[v as usize]
                    .iter()
                    .position(|&f| f as usize == t)
                    .unwrap_or(0);
                first_output[v as usize] + groups[v as usize][local] as u32
            })
        })
        .collect();
    progress.tick(Stage::Normals, 1.0);
    out
}

/// Smooth-connected face groups around `v`, as a group id per incident face
fn group_faces(
    v: u32,
    faces: &[u32],
    mesh: &TriMesh,
    edge_faces: &HashMap<(u32, u32), Vec<u32>>,
    face_normals: &[Vector3<f32>],
    cos_feature: f32,
) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..faces.len()).collect();
    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (i, &f) in faces.iter().enumerate() {
        for w in mesh.triangles[f as usize] {
            if w == v {
                continue;
            }
            let Some(across) = edge_faces.get(&(v.min(w), v.max(w))) else {
                continue;
            };
            for &g in across {
                if g == f {
                    continue;
                }
                let Some(j) = faces.iter().position(|&h| h == g) else {
                    continue;
                };
                let (nf, ng) = (face_normals[f as usize], face_normals[g as usize]);
                let degenerate = nf == Vector3::zeros() || ng == Vector3::zeros();
                if degenerate || nf.dot(&ng) >= cos_feature {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    // Renumber roots densely in order of first appearance
    let mut ids: HashMap<usize, usize> = HashMap::new();
    (0..faces.len())
        .map(|i| {
            let root = find(&mut parent, i);
            let next = ids.len();
            *ids.entry(root).or_insert(next)
        })
        .collect()
}

fn average_normal(normals: impl Iterator<Item = Vector3<f32>>) -> [f32; 3] {
    let mut first = None;
    let sum = normals.fold(Vector3::zeros(), |acc, n| {
        if first.is_none() && n != Vector3::zeros() {
            first = Some(n);
        }
        acc + n
    });
    let n = sum
        .try_normalize(f32::EPSILON)
        .or(first)
        .unwrap_or_else(Vector3::z);
    [n.x, n.y, n.z]
}
