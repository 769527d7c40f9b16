//! Scene builders shared by the integration tests

#![allow(dead_code)]

use glbforge_core::{Mat4, Quat, Transform, Vec2, Vec3};
use glbforge_export::gltf::Gltf;
use glbforge_export::{GlbFile, GltfExportOptions, GltfExporter};
use glbforge_scene::{MeshData, SceneGraph, Skeleton};

/// Smallest valid PNG prefix; enough for format sniffing
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

/// Unit cube with per-face normals and UVs
pub fn cube(name: &str) -> MeshData {
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
        (Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0)),
        (Vec3::new(0.0, -1.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
        (Vec3::new(0.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        (Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
    ];

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();
    for (normal, u, v) in faces {
        let base = positions.len() as u16;
        for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
            let p = Vec3::new(
                normal.x * 0.5 + u.x * su + v.x * sv,
                normal.y * 0.5 + u.y * su + v.y * sv,
                normal.z * 0.5 + u.z * su + v.z * sv,
            );
            positions.push(p);
            normals.push(normal);
            uvs.push(Vec2::new(su + 0.5, sv + 0.5));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    MeshData::new(name, positions, normals, uvs, indices)
}

/// Three-bone chain root -> mid -> tip, each one unit up from its parent
pub fn chain_skeleton(name: &str) -> Skeleton {
    let mut skeleton = Skeleton::new(name);
    let step = Transform::from_trs(Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec3::ONE);
    let root = skeleton.add_bone("root", Transform::IDENTITY, Mat4::IDENTITY).unwrap();
    let mid = skeleton.add_bone("mid", step, Mat4::IDENTITY).unwrap();
    let tip = skeleton.add_bone("tip", step, Mat4::IDENTITY).unwrap();
    skeleton.reparent(mid, Some(root)).unwrap();
    skeleton.reparent(tip, Some(mid)).unwrap();
    skeleton.compute_inverse_references().unwrap();
    skeleton
}

/// Vertical strip of three vertex pairs, each pair bound to one chain bone
pub fn skinned_strip(name: &str) -> MeshData {
    let positions: Vec<Vec3> = (0..6)
        .map(|i| Vec3::new((i % 2) as f32, (i / 2) as f32, 0.0))
        .collect();
    MeshData::new(
        name,
        positions,
        vec![Vec3::new(0.0, 0.0, 1.0); 6],
        vec![Vec2::ZERO; 6],
        vec![0, 1, 2, 1, 3, 2, 2, 3, 4, 3, 5, 4],
    )
    .with_skin(
        vec![[1, 0, 0, 0], [1, 0, 0, 0], [2, 0, 0, 0], [2, 0, 0, 0], [3, 0, 0, 0], [3, 0, 0, 0]],
        vec![[1.0, 0.0, 0.0, 0.0]; 6],
        vec!["root".into(), "mid".into(), "tip".into()],
    )
}

/// Bind `mesh` to `skeleton` the way a reader would before export
pub fn rig(mesh: &mut MeshData, skeleton: &mut Skeleton) {
    let deforming: Vec<String> = mesh.deforming_bones().map(str::to_owned).collect();
    let extras = mesh.extra_bone_names.clone();
    skeleton
        .assign_indices(deforming.iter().map(String::as_str), extras.iter().map(String::as_str))
        .unwrap();
    assert!(mesh.bind_skeleton(skeleton));
    mesh.construct_groups();
}

pub fn pose(x: f32) -> Transform {
    Transform::from_trs(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE)
}

pub fn export_bytes(scene: &SceneGraph) -> Vec<u8> {
    GltfExporter::new(GltfExportOptions::default())
        .export_to_bytes(scene)
        .unwrap()
}

/// Export and read the result back
pub fn export(scene: &SceneGraph) -> (GlbFile, Gltf) {
    let glb = GlbFile::parse(&export_bytes(scene)).unwrap();
    let doc = glb.document().unwrap();
    (glb, doc)
}
