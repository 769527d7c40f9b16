//! Manifest -> scene graph -> GLB

mod common;

use common::PNG_BYTES;
use glbforge_export::{GlbFile, GltfExporter, SceneManifest};

const MANIFEST: &str = r#"{
    "meshes": [
        {
            "name": "plank",
            "positions": [[0,0,0],[2,0,0],[2,0,1],[0,0,1]],
            "normals": [[0,1,0],[0,1,0],[0,1,0],[0,1,0]],
            "uvs": [[0,0],[1,0],[1,1],[0,1]],
            "indices": [0,1,2,0,2,3]
        },
        {
            "name": "flag",
            "positions": [[0,0,0],[0,1,0],[1,1,0],[1,0,0]],
            "normals": [[0,0,1],[0,0,1],[0,0,1],[0,0,1]],
            "uvs": [[0,0],[0,1],[1,1],[1,0]],
            "indices": [0,1,2,0,2,3],
            "skin": {
                "bones": ["pole", "cloth"],
                "indices": [[1,0,0,0],[1,0,0,0],[2,0,0,0],[2,0,0,0]],
                "weights": [[1,0,0,0],[1,0,0,0],[1,0,0,0],[1,0,0,0]]
            }
        }
    ],
    "skeletons": [
        {
            "name": "flag_rig",
            "bones": [
                {"name": "pole"},
                {"name": "cloth", "parent": "pole", "transform": {"translation": [0.5, 1, 0]}}
            ]
        }
    ],
    "models": [
        {"name": "deck", "empty": true},
        {"name": "plank_0", "mesh": "plank", "attach_to": "deck",
         "textures": [{"name": "wood", "path": "wood.png"}]},
        {"name": "plank_1", "mesh": "plank", "attach_to": "deck",
         "transform": {"translation": [0, 0, 1]},
         "textures": [{"name": "wood", "path": "wood.png"}]},
        {"name": "plank_spare", "mesh": "plank", "skip_export": true},
        {"name": "unused_socket", "empty": true},
        {"name": "flag", "mesh": "flag", "skeleton": "flag_rig", "static_set": "festival",
         "animations": [{"name": "wave", "keyframes": [
            {"time": 0.0, "keys": [{"bone": "cloth"}, {"bone": "pole"}]},
            {"time": 1.0, "keys": [{"bone": "cloth", "transform": {"rotation": [0, 0.7071068, 0, 0.7071068]}}]}
         ]}]}
    ]
}"#;

#[test]
fn test_manifest_round_trip_through_exporter() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wood.png"), PNG_BYTES).unwrap();
    let manifest_path = dir.path().join("ship.json");
    std::fs::write(&manifest_path, MANIFEST).unwrap();

    let scene = SceneManifest::load_scene(&manifest_path).unwrap();
    assert_eq!(scene.model_count(), 6);
    assert_eq!(scene.meshes().users(scene.meshes().find("plank").unwrap()), 3);

    let out = dir.path().join("ship.glb");
    GltfExporter::default().export(&scene, &out).unwrap();
    let glb = GlbFile::from_path(&out).unwrap();
    let summary = glb.summary();

    // deck, two planks, flag + 2 joints
    assert_eq!(summary.nodes, 6);
    assert_eq!(summary.meshes, 2);
    assert_eq!(summary.images, 1);
    assert_eq!(summary.skins, 1);
    assert_eq!(summary.animations, 1);
    // only "cloth" is keyed in both keyframes
    assert_eq!(summary.channels, 3);

    let doc = glb.document().unwrap();
    assert_eq!(doc.nodes[0].name.as_deref(), Some("deck"));
    assert_eq!(doc.nodes[0].children, vec![1, 2]);
    assert_eq!(doc.scenes[0].nodes, vec![0, 3]);
    assert_eq!(doc.nodes[3].extras.as_ref().unwrap()["staticSet"], "festival");
}
