//! glbforge Export Pipeline
//!
//! Packs a [`SceneGraph`](glbforge_scene::SceneGraph) into a single binary
//! glTF 2.0 file:
//! - geometry, skins and animations into one binary buffer
//! - materials with embedded PNG/JPEG textures
//! - the GLB container (header + JSON chunk + BIN chunk)
//!
//! Also provides a JSON scene manifest loader and a GLB reader for inspection.

pub mod gltf;
pub mod logging;
pub mod manifest;

pub use gltf::glb::{GlbFile, GlbSummary};
pub use gltf::{GltfExportError, GltfExportOptions, GltfExporter, GltfResult};
pub use manifest::SceneManifest;
