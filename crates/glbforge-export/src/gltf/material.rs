//! Materials, textures and embedded images

use glbforge_scene::{MeshId, Model3D};
use image::ImageFormat;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::buffer::BufferAllocator;
use super::{Gltf, Image, Material, PbrMetallicRoughness, Sampler, Texture, TextureInfo};

/// Deduplicates materials across model instances
///
/// Textured materials are shared per texture file; placeholder materials
/// are shared per mesh.
#[derive(Debug, Default)]
pub(super) struct MaterialCache {
    /// Material for each texture path; `None` once a path failed to load
    by_texture: HashMap<PathBuf, Option<usize>>,
    dummies: HashMap<MeshId, usize>,
    sampler: Option<usize>,
}

impl MaterialCache {
    /// Material for `model`'s instance of `mesh`
    pub fn resolve(
        &mut self,
        doc: &mut Gltf,
        buffer: &mut BufferAllocator,
        model: &Model3D,
        mesh: MeshId,
        mesh_name: &str,
        embed_textures: bool,
    ) -> usize {
        if embed_textures {
            match model.selected_texture() {
                Some(texture) => {
                    if let Some(material) = self.textured(doc, buffer, &texture.path) {
                        return material;
                    }
                }
                None if !model.textures.is_empty() => {
                    debug!(model = %model.name, active = ?model.active_texture, "No texture matches the active selection");
                }
                None => {}
            }
        }
        self.dummy(doc, mesh, mesh_name)
    }

    /// Placeholder material for `mesh`, created on first use
    pub fn dummy(&mut self, doc: &mut Gltf, mesh: MeshId, mesh_name: &str) -> usize {
        *self.dummies.entry(mesh).or_insert_with(|| {
            push_material(doc, format!("{mesh_name}_default"), None)
        })
    }

    fn textured(&mut self, doc: &mut Gltf, buffer: &mut BufferAllocator, path: &Path) -> Option<usize> {
        if let Some(&cached) = self.by_texture.get(path) {
            return cached;
        }

        let material = load_image(path).map(|(bytes, mime_type)| {
            let view = buffer.add_bytes(&bytes);
            let image = doc.images.len();
            doc.images.push(Image {
                name: Some(stem(path)),
                buffer_view: view,
                mime_type: mime_type.to_string(),
            });

            let sampler = *self.sampler.get_or_insert_with(|| {
                doc.samplers.push(Sampler::default());
                doc.samplers.len() - 1
            });
            let texture = doc.textures.len();
            doc.textures.push(Texture {
                source: image,
                sampler: Some(sampler),
            });

            debug!(path = %path.display(), bytes = bytes.len(), "Embedded texture");
            push_material(doc, stem(path), Some(texture))
        });

        self.by_texture.insert(path.to_path_buf(), material);
        material
    }
}

fn push_material(doc: &mut Gltf, name: String, texture: Option<usize>) -> usize {
    doc.materials.push(Material {
        name: Some(name),
        pbr_metallic_roughness: Some(PbrMetallicRoughness {
            base_color_factor: Some([1.0, 1.0, 1.0, 1.0]),
            base_color_texture: texture.map(|index| TextureInfo { index }),
            metallic_factor: Some(0.0),
            roughness_factor: Some(0.5),
        }),
        double_sided: None,
    });
    doc.materials.len() - 1
}

/// Read an image file that glTF can carry as-is
fn load_image(path: &Path) -> Option<(Vec<u8>, &'static str)> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(path = %path.display(), %error, "Texture not readable, using placeholder material");
            return None;
        }
    };

    match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => Some((bytes, "image/png")),
        Ok(ImageFormat::Jpeg) => Some((bytes, "image/jpeg")),
        Ok(other) => {
            warn!(path = %path.display(), format = ?other, "Texture format cannot be embedded, using placeholder material");
            None
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "Texture format not recognized, using placeholder material");
            None
        }
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
