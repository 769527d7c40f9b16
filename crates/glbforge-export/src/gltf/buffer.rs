//! Binary buffer packing
//!
//! [`BufferAllocator`] owns the BIN chunk under construction together with
//! the accessor and buffer view lists that describe it. Indices and byte
//! offsets only ever grow, so writing the same arrays in the same order
//! always yields the same layout.

use byteorder::{ByteOrder, LittleEndian};
use glbforge_core::{Mat4, Quat, Vec2, Vec3};
use std::collections::BTreeMap;

use super::{
    component_size, Accessor, AccessorType, BufferView, COMPONENT_TYPE_FLOAT,
    COMPONENT_TYPE_UNSIGNED_SHORT, TARGET_ARRAY_BUFFER, TARGET_ELEMENT_ARRAY_BUFFER,
};

/// Buffer views start on this boundary
const VIEW_ALIGNMENT: usize = 4;

/// Accessors written for one shared mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorSet {
    pub position: usize,
    pub normal: Option<usize>,
    pub uv: Option<usize>,
    pub indices: usize,
    pub joints: Option<usize>,
    pub weights: Option<usize>,
}

impl AccessorSet {
    /// Primitive attribute map
    pub fn attributes(&self) -> BTreeMap<String, usize> {
        let mut attributes = BTreeMap::new();
        attributes.insert("POSITION".to_string(), self.position);
        if let Some(normal) = self.normal {
            attributes.insert("NORMAL".to_string(), normal);
        }
        if let Some(uv) = self.uv {
            attributes.insert("TEXCOORD_0".to_string(), uv);
        }
        if let Some(joints) = self.joints {
            attributes.insert("JOINTS_0".to_string(), joints);
        }
        if let Some(weights) = self.weights {
            attributes.insert("WEIGHTS_0".to_string(), weights);
        }
        attributes
    }
}

/// Packs typed arrays into one little-endian byte buffer
#[derive(Debug, Default)]
pub struct BufferAllocator {
    data: Vec<u8>,
    accessors: Vec<Accessor>,
    buffer_views: Vec<BufferView>,
}

impl BufferAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current byte length of the buffer
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn accessors(&self) -> &[Accessor] {
        &self.accessors
    }

    pub fn buffer_views(&self) -> &[BufferView] {
        &self.buffer_views
    }

    /// Hand over the buffer bytes, accessors and buffer views
    pub fn into_parts(self) -> (Vec<u8>, Vec<Accessor>, Vec<BufferView>) {
        (self.data, self.accessors, self.buffer_views)
    }

    /// Vertex positions, with bounds
    pub fn add_positions(&mut self, positions: &[Vec3]) -> usize {
        let flat: Vec<f32> = positions.iter().flat_map(|p| p.to_array()).collect();
        self.add_floats(&flat, AccessorType::Vec3, true, Some(TARGET_ARRAY_BUFFER))
    }

    /// Vertex normals, with bounds
    pub fn add_normals(&mut self, normals: &[Vec3]) -> usize {
        let flat: Vec<f32> = normals.iter().flat_map(|n| n.to_array()).collect();
        self.add_floats(&flat, AccessorType::Vec3, true, Some(TARGET_ARRAY_BUFFER))
    }

    /// Texture coordinates, V flipped from bottom-left to top-left origin
    pub fn add_uvs(&mut self, uvs: &[Vec2]) -> usize {
        let flat: Vec<f32> = uvs.iter().flat_map(|uv| [uv.x, 1.0 - uv.y]).collect();
        self.add_floats(&flat, AccessorType::Vec2, true, Some(TARGET_ARRAY_BUFFER))
    }

    /// Triangle indices, with bounds
    pub fn add_indices(&mut self, indices: &[u16]) -> usize {
        let bounds = if indices.is_empty() {
            None
        } else {
            let min = indices.iter().copied().min().unwrap_or(0);
            let max = indices.iter().copied().max().unwrap_or(0);
            Some((vec![min as f32], vec![max as f32]))
        };
        self.add_shorts(indices, AccessorType::Scalar, bounds, Some(TARGET_ELEMENT_ARRAY_BUFFER))
    }

    /// Joint index quadruplets
    pub fn add_joints(&mut self, joints: &[[u16; 4]]) -> usize {
        let flat: Vec<u16> = joints.iter().flatten().copied().collect();
        self.add_shorts(&flat, AccessorType::Vec4, None, Some(TARGET_ARRAY_BUFFER))
    }

    /// Joint weight quadruplets
    pub fn add_weights(&mut self, weights: &[[f32; 4]]) -> usize {
        let flat: Vec<f32> = weights.iter().flatten().copied().collect();
        self.add_floats(&flat, AccessorType::Vec4, false, Some(TARGET_ARRAY_BUFFER))
    }

    /// Column-major 4x4 matrices (inverse bind matrices)
    pub fn add_matrices(&mut self, matrices: &[Mat4]) -> usize {
        let flat: Vec<f32> = matrices.iter().flat_map(|m| m.to_cols_array()).collect();
        self.add_floats(&flat, AccessorType::Mat4, false, None)
    }

    /// Keyframe times, with bounds
    pub fn add_times(&mut self, times: &[f32]) -> usize {
        self.add_floats(times, AccessorType::Scalar, true, None)
    }

    /// Translation or scale track
    pub fn add_vec3_track(&mut self, values: &[Vec3]) -> usize {
        let flat: Vec<f32> = values.iter().flat_map(|v| v.to_array()).collect();
        self.add_floats(&flat, AccessorType::Vec3, false, None)
    }

    /// Rotation track
    pub fn add_quat_track(&mut self, values: &[Quat]) -> usize {
        let flat: Vec<f32> = values.iter().flat_map(|q| q.to_array()).collect();
        self.add_floats(&flat, AccessorType::Vec4, false, None)
    }

    /// Raw bytes (an embedded image); returns the buffer view index
    pub fn add_bytes(&mut self, bytes: &[u8]) -> usize {
        let offset = self.begin_view();
        self.data.extend_from_slice(bytes);
        self.push_view(offset, None)
    }

    fn add_floats(
        &mut self,
        values: &[f32],
        accessor_type: AccessorType,
        with_bounds: bool,
        target: Option<u32>,
    ) -> usize {
        let bounds = if with_bounds {
            component_bounds(values, accessor_type.component_count())
        } else {
            None
        };

        let offset = self.begin_view();
        self.data.resize(offset + values.len() * 4, 0);
        LittleEndian::write_f32_into(values, &mut self.data[offset..]);

        let view = self.push_view(offset, target);
        self.push_accessor(view, COMPONENT_TYPE_FLOAT, accessor_type, values.len(), bounds)
    }

    fn add_shorts(
        &mut self,
        values: &[u16],
        accessor_type: AccessorType,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
        target: Option<u32>,
    ) -> usize {
        let offset = self.begin_view();
        self.data.resize(offset + values.len() * 2, 0);
        LittleEndian::write_u16_into(values, &mut self.data[offset..]);

        let view = self.push_view(offset, target);
        self.push_accessor(view, COMPONENT_TYPE_UNSIGNED_SHORT, accessor_type, values.len(), bounds)
    }

    /// Zero-pad up to the next view boundary and return the view's offset
    fn begin_view(&mut self) -> usize {
        let padded = self.data.len().next_multiple_of(VIEW_ALIGNMENT);
        self.data.resize(padded, 0);
        padded
    }

    fn push_view(&mut self, offset: usize, target: Option<u32>) -> usize {
        let index = self.buffer_views.len();
        self.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: Some(offset),
            byte_length: self.data.len() - offset,
            byte_stride: None,
            target,
        });
        index
    }

    fn push_accessor(
        &mut self,
        buffer_view: usize,
        component_type: u32,
        accessor_type: AccessorType,
        component_total: usize,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
    ) -> usize {
        let count = component_total / accessor_type.component_count();
        debug_assert_eq!(
            self.buffer_views[buffer_view].byte_length,
            count * accessor_type.component_count() * component_size(component_type)
        );

        let (min, max) = match bounds {
            Some((min, max)) => (Some(min), Some(max)),
            None => (None, None),
        };
        let index = self.accessors.len();
        self.accessors.push(Accessor {
            buffer_view: Some(buffer_view),
            byte_offset: None,
            component_type,
            count,
            accessor_type,
            max,
            min,
        });
        index
    }
}

/// Per-component min/max over rows of `width` values
fn component_bounds(values: &[f32], width: usize) -> Option<(Vec<f32>, Vec<f32>)> {
    if values.is_empty() {
        return None;
    }
    let mut min = vec![f32::MAX; width];
    let mut max = vec![f32::MIN; width];
    for row in values.chunks_exact(width) {
        for (i, &v) in row.iter().enumerate() {
            min[i] = min[i].min(v);
            max[i] = max[i].max(v);
        }
    }
    Some((min, max))
}
