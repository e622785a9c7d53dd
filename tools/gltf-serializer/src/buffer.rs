//! Binary layout registry: accessors, buffer views and pending buffer segments
//!
//! Accessors are memoized by the identity of the [`AccessorData`] they were
//! created from, buffer views by their [`BufferViewId`]. Attributes that share
//! one interleaved vertex buffer share a view id and therefore one buffer view.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gltf_json as json;
use gltf_json::accessor::ComponentType;
use gltf_json::validation::Checked::Valid;
use hashbrown::HashMap;

use crate::error::{Result, SerializeError};
use crate::utils::merge_segments;

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DATA_ID: AtomicU64 = AtomicU64::new(1);

/// Group id shared by all accessor data living in one buffer view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferViewId(u64);

impl BufferViewId {
    /// Allocate a process-unique view id
    pub fn unique() -> Self {
        Self(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Accessor index returned by buffer operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessorIndex(pub u32);

impl AccessorIndex {
    pub fn as_json_index(&self) -> json::Index<json::Accessor> {
        json::Index::new(self.0)
    }
}

/// Byte size of a single component
pub fn component_size(component_type: ComponentType) -> usize {
    match component_type {
        ComponentType::I8 | ComponentType::U8 => 1,
        ComponentType::I16 | ComponentType::U16 => 2,
        ComponentType::U32 | ComponentType::F32 => 4,
    }
}

/// Accessor element type for a component count
pub fn element_type(size: usize) -> Option<json::accessor::Type> {
    use json::accessor::Type;
    match size {
        1 => Some(Type::Scalar),
        2 => Some(Type::Vec2),
        3 => Some(Type::Vec3),
        4 => Some(Type::Vec4),
        9 => Some(Type::Mat3),
        16 => Some(Type::Mat4),
        _ => None,
    }
}

/// Read one little-endian component as f64
pub fn read_component(bytes: &[u8], offset: usize, component_type: ComponentType) -> f64 {
    let b = &bytes[offset..offset + component_size(component_type)];
    match component_type {
        ComponentType::I8 => b[0] as i8 as f64,
        ComponentType::U8 => b[0] as f64,
        ComponentType::I16 => i16::from_le_bytes([b[0], b[1]]) as f64,
        ComponentType::U16 => u16::from_le_bytes([b[0], b[1]]) as f64,
        ComponentType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
        ComponentType::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
    }
}

/// Append one component to `out`, converting from f64
pub fn write_component(out: &mut Vec<u8>, value: f64, component_type: ComponentType) {
    match component_type {
        ComponentType::I8 => out.push(value as i8 as u8),
        ComponentType::U8 => out.push(value as u8),
        ComponentType::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
        ComponentType::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        ComponentType::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
        ComponentType::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
    }
}

/// A typed window into a byte segment, ready to become one accessor.
///
/// `bytes` is the whole segment of the owning buffer view; interleaved
/// attributes point into the same segment with different offsets.
#[derive(Debug)]
pub struct AccessorData {
    id: u64,
    pub view: BufferViewId,
    pub bytes: Arc<Vec<u8>>,
    pub byte_offset: usize,
    pub byte_stride: Option<usize>,
    pub component_type: ComponentType,
    pub size: usize,
    pub count: usize,
    pub normalized: bool,
    pub target: Option<json::buffer::Target>,
}

impl AccessorData {
    /// Accessor data over a segment shared with other attributes of `view`
    #[allow(clippy::too_many_arguments)]
    pub fn interleaved(
        view: BufferViewId,
        bytes: Arc<Vec<u8>>,
        byte_offset: usize,
        byte_stride: usize,
        component_type: ComponentType,
        size: usize,
        count: usize,
        normalized: bool,
    ) -> Self {
        Self {
            id: NEXT_DATA_ID.fetch_add(1, Ordering::Relaxed),
            view,
            bytes,
            byte_offset,
            byte_stride: Some(byte_stride),
            component_type,
            size,
            count,
            normalized,
            target: Some(json::buffer::Target::ArrayBuffer),
        }
    }

    /// Tightly packed data in its own buffer view
    pub fn packed(bytes: Vec<u8>, component_type: ComponentType, size: usize) -> Self {
        let element = component_size(component_type) * size;
        let count = if element == 0 { 0 } else { bytes.len() / element };
        Self {
            id: NEXT_DATA_ID.fetch_add(1, Ordering::Relaxed),
            view: BufferViewId::unique(),
            bytes: Arc::new(bytes),
            byte_offset: 0,
            byte_stride: None,
            component_type,
            size,
            count,
            normalized: false,
            target: None,
        }
    }

    /// Tightly packed f32 data (animation keys, matrices, morph deltas)
    pub fn from_f32(values: &[f32], size: usize) -> Self {
        Self::packed(bytemuck::cast_slice(values).to_vec(), ComponentType::F32, size)
    }

    /// Index data, narrowed to u16 when every index fits
    pub fn from_indices(indices: &[u32]) -> Self {
        let data = if indices.iter().all(|&i| i <= u16::MAX as u32) {
            let narrow: Vec<u16> = indices.iter().map(|&i| i as u16).collect();
            Self::packed(bytemuck::cast_slice(&narrow).to_vec(), ComponentType::U16, 1)
        } else {
            Self::packed(bytemuck::cast_slice(indices).to_vec(), ComponentType::U32, 1)
        };
        data.with_target(json::buffer::Target::ElementArrayBuffer)
    }

    pub fn with_target(mut self, target: json::buffer::Target) -> Self {
        self.target = Some(target);
        self
    }

    /// Distance in bytes between consecutive elements
    pub fn element_stride(&self) -> usize {
        self.byte_stride
            .unwrap_or(self.size * component_size(self.component_type))
    }

    /// Component `component` of element `element`
    pub fn get(&self, element: usize, component: usize) -> f64 {
        let offset = self.byte_offset
            + element * self.element_stride()
            + component * component_size(self.component_type);
        read_component(&self.bytes, offset, self.component_type)
    }

    /// Per-component minimum and maximum over every element
    pub fn min_max(&self) -> (Vec<f64>, Vec<f64>) {
        let mut min = vec![f64::INFINITY; self.size];
        let mut max = vec![f64::NEG_INFINITY; self.size];

        for element in 0..self.count {
            for c in 0..self.size {
                let v = self.get(element, c);
                min[c] = min[c].min(v);
                max[c] = max[c].max(v);
            }
        }

        (min, max)
    }

    fn bounds_json(&self, values: Vec<f64>) -> json::Value {
        let integral = self.component_type != ComponentType::F32;
        json::Value::Array(
            values
                .into_iter()
                .map(|v| {
                    if integral {
                        json::Value::from(v as i64)
                    } else {
                        json::Value::from(v as f32)
                    }
                })
                .collect(),
        )
    }
}

/// Registry for accessors, buffer views and the raw segments behind them
#[derive(Debug, Default)]
pub struct BufferLayout {
    accessors: Vec<json::Accessor>,
    accessor_map: HashMap<u64, AccessorIndex>,
    views: Vec<json::buffer::View>,
    view_map: HashMap<BufferViewId, u32>,
    segments: Vec<Arc<Vec<u8>>>,
}

impl BufferLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the accessors
    pub fn accessors(&self) -> &[json::Accessor] {
        &self.accessors
    }

    /// Get the buffer views
    pub fn views(&self) -> &[json::buffer::View] {
        &self.views
    }

    /// Raw segments, one per buffer view, in view creation order
    pub fn segments(&self) -> &[Arc<Vec<u8>>] {
        &self.segments
    }

    /// Register `data` as an accessor, reusing the existing one on repeat calls
    pub fn accessor_for(&mut self, data: &AccessorData) -> Result<AccessorIndex> {
        if let Some(&index) = self.accessor_map.get(&data.id) {
            return Ok(index);
        }

        let type_ = element_type(data.size).ok_or(SerializeError::InvalidComponentCount(data.size))?;
        let buffer_view = self.view_for(data);

        let (min, max) = if data.count > 0 {
            let (min, max) = data.min_max();
            (Some(data.bounds_json(min)), Some(data.bounds_json(max)))
        } else {
            (None, None)
        };

        let index = AccessorIndex(self.accessors.len() as u32);
        self.accessors.push(json::Accessor {
            buffer_view: Some(json::Index::new(buffer_view)),
            byte_offset: Some((data.byte_offset as u64).into()),
            count: data.count.into(),
            component_type: Valid(json::accessor::GenericComponentType(data.component_type)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min,
            max,
            name: None,
            normalized: data.normalized,
            sparse: None,
        });
        self.accessor_map.insert(data.id, index);

        tracing::trace!(
            "accessor {} -> view {} ({} x {:?})",
            index.0,
            buffer_view,
            data.count,
            type_
        );
        Ok(index)
    }

    fn view_for(&mut self, data: &AccessorData) -> u32 {
        if let Some(&index) = self.view_map.get(&data.view) {
            return index;
        }

        let index = self.views.len() as u32;
        self.views.push(json::buffer::View {
            buffer: json::Index::new(index),
            byte_length: data.bytes.len().into(),
            byte_offset: None,
            byte_stride: data.byte_stride.map(json::buffer::Stride),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: data.target.map(Valid),
        });
        self.segments.push(Arc::clone(&data.bytes));
        self.view_map.insert(data.view, index);
        index
    }

    /// Merge every pending segment into buffer 0.
    ///
    /// Views are rewritten to point at buffer 0 with their merged offsets.
    /// Returns each view's offset in the merged buffer; empty when nothing
    /// was registered.
    pub fn merge_buffers(&mut self) -> Vec<usize> {
        if self.segments.is_empty() {
            return Vec::new();
        }

        let segments: Vec<&[u8]> = self.segments.iter().map(|s| s.as_slice()).collect();
        let (merged, offsets) = merge_segments(&segments);
        for (view, &offset) in self.views.iter_mut().zip(&offsets) {
            view.buffer = json::Index::new(0);
            view.byte_offset = Some((offset as u64).into());
        }
        self.segments = vec![Arc::new(merged)];
        offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gltf_json::validation::USize64;

    fn bounds(accessor: &json::Accessor) -> (Vec<f64>, Vec<f64>) {
        let values = |v: &Option<json::Value>| -> Vec<f64> {
            v.as_ref()
                .unwrap()
                .as_array()
                .unwrap()
                .iter()
                .map(|x| x.as_f64().unwrap())
                .collect()
        };
        (values(&accessor.min), values(&accessor.max))
    }

    #[test]
    fn test_element_type_from_component_count() {
        use json::accessor::Type;
        assert_eq!(element_type(1), Some(Type::Scalar));
        assert_eq!(element_type(2), Some(Type::Vec2));
        assert_eq!(element_type(3), Some(Type::Vec3));
        assert_eq!(element_type(4), Some(Type::Vec4));
        assert_eq!(element_type(9), Some(Type::Mat3));
        assert_eq!(element_type(16), Some(Type::Mat4));
        assert_eq!(element_type(5), None);
    }

    #[test]
    fn test_scalar_bounds_have_one_component() {
        let mut layout = BufferLayout::new();
        let data = AccessorData::from_f32(&[2.0, -1.0, 4.0], 1);
        let idx = layout.accessor_for(&data).unwrap();

        let accessor = &layout.accessors()[idx.0 as usize];
        assert_eq!(bounds(accessor), (vec![-1.0], vec![4.0]));
        assert_eq!(accessor.count, USize64::from(3usize));
    }

    #[test]
    fn test_vector_bounds_are_per_component() {
        let mut layout = BufferLayout::new();
        let data = AccessorData::from_f32(&[0.0, 5.0, -2.0, 3.0, 1.0, 7.0], 3);
        layout.accessor_for(&data).unwrap();

        let (min, max) = bounds(&layout.accessors()[0]);
        assert_eq!(min, vec![0.0, 1.0, -2.0]);
        assert_eq!(max, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_accessor_memoized_by_identity() {
        let mut layout = BufferLayout::new();
        let data = AccessorData::from_f32(&[1.0, 2.0], 2);
        let twin = AccessorData::from_f32(&[1.0, 2.0], 2);

        let a = layout.accessor_for(&data).unwrap();
        let b = layout.accessor_for(&data).unwrap();
        let c = layout.accessor_for(&twin).unwrap();

        assert_eq!(a, b);
        // Byte-identical data from another identity is not merged
        assert_ne!(a, c);
        assert_eq!(layout.accessors().len(), 2);
        assert_eq!(layout.views().len(), 2);
    }

    #[test]
    fn test_interleaved_attributes_share_view() {
        let mut layout = BufferLayout::new();
        let view = BufferViewId::unique();
        // Two vertices: vec2 at offset 0, scalar at offset 8, stride 12
        let mut bytes = Vec::new();
        for v in [[1.0f32, 2.0, 10.0], [3.0, 4.0, 20.0]] {
            bytes.extend_from_slice(bytemuck::cast_slice(&v));
        }
        let bytes = Arc::new(bytes);
        let uv = AccessorData::interleaved(view, bytes.clone(), 0, 12, ComponentType::F32, 2, 2, false);
        let weight = AccessorData::interleaved(view, bytes, 8, 12, ComponentType::F32, 1, 2, false);

        layout.accessor_for(&uv).unwrap();
        layout.accessor_for(&weight).unwrap();

        assert_eq!(layout.views().len(), 1);
        assert_eq!(layout.views()[0].byte_stride, Some(json::buffer::Stride(12)));
        assert_eq!(bounds(&layout.accessors()[0]), (vec![1.0, 2.0], vec![3.0, 4.0]));
        assert_eq!(bounds(&layout.accessors()[1]), (vec![10.0], vec![20.0]));
    }

    #[test]
    fn test_invalid_component_count() {
        let mut layout = BufferLayout::new();
        let data = AccessorData::from_f32(&[0.0; 5], 5);
        assert!(matches!(
            layout.accessor_for(&data),
            Err(SerializeError::InvalidComponentCount(5))
        ));
    }

    #[test]
    fn test_indices_narrow_to_u16() {
        let small = AccessorData::from_indices(&[0, 1, 2]);
        assert_eq!(small.component_type, ComponentType::U16);
        assert_eq!(small.bytes.len(), 6);

        let large = AccessorData::from_indices(&[0, 70_000]);
        assert_eq!(large.component_type, ComponentType::U32);
    }

    #[test]
    fn test_merge_buffers_rewrites_views() {
        let mut layout = BufferLayout::new();
        layout.accessor_for(&AccessorData::from_indices(&[0, 1, 2])).unwrap();
        layout.accessor_for(&AccessorData::from_f32(&[1.0, 2.0], 1)).unwrap();

        let offsets = layout.merge_buffers();
        assert_eq!(offsets, vec![0, 8]);
        assert_eq!(layout.segments().len(), 1);
        assert_eq!(layout.segments()[0].len(), 8 + 8);
        assert_eq!(layout.views()[0].byte_offset, Some(USize64::from(0u64)));
        assert_eq!(layout.views()[1].byte_offset, Some(USize64::from(8u64)));
        assert!(layout.views().iter().all(|v| v.buffer.value() == 0));
    }

    #[test]
    fn test_merge_empty_layout() {
        let mut layout = BufferLayout::new();
        assert!(layout.merge_buffers().is_empty());
        assert!(layout.segments().is_empty());
    }
}
