//! Geometry rebuilding
//!
//! Turns arbitrary source geometry into glTF-legal vertex data:
//! explicit indices, counter-clockwise winding, vertices deduplicated by first
//! occurrence of their original index, one interleaved 4-byte aligned vertex
//! buffer, sanitized skin data.

use std::sync::Arc;

use gltf_json::accessor::ComponentType;
use hashbrown::HashMap;

use crate::buffer::{AccessorData, BufferViewId, component_size, write_component};
use crate::material::FrontFace;
use crate::scene::{AttributeData, Geometry, PrimitiveMode, VertexAttribute};
use crate::utils::padded_len;

/// Morph target accessors of a rebuilt geometry
#[derive(Debug, Clone, Default)]
pub struct CanonicalMorphTarget {
    pub positions: Option<Arc<AccessorData>>,
    pub normals: Option<Arc<AccessorData>>,
    pub tangents: Option<Arc<AccessorData>>,
}

/// Geometry ready for registration in the buffer layout
#[derive(Debug, Clone)]
pub struct CanonicalGeometry {
    pub mode: PrimitiveMode,
    pub attributes: Vec<(VertexAttribute, Arc<AccessorData>)>,
    pub indices: Arc<AccessorData>,
    pub targets: Vec<CanonicalMorphTarget>,
    pub weights: Vec<f32>,
    pub vertex_count: usize,
    pub stride: usize,
}

/// De-interleaved stream after index remapping
struct Stream {
    attribute: VertexAttribute,
    values: Vec<f64>,
    size: usize,
    component_type: ComponentType,
    normalized: bool,
}

/// Build the explicit index list, flipping winding for clockwise front faces
pub fn explicit_indices(geometry: &Geometry, front_face: FrontFace) -> Vec<u32> {
    let mut indices: Vec<u32> = match &geometry.indices {
        Some(source) => (0..source.data.len())
            .map(|i| source.data.get(i) as u32)
            .collect(),
        None => (0..geometry.vertex_count() as u32).collect(),
    };

    if front_face == FrontFace::Clockwise {
        flip_winding(&mut indices);
    }

    indices
}

/// Swap the second and third index of every triangle
pub fn flip_winding(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(1, 2);
    }
}

/// Assign new sequential indices in first-seen order.
///
/// Returns the remapped index list and, per new vertex, its original index.
pub fn remap_vertices(indices: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut dict: HashMap<u32, u32> = HashMap::new();
    let mut order = Vec::new();

    let remapped = indices
        .iter()
        .map(|&old| {
            *dict.entry(old).or_insert_with(|| {
                order.push(old);
                (order.len() - 1) as u32
            })
        })
        .collect();

    (remapped, order)
}

/// Canonical joint/weight pairs.
///
/// Zero weights reset their joint. With a `joint_map` (source joint to
/// exported joint), joints are rewritten through it; joints outside the
/// skeleton or hidden from export are dropped along with their weight.
pub fn sanitize_skin(joints: &mut [f64], weights: &mut [f64], joint_map: Option<&[Option<u32>]>) {
    for (joint, weight) in joints.iter_mut().zip(weights.iter_mut()) {
        if *weight == 0.0 {
            *joint = 0.0;
        }
        if let Some(map) = joint_map {
            match map.get(*joint as usize).copied().flatten() {
                Some(exported) => *joint = exported as f64,
                None => {
                    *joint = 0.0;
                    *weight = 0.0;
                }
            }
        }
    }
}

/// Map a normalized integer component to its float value
pub fn dequantize(value: f64, component_type: ComponentType) -> f64 {
    match component_type {
        ComponentType::I8 => (value / i8::MAX as f64).max(-1.0),
        ComponentType::U8 => value / u8::MAX as f64,
        ComponentType::I16 => (value / i16::MAX as f64).max(-1.0),
        ComponentType::U16 => value / u16::MAX as f64,
        ComponentType::U32 => value / u32::MAX as f64,
        ComponentType::F32 => value,
    }
}

/// Rebuild `geometry` into interleaved, deduplicated glTF vertex data.
///
/// `joint_map` maps the skinning skeleton's joints to exported joint indices.
pub fn rebuild(
    geometry: &Geometry,
    front_face: FrontFace,
    joint_map: Option<&[Option<u32>]>,
) -> CanonicalGeometry {
    let indices = explicit_indices(geometry, front_face);
    let (new_indices, order) = remap_vertices(&indices);
    let vertex_count = order.len();

    let mut streams: Vec<Stream> = geometry
        .attributes
        .iter()
        .map(|(&attribute, data)| {
            let component_type = output_component_type(attribute, data);
            Stream {
                attribute,
                values: gather(data, &order, component_type == ComponentType::F32),
                size: data.size,
                component_type,
                normalized: data.normalized,
            }
        })
        .collect();

    sanitize_streams(&mut streams, joint_map);

    // Joint indices pick the narrowest integer type that holds them
    for stream in streams.iter_mut() {
        if stream.attribute == VertexAttribute::Joints {
            let max = stream.values.iter().copied().fold(0.0, f64::max);
            stream.component_type = if max <= u8::MAX as f64 {
                ComponentType::U8
            } else {
                ComponentType::U16
            };
            stream.normalized = false;
        } else if stream.component_type == ComponentType::F32 {
            stream.normalized = false;
        }
    }

    let (bytes, stride, offsets) = interleave(&streams, vertex_count);
    let view = BufferViewId::unique();
    let bytes = Arc::new(bytes);

    let attributes = streams
        .iter()
        .zip(offsets)
        .map(|(stream, offset)| {
            let data = AccessorData::interleaved(
                view,
                Arc::clone(&bytes),
                offset,
                stride,
                stream.component_type,
                stream.size,
                vertex_count,
                stream.normalized,
            );
            (stream.attribute, Arc::new(data))
        })
        .collect();

    let (targets, weights) = match &geometry.morph_targets {
        Some(morph) => {
            let targets = (0..morph.target_count())
                .map(|t| CanonicalMorphTarget {
                    positions: morph.positions.get(t).map(|d| morph_delta(d, &order)),
                    normals: morph.normals.get(t).map(|d| morph_delta(d, &order)),
                    tangents: morph.tangents.get(t).map(|d| morph_delta(d, &order)),
                })
                .collect();
            (targets, morph.weights.clone())
        }
        None => (Vec::new(), Vec::new()),
    };

    tracing::debug!(
        "rebuilt geometry: {} indices, {} -> {} vertices, stride {}",
        new_indices.len(),
        geometry.vertex_count(),
        vertex_count,
        stride
    );

    CanonicalGeometry {
        mode: geometry.mode,
        attributes,
        indices: Arc::new(AccessorData::from_indices(&new_indices)),
        targets,
        weights,
        vertex_count,
        stride,
    }
}

/// Output component type of an attribute before joint narrowing
fn output_component_type(attribute: VertexAttribute, data: &AttributeData) -> ComponentType {
    let source = data.data.component_type();
    let keeps_normalized = matches!(
        attribute,
        VertexAttribute::TexCoord0
            | VertexAttribute::TexCoord1
            | VertexAttribute::Color
            | VertexAttribute::Weights
    );

    if keeps_normalized
        && data.normalized
        && matches!(source, ComponentType::U8 | ComponentType::U16)
    {
        source
    } else {
        ComponentType::F32
    }
}

/// Re-emit the elements of `data` in new-index order.
///
/// With `widen`, normalized integer components are converted to floats.
fn gather(data: &AttributeData, order: &[u32], widen: bool) -> Vec<f64> {
    let count = data.count();
    let source = data.data.component_type();
    let dequantized = widen && data.normalized;
    let mut values = Vec::with_capacity(order.len() * data.size);
    for &old in order {
        let old = old as usize;
        for c in 0..data.size {
            // Short streams read as zero rather than out of bounds
            let value = if old < count { data.get(old, c) } else { 0.0 };
            values.push(if dequantized { dequantize(value, source) } else { value });
        }
    }
    values
}

fn morph_delta(data: &Arc<AttributeData>, order: &[u32]) -> Arc<AccessorData> {
    let values: Vec<f32> = gather(data, order, true).into_iter().map(|v| v as f32).collect();
    Arc::new(AccessorData::from_f32(&values, data.size))
}

fn sanitize_streams(streams: &mut [Stream], joint_map: Option<&[Option<u32>]>) {
    let joints = streams
        .iter()
        .position(|s| s.attribute == VertexAttribute::Joints);
    let weights = streams
        .iter()
        .position(|s| s.attribute == VertexAttribute::Weights);

    if let (Some(j), Some(w)) = (joints, weights) {
        // Joints sort before Weights, so split between them
        let (head, tail) = streams.split_at_mut(w);
        sanitize_skin(&mut head[j].values, &mut tail[0].values, joint_map);
    }
}

/// Pack streams into one interleaved buffer.
///
/// Returns the bytes, the stride, and each stream's byte offset.
fn interleave(streams: &[Stream], vertex_count: usize) -> (Vec<u8>, usize, Vec<usize>) {
    let mut stride = 0;
    let mut offsets = Vec::with_capacity(streams.len());
    for stream in streams {
        offsets.push(stride);
        stride += stream.size * component_size(stream.component_type);
        stride = padded_len(stride);
    }

    let mut bytes = Vec::with_capacity(stride * vertex_count);
    for vertex in 0..vertex_count {
        for (stream, &offset) in streams.iter().zip(&offsets) {
            let start = vertex * stride + offset;
            bytes.resize(start, 0);
            for c in 0..stream.size {
                write_component(
                    &mut bytes,
                    stream.values[vertex * stream.size + c],
                    stream.component_type,
                );
            }
        }
        bytes.resize((vertex + 1) * stride, 0);
    }

    (bytes, stride, offsets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::MorphTargets;

    fn triangle() -> Geometry {
        Geometry::new()
            .attribute(
                VertexAttribute::Position,
                AttributeData::vec3(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            )
            .indices(&[0, 1, 2])
    }

    fn index_values(data: &AccessorData) -> Vec<u32> {
        (0..data.count).map(|i| data.get(i, 0) as u32).collect()
    }

    fn attribute(geometry: &CanonicalGeometry, which: VertexAttribute) -> &AccessorData {
        &geometry
            .attributes
            .iter()
            .find(|(a, _)| *a == which)
            .unwrap()
            .1
    }

    #[test]
    fn test_clockwise_winding_is_flipped() {
        let rebuilt = rebuild(&triangle(), FrontFace::Clockwise, None);
        assert_eq!(index_values(&rebuilt.indices), vec![0, 1, 2]);

        // Vertex order follows first occurrence, so check positions instead
        let positions = attribute(&rebuilt, VertexAttribute::Position);
        assert_eq!(positions.get(1, 1), 1.0); // original vertex 2
        assert_eq!(positions.get(2, 0), 1.0); // original vertex 1
    }

    #[test]
    fn test_explicit_indices_flip() {
        let indices = explicit_indices(&triangle(), FrontFace::Clockwise);
        assert_eq!(indices, vec![0, 2, 1]);

        let indices = explicit_indices(&triangle(), FrontFace::CounterClockwise);
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_synthetic_indices_without_index_buffer() {
        let geometry = Geometry::new().attribute(
            VertexAttribute::Position,
            AttributeData::vec3(&[[0.0; 3], [1.0; 3], [2.0; 3], [3.0; 3]]),
        );
        assert_eq!(
            explicit_indices(&geometry, FrontFace::CounterClockwise),
            vec![0, 1, 2, 3]
        );
    }

    #[test]
    fn test_unreferenced_vertices_are_dropped() {
        let geometry = Geometry::new()
            .attribute(
                VertexAttribute::Position,
                AttributeData::vec3(&[[0.0; 3], [1.0; 3], [2.0; 3], [3.0; 3], [4.0; 3]]),
            )
            .indices(&[4, 2, 4, 2, 4, 0]);

        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, None);
        assert_eq!(rebuilt.vertex_count, 3);
        assert_eq!(index_values(&rebuilt.indices), vec![0, 1, 0, 1, 0, 2]);

        let positions = attribute(&rebuilt, VertexAttribute::Position);
        assert_eq!(positions.get(0, 0), 4.0);
        assert_eq!(positions.get(1, 0), 2.0);
        assert_eq!(positions.get(2, 0), 0.0);
    }

    #[test]
    fn test_remap_first_seen_order() {
        let (remapped, order) = remap_vertices(&[7, 3, 7, 9]);
        assert_eq!(remapped, vec![0, 1, 0, 2]);
        assert_eq!(order, vec![7, 3, 9]);
    }

    #[test]
    fn test_interleaved_stride_is_aligned() {
        let geometry = triangle()
            .attribute(VertexAttribute::TexCoord0, AttributeData::vec2(&[[0.5, 0.5]; 3]))
            .attribute(
                VertexAttribute::Color,
                AttributeData::new(vec![255u8, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255], 4)
                    .normalized(true),
            )
            .attribute(
                VertexAttribute::Joints,
                AttributeData::new(vec![0.0f32; 12], 4),
            )
            .attribute(
                VertexAttribute::Weights,
                AttributeData::vec4(&[[1.0, 0.0, 0.0, 0.0]; 3]),
            );

        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, Some(&[Some(0)]));
        // position 12 + uv 8 + color 4 + joints 4 + weights 16
        assert_eq!(rebuilt.stride, 44);

        let offsets: Vec<usize> = rebuilt.attributes.iter().map(|(_, d)| d.byte_offset).collect();
        assert_eq!(offsets, vec![0, 12, 20, 24, 28]);

        let color = attribute(&rebuilt, VertexAttribute::Color);
        assert_eq!(color.component_type, ComponentType::U8);
        assert!(color.normalized);
        assert_eq!(color.get(1, 1), 255.0);

        let joints = attribute(&rebuilt, VertexAttribute::Joints);
        assert_eq!(joints.component_type, ComponentType::U8);

        // All attributes share one segment and view
        assert!(rebuilt.attributes.iter().all(|(_, d)| d.view == joints.view));
        assert_eq!(joints.bytes.len(), 44 * 3);
    }

    #[test]
    fn test_odd_sized_attribute_padding() {
        let geometry = triangle().attribute(
            VertexAttribute::TexCoord0,
            AttributeData::new(vec![0u8, 0, 255, 0, 0, 255], 2).normalized(true),
        );
        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, None);
        // 12 + 2 (padded to 4)
        assert_eq!(rebuilt.stride, 16);
        let uv = attribute(&rebuilt, VertexAttribute::TexCoord0);
        assert_eq!(uv.get(1, 0), 255.0);
        assert_eq!(uv.get(2, 1), 255.0);
    }

    #[test]
    fn test_zero_weight_resets_joint() {
        let mut joints = vec![3.0, 2.0, 1.0, 5.0];
        let mut weights = vec![0.5, 0.0, 0.5, 0.0];
        sanitize_skin(&mut joints, &mut weights, None);
        assert_eq!(joints, vec![3.0, 0.0, 1.0, 0.0]);
        assert_eq!(weights, vec![0.5, 0.0, 0.5, 0.0]);
    }

    #[test]
    fn test_out_of_range_joint_is_dropped() {
        let mut joints = vec![1.0, 4.0, 2.0, 0.0];
        let mut weights = vec![0.25, 0.5, 0.25, 0.0];
        sanitize_skin(&mut joints, &mut weights, Some(&[Some(0), Some(1), Some(2)]));
        assert_eq!(joints, vec![1.0, 0.0, 2.0, 0.0]);
        assert_eq!(weights, vec![0.25, 0.0, 0.25, 0.0]);
    }

    #[test]
    fn test_skin_sanitized_in_rebuild() {
        let geometry = triangle()
            .attribute(
                VertexAttribute::Joints,
                AttributeData::new(vec![1u16, 7, 0, 0, 2, 0, 0, 0, 9, 1, 0, 0], 4),
            )
            .attribute(
                VertexAttribute::Weights,
                AttributeData::vec4(&[
                    [0.5, 0.5, 0.0, 0.0],
                    [0.0, 1.0, 0.0, 0.0],
                    [0.5, 0.5, 0.0, 0.0],
                ]),
            );

        let rebuilt = rebuild(
            &geometry,
            FrontFace::CounterClockwise,
            Some(&[Some(0), Some(1), Some(2)]),
        );
        let joints = attribute(&rebuilt, VertexAttribute::Joints);
        let weights = attribute(&rebuilt, VertexAttribute::Weights);

        // vertex 0: joint 7 out of range
        assert_eq!((joints.get(0, 1), weights.get(0, 1)), (0.0, 0.0));
        // vertex 1: zero weight on joint 2
        assert_eq!(joints.get(1, 0), 0.0);
        // vertex 2: joint 9 out of range, joint 1 kept
        assert_eq!((joints.get(2, 0), weights.get(2, 0)), (0.0, 0.0));
        assert_eq!((joints.get(2, 1), weights.get(2, 1)), (1.0, 0.5));
    }

    #[test]
    fn test_morph_targets_follow_remap() {
        let geometry = Geometry::new()
            .attribute(
                VertexAttribute::Position,
                AttributeData::vec3(&[[0.0; 3], [1.0; 3], [2.0; 3]]),
            )
            .indices(&[2, 0, 1])
            .morph_targets(MorphTargets {
                positions: vec![Arc::new(AttributeData::vec3(&[
                    [10.0, 0.0, 0.0],
                    [11.0, 0.0, 0.0],
                    [12.0, 0.0, 0.0],
                ]))],
                weights: vec![0.25],
                ..Default::default()
            });

        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, None);
        assert_eq!(rebuilt.targets.len(), 1);
        assert_eq!(rebuilt.weights, vec![0.25]);

        let deltas = rebuilt.targets[0].positions.as_ref().unwrap();
        assert_eq!(deltas.count, 3);
        assert_eq!(deltas.get(0, 0), 12.0);
        assert_eq!(deltas.get(1, 0), 10.0);
        assert_eq!(deltas.get(2, 0), 11.0);
        assert!(rebuilt.targets[0].normals.is_none());
    }

    #[test]
    fn test_hidden_joint_is_remapped() {
        let mut joints = vec![2.0, 1.0, 0.0, 0.0];
        let mut weights = vec![0.5, 0.25, 0.25, 0.0];
        // Middle joint hidden: 0 -> 0, 1 -> dropped, 2 -> 1
        sanitize_skin(&mut joints, &mut weights, Some(&[Some(0), None, Some(1)]));
        assert_eq!(joints, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(weights, vec![0.5, 0.0, 0.25, 0.0]);
    }

    #[test]
    fn test_normalized_normals_are_dequantized() {
        let geometry = triangle().attribute(
            VertexAttribute::Normal,
            AttributeData::new(vec![0i8, 0, 127, 0, -127, 0, -128, 0, 0], 3).normalized(true),
        );

        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, None);
        let normals = attribute(&rebuilt, VertexAttribute::Normal);
        assert_eq!(normals.component_type, ComponentType::F32);
        assert!(!normals.normalized);
        assert_eq!(normals.get(0, 2), 1.0);
        assert_eq!(normals.get(1, 1), -1.0);
        // -128 clamps to -1
        assert_eq!(normals.get(2, 0), -1.0);
    }

    #[test]
    fn test_normalized_signed_uvs_are_dequantized() {
        let geometry = triangle().attribute(
            VertexAttribute::TexCoord0,
            AttributeData::new(vec![0i16, 32767, 32767, 0, 0, 0], 2).normalized(true),
        );

        let rebuilt = rebuild(&geometry, FrontFace::CounterClockwise, None);
        let uv = attribute(&rebuilt, VertexAttribute::TexCoord0);
        assert_eq!(uv.component_type, ComponentType::F32);
        assert_eq!(uv.get(0, 1), 1.0);
        assert_eq!(uv.get(1, 0), 1.0);
    }
}
