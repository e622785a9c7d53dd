//! Source scene model
//!
//! These types mirror what a host engine exposes to the serializer: a tree of
//! nodes with transforms and attachments, geometry as typed attribute
//! streams, and the active camera/animation lists of a stage. Shared objects
//! are held in `Arc`s; the allocation address is the object's identity for
//! deduplication.

use std::collections::BTreeMap;
use std::sync::Arc;

use gltf_json as json;

use crate::animation::Animation;
use crate::material::Material;
use crate::skeleton::Skeleton;

/// Identity of a shared source object
pub(crate) fn object_id<T: ?Sized>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Local transform of a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: [f32; 3],
    /// Quaternion as (x, y, z, w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A node of the source scene graph
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: Option<String>,
    pub visible: bool,
    pub transform: Transform,
    pub children: Vec<Arc<SceneNode>>,
    pub mesh: Option<Mesh>,
    pub camera: Option<Camera>,
}

impl SceneNode {
    pub fn new() -> Self {
        Self {
            name: None,
            visible: true,
            transform: Transform::IDENTITY,
            children: Vec::new(),
            mesh: None,
            camera: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn translation(mut self, translation: [f32; 3]) -> Self {
        self.transform.translation = translation;
        self
    }

    pub fn rotation(mut self, rotation: [f32; 4]) -> Self {
        self.transform.rotation = rotation;
        self
    }

    pub fn scale(mut self, scale: [f32; 3]) -> Self {
        self.transform.scale = scale;
        self
    }

    pub fn child(mut self, child: Arc<SceneNode>) -> Self {
        self.children.push(child);
        self
    }

    pub fn mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Finish building and share the node
    pub fn build(self) -> Arc<SceneNode> {
        Arc::new(self)
    }
}

impl Default for SceneNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Renderable attachment of a node; skinned when a skeleton is present
#[derive(Debug, Clone)]
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<Material>,
    pub skeleton: Option<Arc<Skeleton>>,
}

impl Mesh {
    pub fn new(geometry: Arc<Geometry>, material: Arc<Material>) -> Self {
        Self {
            geometry,
            material,
            skeleton: None,
        }
    }

    pub fn skeleton(mut self, skeleton: Arc<Skeleton>) -> Self {
        self.skeleton = Some(skeleton);
        self
    }
}

/// Typed component storage of an attribute stream
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl ComponentData {
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Component at flat position `i`, widened to f64
    pub fn get(&self, i: usize) -> f64 {
        match self {
            Self::I8(v) => v[i] as f64,
            Self::U8(v) => v[i] as f64,
            Self::I16(v) => v[i] as f64,
            Self::U16(v) => v[i] as f64,
            Self::U32(v) => v[i] as f64,
            Self::F32(v) => v[i] as f64,
        }
    }

    pub fn component_type(&self) -> json::accessor::ComponentType {
        use json::accessor::ComponentType;
        match self {
            Self::I8(_) => ComponentType::I8,
            Self::U8(_) => ComponentType::U8,
            Self::I16(_) => ComponentType::I16,
            Self::U16(_) => ComponentType::U16,
            Self::U32(_) => ComponentType::U32,
            Self::F32(_) => ComponentType::F32,
        }
    }
}

macro_rules! component_data_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for ComponentData {
                fn from(values: Vec<$ty>) -> Self {
                    Self::$variant(values)
                }
            }
        )*
    };
}

component_data_from!(i8 => I8, u8 => U8, i16 => I16, u16 => U16, u32 => U32, f32 => F32);

/// One attribute stream: `size` components per element
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeData {
    pub data: ComponentData,
    pub size: usize,
    pub normalized: bool,
}

impl AttributeData {
    pub fn new(data: impl Into<ComponentData>, size: usize) -> Self {
        Self {
            data: data.into(),
            size,
            normalized: false,
        }
    }

    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn vec2(values: &[[f32; 2]]) -> Self {
        Self::new(values.iter().flatten().copied().collect::<Vec<f32>>(), 2)
    }

    pub fn vec3(values: &[[f32; 3]]) -> Self {
        Self::new(values.iter().flatten().copied().collect::<Vec<f32>>(), 3)
    }

    pub fn vec4(values: &[[f32; 4]]) -> Self {
        Self::new(values.iter().flatten().copied().collect::<Vec<f32>>(), 4)
    }

    pub fn indices(values: &[u32]) -> Self {
        Self::new(values.to_vec(), 1)
    }

    /// Number of elements
    pub fn count(&self) -> usize {
        if self.size == 0 {
            0
        } else {
            self.data.len() / self.size
        }
    }

    /// Component `component` of element `element`
    pub fn get(&self, element: usize, component: usize) -> f64 {
        self.data.get(element * self.size + component)
    }
}

/// Vertex attribute streams, in glTF attribute order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexAttribute {
    Position,
    Normal,
    Tangent,
    TexCoord0,
    TexCoord1,
    Color,
    Joints,
    Weights,
}

impl VertexAttribute {
    pub fn semantic(self) -> json::mesh::Semantic {
        use json::mesh::Semantic;
        match self {
            Self::Position => Semantic::Positions,
            Self::Normal => Semantic::Normals,
            Self::Tangent => Semantic::Tangents,
            Self::TexCoord0 => Semantic::TexCoords(0),
            Self::TexCoord1 => Semantic::TexCoords(1),
            Self::Color => Semantic::Colors(0),
            Self::Joints => Semantic::Joints(0),
            Self::Weights => Semantic::Weights(0),
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl PrimitiveMode {
    pub fn to_gltf(self) -> json::mesh::Mode {
        use json::mesh::Mode;
        match self {
            Self::Points => Mode::Points,
            Self::Lines => Mode::Lines,
            Self::LineLoop => Mode::LineLoop,
            Self::LineStrip => Mode::LineStrip,
            Self::Triangles => Mode::Triangles,
            Self::TriangleStrip => Mode::TriangleStrip,
            Self::TriangleFan => Mode::TriangleFan,
        }
    }
}

/// Morph target deltas; entry `i` of each list belongs to target `i`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphTargets {
    pub positions: Vec<Arc<AttributeData>>,
    pub normals: Vec<Arc<AttributeData>>,
    pub tangents: Vec<Arc<AttributeData>>,
    pub weights: Vec<f32>,
}

impl MorphTargets {
    pub fn target_count(&self) -> usize {
        self.positions
            .len()
            .max(self.normals.len())
            .max(self.tangents.len())
    }
}

/// Source geometry
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub mode: PrimitiveMode,
    pub attributes: BTreeMap<VertexAttribute, Arc<AttributeData>>,
    pub indices: Option<Arc<AttributeData>>,
    pub morph_targets: Option<MorphTargets>,
}

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: PrimitiveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn attribute(mut self, attribute: VertexAttribute, data: AttributeData) -> Self {
        self.attributes.insert(attribute, Arc::new(data));
        self
    }

    /// Attach an already shared attribute stream
    pub fn shared_attribute(mut self, attribute: VertexAttribute, data: Arc<AttributeData>) -> Self {
        self.attributes.insert(attribute, data);
        self
    }

    pub fn indices(mut self, indices: &[u32]) -> Self {
        self.indices = Some(Arc::new(AttributeData::indices(indices)));
        self
    }

    pub fn morph_targets(mut self, targets: MorphTargets) -> Self {
        self.morph_targets = Some(targets);
        self
    }

    pub fn get(&self, attribute: VertexAttribute) -> Option<&Arc<AttributeData>> {
        self.attributes.get(&attribute)
    }

    /// Vertex count as declared by the position stream
    pub fn vertex_count(&self) -> usize {
        self.get(VertexAttribute::Position)
            .map_or(0, |positions| positions.count())
    }

    pub fn build(self) -> Arc<Geometry> {
        Arc::new(self)
    }
}

/// Projection of a camera node
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Perspective {
        aspect: f32,
        /// Vertical field of view in degrees
        fov: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
    /// Any projection glTF cannot describe, by host class name
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub name: Option<String>,
    pub projection: Projection,
}

impl Camera {
    pub fn new(projection: Projection) -> Self {
        Self {
            name: None,
            projection,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Top-level scene handed to the exporter
#[derive(Debug, Clone)]
pub struct Stage {
    pub root: Arc<SceneNode>,
    /// Active camera; exported only when it is not already part of the tree
    pub camera: Option<Arc<SceneNode>>,
    /// Animations registered with the host, used when none are configured
    pub animations: Vec<Arc<Animation>>,
}

impl Stage {
    pub fn new(root: Arc<SceneNode>) -> Self {
        Self {
            root,
            camera: None,
            animations: Vec::new(),
        }
    }

    pub fn camera(mut self, camera: Arc<SceneNode>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn animation(mut self, animation: Arc<Animation>) -> Self {
        self.animations.push(animation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_data_elements() {
        let data = AttributeData::vec3(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(data.count(), 2);
        assert_eq!(data.get(1, 2), 6.0);
        assert_eq!(data.data.component_type(), json::accessor::ComponentType::F32);
    }

    #[test]
    fn test_vertex_attribute_order_matches_gltf() {
        let geometry = Geometry::new()
            .attribute(VertexAttribute::Weights, AttributeData::vec4(&[[1.0, 0.0, 0.0, 0.0]]))
            .attribute(VertexAttribute::Position, AttributeData::vec3(&[[0.0; 3]]))
            .attribute(VertexAttribute::TexCoord0, AttributeData::vec2(&[[0.0; 2]]));

        let order: Vec<_> = geometry.attributes.keys().copied().collect();
        assert_eq!(
            order,
            vec![
                VertexAttribute::Position,
                VertexAttribute::TexCoord0,
                VertexAttribute::Weights
            ]
        );
        assert_eq!(geometry.vertex_count(), 1);
    }

    #[test]
    fn test_object_identity() {
        let a = SceneNode::new().build();
        let b = SceneNode::new().build();
        assert_eq!(object_id(&a), object_id(&a.clone()));
        assert_ne!(object_id(&a), object_id(&b));
    }
}
