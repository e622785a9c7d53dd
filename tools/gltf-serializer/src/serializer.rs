//! Scene walker and glTF registries
//!
//! [`GltfSerializer`] walks a [`Stage`] depth-first and appends every
//! reachable node, mesh, material, texture, skin and camera to flat indexed
//! arrays. Shared source objects are registered once, keyed by identity, so
//! output order is first-encountered order.

use std::collections::BTreeMap;
use std::sync::Arc;

use gltf_json as json;
use gltf_json::validation::Checked::Valid;
use hashbrown::HashMap;
use rayon::prelude::*;
use serde::Serialize;

use crate::animation::{merge_animations, serialize_animation};
use crate::buffer::{AccessorData, BufferLayout};
use crate::config::ExportConfig;
use crate::error::{Result, SerializeError};
use crate::geometry::{CanonicalGeometry, rebuild};
use crate::material::{FrontFace, Material, MaterialSerializer, fallback_material, finalize};
use crate::scene::{Camera, Mesh, Projection, SceneNode, Stage, Transform, object_id};
use crate::skeleton::Skeleton;
use crate::texture::{Rasterizer, SharedRenderDevice, Texture};
use crate::utils::{assemble_glb, data_uri};

type MeshKey = (usize, usize, Option<usize>);
type GeometryKey = (usize, bool, Option<Vec<Option<u32>>>);

/// One-shot serializer for a single stage.
///
/// Created by [`crate::GltfExporter::serialize`]; every registry starts empty.
pub struct GltfSerializer {
    config: ExportConfig,
    material_serializers: Vec<Arc<dyn MaterialSerializer>>,
    rasterizer: Rasterizer,

    layout: BufferLayout,
    buffers: Vec<json::Buffer>,

    nodes: Vec<json::Node>,
    node_map: HashMap<usize, u32>,
    meshes: Vec<json::Mesh>,
    mesh_map: HashMap<MeshKey, u32>,
    geometry_map: HashMap<GeometryKey, Arc<CanonicalGeometry>>,
    materials: Vec<json::Material>,
    material_map: HashMap<usize, u32>,
    textures: Vec<json::Texture>,
    texture_map: HashMap<usize, u32>,
    samplers: Vec<json::texture::Sampler>,
    images: Vec<json::Image>,
    image_map: HashMap<String, u32>,
    skins: Vec<json::Skin>,
    skin_map: HashMap<usize, u32>,
    cameras: Vec<json::Camera>,
    scenes: Vec<json::Scene>,
    animations: Vec<json::Animation>,

    extensions: serde_json::Map<String, serde_json::Value>,
    extensions_used: Vec<String>,
    extensions_required: Vec<String>,
    extras: json::Extras,
}

impl GltfSerializer {
    pub fn new(
        config: ExportConfig,
        material_serializers: Vec<Arc<dyn MaterialSerializer>>,
        device: Option<SharedRenderDevice>,
    ) -> Self {
        Self {
            config,
            material_serializers,
            rasterizer: Rasterizer::new(device),
            layout: BufferLayout::new(),
            buffers: Vec::new(),
            nodes: Vec::new(),
            node_map: HashMap::new(),
            meshes: Vec::new(),
            mesh_map: HashMap::new(),
            geometry_map: HashMap::new(),
            materials: Vec::new(),
            material_map: HashMap::new(),
            textures: Vec::new(),
            texture_map: HashMap::new(),
            samplers: Vec::new(),
            images: Vec::new(),
            image_map: HashMap::new(),
            skins: Vec::new(),
            skin_map: HashMap::new(),
            cameras: Vec::new(),
            scenes: Vec::new(),
            animations: Vec::new(),
            extensions: serde_json::Map::new(),
            extensions_used: Vec::new(),
            extensions_required: Vec::new(),
            extras: None,
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Walk the stage, parse animations, run the merge passes and encode buffers
    pub fn serialize(&mut self, stage: &Stage) -> Result<()> {
        let mut scene_nodes: Vec<json::Index<json::Node>> =
            self.visit(&stage.root)?.into_iter().map(json::Index::new).collect();

        if self.config.camera {
            if let Some(camera) = &stage.camera {
                // Only a camera outside the tree needs its own scene root
                if !self.node_map.contains_key(&object_id(camera)) {
                    if let Some(index) = self.visit(camera)? {
                        scene_nodes.push(json::Index::new(index));
                    }
                }
            }
        }

        self.scenes.push(json::Scene {
            extensions: None,
            extras: Default::default(),
            name: stage.root.name.clone(),
            nodes: scene_nodes,
        });

        let animations = self
            .config
            .anims
            .clone()
            .unwrap_or_else(|| stage.animations.clone());
        for animation in &animations {
            let node_map = &self.node_map;
            let out = serialize_animation(animation, &mut self.layout, |node| {
                node_map.get(&object_id(node)).copied()
            })?;
            self.animations.push(out);
        }

        if let Some(hook) = self.config.on_parse_end.clone() {
            hook(self);
        }

        if self.config.merge_animations {
            self.animations = merge_animations(std::mem::take(&mut self.animations));
        }

        self.layout.merge_buffers();
        self.buffers = self
            .layout
            .segments()
            .par_iter()
            .map(|data| json::Buffer {
                byte_length: data.len().into(),
                name: None,
                uri: Some(data_uri("application/octet-stream", data)),
                extensions: None,
                extras: Default::default(),
            })
            .collect();

        tracing::debug!(
            "serialized {} nodes, {} meshes, {} materials, {} textures, {} accessors, {} animations",
            self.nodes.len(),
            self.meshes.len(),
            self.materials.len(),
            self.textures.len(),
            self.layout.accessors().len(),
            self.animations.len()
        );

        Ok(())
    }

    /// Register `node` and its subtree.
    ///
    /// Invisible nodes return `None` and leave no trace.
    pub fn visit(&mut self, node: &Arc<SceneNode>) -> Result<Option<u32>> {
        if !node.visible {
            return Ok(None);
        }

        let id = object_id(node);
        if let Some(&index) = self.node_map.get(&id) {
            return Ok(Some(index));
        }

        let index = self.nodes.len() as u32;
        self.nodes.push(node_record(node));
        self.node_map.insert(id, index);

        if let Some(mesh) = &node.mesh {
            let mesh_index = self.mesh(mesh)?;
            self.nodes[index as usize].mesh = Some(json::Index::new(mesh_index));

            if let Some(skeleton) = &mesh.skeleton {
                let skin = self.skin(skeleton)?;
                self.nodes[index as usize].skin = Some(json::Index::new(skin));
            }
        }

        if self.config.camera {
            if let Some(camera) = &node.camera {
                let camera = self.camera(camera);
                self.nodes[index as usize].camera = Some(json::Index::new(camera));
            }
        }

        let mut children = Vec::new();
        for child in &node.children {
            if let Some(child) = self.visit(child)? {
                children.push(json::Index::new(child));
            }
        }
        if !children.is_empty() {
            self.nodes[index as usize].children = Some(children);
        }

        Ok(Some(index))
    }

    /// Index of an already registered node
    pub fn node_index(&self, node: &Arc<SceneNode>) -> Option<u32> {
        self.node_map.get(&object_id(node)).copied()
    }

    fn mesh(&mut self, mesh: &Mesh) -> Result<u32> {
        let key = (
            object_id(&mesh.geometry),
            object_id(&mesh.material),
            mesh.skeleton.as_ref().map(object_id),
        );
        if let Some(&index) = self.mesh_map.get(&key) {
            return Ok(index);
        }

        let joint_map = mesh.skeleton.as_ref().map(|s| s.joint_map());
        let geometry = self.rebuilt_geometry(mesh, joint_map);
        let material = self.material(&mesh.material)?;

        let mut attributes = BTreeMap::new();
        for (attribute, data) in &geometry.attributes {
            let accessor = self.layout.accessor_for(data)?;
            attributes.insert(Valid(attribute.semantic()), accessor.as_json_index());
        }
        let indices = self.layout.accessor_for(&geometry.indices)?;

        let mut targets = Vec::with_capacity(geometry.targets.len());
        for target in &geometry.targets {
            let mut accessor = |data: &Option<Arc<AccessorData>>| -> Result<Option<json::Index<json::Accessor>>> {
                data.as_deref()
                    .map(|d| self.layout.accessor_for(d).map(|a| a.as_json_index()))
                    .transpose()
            };
            targets.push(json::mesh::MorphTarget {
                positions: accessor(&target.positions)?,
                normals: accessor(&target.normals)?,
                tangents: accessor(&target.tangents)?,
            });
        }

        let primitive = json::mesh::Primitive {
            attributes,
            extensions: None,
            extras: Default::default(),
            indices: Some(indices.as_json_index()),
            material: Some(json::Index::new(material)),
            mode: Valid(geometry.mode.to_gltf()),
            targets: (!targets.is_empty()).then_some(targets),
        };

        let index = self.meshes.len() as u32;
        self.meshes.push(json::Mesh {
            extensions: None,
            extras: Default::default(),
            name: None,
            primitives: vec![primitive],
            weights: (!geometry.weights.is_empty()).then(|| geometry.weights.clone()),
        });
        self.mesh_map.insert(key, index);
        Ok(index)
    }

    /// Rebuilt geometry, shared between meshes with the same winding and joint layout
    fn rebuilt_geometry(
        &mut self,
        mesh: &Mesh,
        joint_map: Option<Vec<Option<u32>>>,
    ) -> Arc<CanonicalGeometry> {
        let front_face = mesh.material.front_face;
        let key = (
            object_id(&mesh.geometry),
            front_face == FrontFace::Clockwise,
            joint_map,
        );
        if let Some(geometry) = self.geometry_map.get(&key) {
            return geometry.clone();
        }

        let geometry = Arc::new(rebuild(&mesh.geometry, front_face, key.2.as_deref()));
        self.geometry_map.insert(key, geometry.clone());
        geometry
    }

    fn material(&mut self, material: &Arc<Material>) -> Result<u32> {
        let id = object_id(material);
        if let Some(&index) = self.material_map.get(&id) {
            return Ok(index);
        }

        let chain = self.material_serializers.clone();
        let mut out = None;
        for serializer in &chain {
            if let Some(serialized) = serializer.serialize(self, material)? {
                out = Some(serialized);
                break;
            }
        }

        let mut out = match out {
            Some(out) => out,
            None if self.config.ignore_unknown_material_error => {
                tracing::warn!(
                    "No material serializer found for material: {}, using fallback",
                    material.kind.class_name()
                );
                fallback_material(self)
            }
            None => {
                return Err(SerializeError::UnknownMaterial {
                    class_name: material.kind.class_name().to_string(),
                });
            }
        };
        finalize(material, &mut out)?;

        let index = self.materials.len() as u32;
        self.materials.push(out);
        self.material_map.insert(id, index);
        Ok(index)
    }

    /// Texture reference for a material slot, registering the texture on first use
    pub fn texture_info(&mut self, texture: &Arc<Texture>) -> Result<json::texture::Info> {
        Ok(json::texture::Info {
            index: json::Index::new(self.texture(texture)?),
            tex_coord: texture.uv,
            extensions: None,
            extras: Default::default(),
        })
    }

    fn texture(&mut self, texture: &Arc<Texture>) -> Result<u32> {
        let id = object_id(texture);
        if let Some(&index) = self.texture_map.get(&id) {
            return Ok(index);
        }

        let source = self.image(texture)?;
        let sampler = self.samplers.len() as u32;
        self.samplers.push(texture.sampler());

        let index = self.textures.len() as u32;
        self.textures.push(json::Texture {
            name: texture.name.clone(),
            sampler: Some(json::Index::new(sampler)),
            source: json::Index::new(source),
            extensions: None,
            extras: Default::default(),
        });
        self.texture_map.insert(id, index);
        Ok(index)
    }

    fn image(&mut self, texture: &Texture) -> Result<u32> {
        let src = match texture.source() {
            Some(src) => src.to_string(),
            None => self.rasterizer.rasterize(texture)?,
        };
        if let Some(&index) = self.image_map.get(&src) {
            return Ok(index);
        }

        let index = self.images.len() as u32;
        self.images.push(json::Image {
            buffer_view: None,
            mime_type: None,
            name: texture.name.clone(),
            uri: Some(src.clone()),
            extensions: None,
            extras: Default::default(),
        });
        self.image_map.insert(src, index);
        Ok(index)
    }

    fn skin(&mut self, skeleton: &Arc<Skeleton>) -> Result<u32> {
        let id = object_id(skeleton);
        if let Some(&index) = self.skin_map.get(&id) {
            return Ok(index);
        }

        // Reserve the slot first: joints may lead back to this skeleton
        let index = self.skins.len() as u32;
        self.skins.push(json::Skin {
            extensions: None,
            extras: Default::default(),
            inverse_bind_matrices: None,
            joints: Vec::new(),
            name: None,
            skeleton: None,
        });
        self.skin_map.insert(id, index);

        let inverse_bind_matrices = if skeleton.inverse_bind_matrices.is_empty() {
            None
        } else {
            Some(
                self.layout
                    .accessor_for(&skeleton.inverse_bind_data())?
                    .as_json_index(),
            )
        };

        let mut joints = Vec::with_capacity(skeleton.exported_joint_count());
        for joint in &skeleton.joints {
            if let Some(joint) = self.visit(joint)? {
                joints.push(json::Index::new(joint));
            }
        }

        let root = match &skeleton.root {
            Some(root) => self.visit(root)?.map(json::Index::new),
            None => None,
        };

        let skin = &mut self.skins[index as usize];
        skin.inverse_bind_matrices = inverse_bind_matrices;
        skin.joints = joints;
        skin.skeleton = root;
        Ok(index)
    }

    fn camera(&mut self, camera: &Camera) -> u32 {
        let mut out = json::Camera {
            name: camera.name.clone(),
            orthographic: None,
            perspective: None,
            type_: Valid(json::camera::Type::Perspective),
            extensions: None,
            extras: Default::default(),
        };

        match &camera.projection {
            Projection::Perspective {
                aspect,
                fov,
                near,
                far,
            } => {
                out.perspective = Some(json::camera::Perspective {
                    aspect_ratio: Some(*aspect),
                    yfov: fov.to_radians(),
                    zfar: Some(*far),
                    znear: *near,
                    extensions: None,
                    extras: Default::default(),
                });
            }
            Projection::Orthographic {
                right,
                top,
                near,
                far,
                ..
            } => {
                out.type_ = Valid(json::camera::Type::Orthographic);
                out.orthographic = Some(json::camera::Orthographic {
                    xmag: *right,
                    ymag: *top,
                    zfar: *far,
                    znear: *near,
                    extensions: None,
                    extras: Default::default(),
                });
            }
            Projection::Unsupported(kind) => {
                tracing::warn!("Unsupported camera type: {}", kind);
            }
        }

        let index = self.cameras.len() as u32;
        self.cameras.push(out);
        index
    }

    /// Record `name` in `extensionsUsed` (and `extensionsRequired` when required)
    pub fn use_extension(&mut self, name: &str, required: bool) {
        if !self.extensions_used.iter().any(|e| e == name) {
            self.extensions_used.push(name.to_string());
        }
        if required && !self.extensions_required.iter().any(|e| e == name) {
            self.extensions_required.push(name.to_string());
        }
    }

    /// Root-level extension object, created empty on first use
    pub fn add_extension(&mut self, name: &str, required: bool) -> &mut serde_json::Value {
        self.use_extension(name, required);
        self.extensions
            .entry(name.to_string())
            .or_insert_with(|| serde_json::json!({}))
    }

    pub fn get_extension(&self, name: &str) -> Option<&serde_json::Value> {
        self.extensions.get(name)
    }

    /// Writable root-level extension object.
    ///
    /// A missing extension is added with `required`; an existing one keeps its
    /// usage flags.
    pub fn get_or_add_extension(&mut self, name: &str, required: bool) -> &mut serde_json::Value {
        if !self.extensions.contains_key(name) {
            self.use_extension(name, required);
        }
        self.extensions
            .entry(name.to_string())
            .or_insert_with(|| serde_json::json!({}))
    }

    /// Set the document's root `extras`
    pub fn set_extras<T: Serialize>(&mut self, extras: &T) -> Result<()> {
        self.extras = Some(serde_json::value::to_raw_value(extras)?);
        Ok(())
    }

    pub fn nodes(&self) -> &[json::Node] {
        &self.nodes
    }

    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    /// The merged binary buffer, once [`serialize`](Self::serialize) has run
    pub fn buffer_data(&self) -> Option<&[u8]> {
        self.layout.segments().first().map(|s| s.as_slice())
    }

    /// Assemble the glTF document; buffers are embedded as data URIs
    pub fn to_gltf(&self) -> json::Root {
        json::Root {
            asset: json::Asset {
                copyright: Some(self.config.copyright.clone()),
                extensions: None,
                extras: Default::default(),
                generator: Some(self.config.generator.clone()),
                min_version: None,
                version: "2.0".to_string(),
            },
            scene: (!self.scenes.is_empty()).then(|| json::Index::new(0)),
            scenes: self.scenes.clone(),
            nodes: self.nodes.clone(),
            meshes: self.meshes.clone(),
            materials: self.materials.clone(),
            buffers: self.buffers.clone(),
            buffer_views: self.layout.views().to_vec(),
            accessors: self.layout.accessors().to_vec(),
            textures: self.textures.clone(),
            samplers: self.samplers.clone(),
            images: self.images.clone(),
            animations: self.animations.clone(),
            skins: self.skins.clone(),
            cameras: self.cameras.clone(),
            extensions: (!self.extensions.is_empty()).then(|| json::extensions::Root {
                others: self.extensions.clone(),
                ..Default::default()
            }),
            extensions_used: self.extensions_used.clone(),
            extensions_required: self.extensions_required.clone(),
            extras: self.extras.clone(),
            ..Default::default()
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(json::serialize::to_string_pretty(&self.to_gltf())?)
    }

    /// Assemble a GLB container with the merged buffer as its BIN chunk
    pub fn to_glb(&self) -> Result<Vec<u8>> {
        let mut root = self.to_gltf();
        let data = self.buffer_data();
        root.buffers = data
            .map(|data| {
                vec![json::Buffer {
                    byte_length: data.len().into(),
                    name: None,
                    uri: None,
                    extensions: None,
                    extras: Default::default(),
                }]
            })
            .unwrap_or_default();
        assemble_glb(&root, data)
    }
}

/// Node record with name and non-identity transform parts
fn node_record(node: &SceneNode) -> json::Node {
    let Transform {
        translation,
        rotation,
        scale,
    } = node.transform;
    let identity = Transform::IDENTITY;

    json::Node {
        camera: None,
        children: None,
        extensions: None,
        extras: Default::default(),
        matrix: None,
        mesh: None,
        name: node.name.clone(),
        rotation: (rotation != identity.rotation).then_some(json::scene::UnitQuaternion(rotation)),
        scale: (scale != identity.scale).then_some(scale),
        translation: (translation != identity.translation).then_some(translation),
        skin: None,
        weights: None,
    }
}

impl std::fmt::Debug for GltfSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GltfSerializer")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("accessors", &self.layout.accessors().len())
            .field("rasterizer", &self.rasterizer)
            .finish()
    }
}
