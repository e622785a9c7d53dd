//! glTF 2.0 / GLB export for in-memory scene graphs
//!
//! This library walks a [`Stage`] once and produces a self-contained glTF
//! document:
//! - GltfExporter: Material serializer chain and optional render device
//! - GltfSerializer: Scene walk, identity-keyed registries, JSON/GLB output
//! - BufferLayout: Accessors, buffer views and buffer merging
//! - geometry::rebuild: Index remapping, winding fix-up, vertex interleaving
//! - animation: Track to channel/sampler conversion and merging
//!
//! # Example
//!
//! ```no_run
//! use gltf_serializer::*;
//!
//! let geometry = Geometry::new()
//!     .attribute(
//!         VertexAttribute::Position,
//!         AttributeData::vec3(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.5, 1.0, 0.0]]),
//!     )
//!     .indices(&[0, 1, 2])
//!     .build();
//! let material = Material::pbr(PbrMaterial::default()).build();
//! let root = SceneNode::new()
//!     .name("Triangle")
//!     .mesh(Mesh::new(geometry, material))
//!     .build();
//!
//! let serializer = GltfExporter::new()
//!     .serialize(&Stage::new(root), ExportConfig::default())?;
//! let glb_bytes = serializer.to_glb()?;
//! # Ok::<(), SerializeError>(())
//! ```

pub mod animation;
pub mod buffer;
pub mod config;
pub mod error;
pub mod exporter;
pub mod geometry;
pub mod material;
pub mod scene;
pub mod serializer;
pub mod skeleton;
pub mod texture;
pub mod utils;

pub use animation::{Animation, AnimationTrack, Interpolation, TrackProperty};
pub use buffer::{AccessorData, AccessorIndex, BufferLayout};
pub use config::{ExportConfig, load_config};
pub use error::{Result, SerializeError};
pub use exporter::GltfExporter;
pub use material::{
    BasicMaterial, CustomMaterial, FrontFace, LightType, Material, MaterialKind,
    MaterialSerializer, PbrMaterial, Side,
};
pub use scene::{
    AttributeData, Camera, ComponentData, Geometry, Mesh, MorphTargets, PrimitiveMode,
    Projection, SceneNode, Stage, Transform, VertexAttribute,
};
pub use serializer::GltfSerializer;
pub use skeleton::Skeleton;
pub use texture::{RenderDevice, RenderError, SharedRenderDevice, Texture};
pub use utils::{assemble_glb, data_uri};

// Re-export commonly used gltf-json types
pub use gltf_json as json;
