//! Procedural demo scene: a spinning checkered box and a camera

use std::f32::consts::TAU;
use std::sync::Arc;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use image::{ImageBuffer, Rgba};

use gltf_serializer::texture::encode_png_data_uri;
use gltf_serializer::{
    Animation, AnimationTrack, AttributeData, BasicMaterial, Camera, Geometry, LightType,
    Material, Mesh, Projection, SceneNode, Stage, Texture, TrackProperty, VertexAttribute,
};

/// Keyframes in the spin animation
const SPIN_KEYS: usize = 9;
/// Length of one full turn in seconds
const SPIN_SECONDS: f32 = 2.0;

/// Face definition: (normal, corners)
type FaceDefinition = ([f32; 3], [[f32; 3]; 4]);

/// Unit cube with per-face normals and UVs
fn box_geometry() -> Arc<Geometry> {
    let faces: [FaceDefinition; 6] = [
        ([0.0, 0.0, 1.0], [[-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5]]),
        ([0.0, 0.0, -1.0], [[0.5, -0.5, -0.5], [-0.5, -0.5, -0.5], [-0.5, 0.5, -0.5], [0.5, 0.5, -0.5]]),
        ([1.0, 0.0, 0.0], [[0.5, -0.5, 0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [0.5, 0.5, 0.5]]),
        ([-1.0, 0.0, 0.0], [[-0.5, -0.5, -0.5], [-0.5, -0.5, 0.5], [-0.5, 0.5, 0.5], [-0.5, 0.5, -0.5]]),
        ([0.0, 1.0, 0.0], [[-0.5, 0.5, 0.5], [0.5, 0.5, 0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5]]),
        ([0.0, -1.0, 0.0], [[-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5]]),
    ];
    let corner_uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut uvs = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, corners) in faces {
        let base = positions.len() as u32;
        positions.extend(corners);
        normals.extend([normal; 4]);
        uvs.extend(corner_uvs);
        indices.extend([base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Geometry::new()
        .attribute(VertexAttribute::Position, AttributeData::vec3(&positions))
        .attribute(VertexAttribute::Normal, AttributeData::vec3(&normals))
        .attribute(VertexAttribute::TexCoord0, AttributeData::vec2(&uvs))
        .indices(&indices)
        .build()
}

/// Checkerboard embedded as a PNG data URI
fn checker_texture() -> Result<Arc<Texture>> {
    const SIZE: u32 = 64;
    const CHECKER_SIZE: u32 = 8;

    let img = ImageBuffer::from_fn(SIZE, SIZE, |x, y| {
        let is_white = ((x / CHECKER_SIZE) + (y / CHECKER_SIZE)).is_multiple_of(2);
        if is_white {
            Rgba([255u8, 255, 255, 255])
        } else {
            Rgba([80u8, 80, 80, 255])
        }
    });

    let uri = encode_png_data_uri(img.as_raw(), SIZE, SIZE)
        .context("Failed to encode checkerboard texture")?;
    Ok(Texture::new().name("checker").image_src(uri).size(SIZE, SIZE).build())
}

/// Full turn around Y
fn spin_animation(target: &Arc<SceneNode>) -> Arc<Animation> {
    let mut track = AnimationTrack::new(target.clone(), TrackProperty::Rotation);
    for key in 0..SPIN_KEYS {
        let t = key as f32 / (SPIN_KEYS - 1) as f32;
        let rotation = Quat::from_axis_angle(Vec3::Y, t * TAU);
        track = track.key(t * SPIN_SECONDS, &rotation.to_array());
    }

    Animation::new().name("spin").track(track).build()
}

/// Build the demo stage
pub fn build_stage() -> Result<Stage> {
    let material = Material::basic(BasicMaterial {
        diffuse_texture: Some(checker_texture()?),
        ..Default::default()
    })
    .name("checker")
    .light_type(LightType::Unlit)
    .build();

    let cube = SceneNode::new()
        .name("Box")
        .mesh(Mesh::new(box_geometry(), material))
        .build();

    let eye = Vec3::new(2.0, 1.5, 3.0);
    let look = Quat::from_mat4(&glam::Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y).inverse());
    let camera = SceneNode::new()
        .name("Camera")
        .translation(eye.to_array())
        .rotation(look.to_array())
        .camera(Camera::new(Projection::Perspective {
            aspect: 16.0 / 9.0,
            fov: 45.0,
            near: 0.1,
            far: 100.0,
        }))
        .build();

    let root = SceneNode::new().name("Scene").child(cube.clone()).build();

    Ok(Stage::new(root)
        .camera(camera)
        .animation(spin_animation(&cube)))
}
