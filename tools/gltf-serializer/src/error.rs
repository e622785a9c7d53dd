//! Error types for scene serialization

use crate::texture::RenderError;

/// Errors raised while converting a scene into a glTF document.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// No material serializer recognized the material and the fallback is disabled
    #[error("No material serializer found for material: {class_name}")]
    UnknownMaterial { class_name: String },

    /// Accessor data with a component count that has no glTF element type
    #[error("invalid accessor component count {0} (expected 1, 2, 3, 4, 9 or 16)")]
    InvalidComponentCount(usize),

    /// A texture without any image source needs rasterizing but no device was supplied
    #[error("texture {texture:?} has no image source and no render device is available")]
    MissingRenderDevice { texture: Option<String> },

    #[error("render device failed: {0}")]
    Render(#[from] RenderError),

    #[error("failed to encode rasterized texture: {0}")]
    ImageEncode(#[from] image::ImageError),

    #[error("failed to serialize glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SerializeError>;
