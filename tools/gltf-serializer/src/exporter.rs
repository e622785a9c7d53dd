//! Exporter entry point

use std::sync::Arc;

use crate::config::ExportConfig;
use crate::error::Result;
use crate::material::{MaterialSerializer, default_serializers};
use crate::scene::Stage;
use crate::serializer::GltfSerializer;
use crate::texture::SharedRenderDevice;

/// Long-lived exporter holding the material chain and the optional render device.
///
/// Each [`serialize`](Self::serialize) call runs a fresh [`GltfSerializer`].
pub struct GltfExporter {
    material_serializers: Vec<Arc<dyn MaterialSerializer>>,
    device: Option<SharedRenderDevice>,
}

impl GltfExporter {
    /// Exporter with the PBR and basic material serializers
    pub fn new() -> Self {
        Self {
            material_serializers: default_serializers(),
            device: None,
        }
    }

    /// Device used to rasterize textures that have no image source
    pub fn with_render_device(mut self, device: SharedRenderDevice) -> Self {
        self.device = Some(device);
        self
    }

    /// Append a serializer after the existing ones
    pub fn add_material_serializer(&mut self, serializer: Arc<dyn MaterialSerializer>) {
        self.material_serializers.push(serializer);
    }

    pub fn serialize(&self, stage: &Stage, config: ExportConfig) -> Result<GltfSerializer> {
        let mut serializer = GltfSerializer::new(
            config,
            self.material_serializers.clone(),
            self.device.clone(),
        );
        serializer.serialize(stage)?;
        Ok(serializer)
    }
}

impl Default for GltfExporter {
    fn default() -> Self {
        Self::new()
    }
}
