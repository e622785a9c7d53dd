//! Source materials and the material serializer chain
//!
//! Each [`MaterialSerializer`] recognizes some material kinds and turns them
//! into a glTF material. The serializer walks the chain in order and the first
//! one that returns `Some` wins. Post-processing shared by every output
//! material (name, extras, sidedness, alpha mode) lives in [`finalize`].

mod basic;
mod pbr;

pub use basic::BasicMaterialSerializer;
pub use pbr::PbrMaterialSerializer;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use gltf_json as json;
use gltf_json::material::{AlphaCutoff, AlphaMode, EmissiveFactor, PbrBaseColorFactor, StrengthFactor};
use gltf_json::validation::Checked::Valid;

use crate::error::Result;
use crate::serializer::GltfSerializer;
use crate::texture::Texture;

/// Name of the unlit material extension
pub const KHR_MATERIALS_UNLIT: &str = "KHR_materials_unlit";

/// Faces a material renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Front,
    Back,
    Double,
}

/// Winding order of front faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    #[default]
    Lit,
    Unlit,
}

/// Metallic-roughness material
#[derive(Debug, Clone, PartialEq)]
pub struct PbrMaterial {
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<Arc<Texture>>,
    pub metallic: f32,
    pub roughness: f32,
    pub metallic_roughness_texture: Option<Arc<Texture>>,
    pub normal_texture: Option<Arc<Texture>>,
    pub emissive_factor: [f32; 4],
    pub emissive_texture: Option<Arc<Texture>>,
    pub occlusion_texture: Option<Arc<Texture>>,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            emissive_factor: [0.0; 4],
            emissive_texture: None,
            occlusion_texture: None,
        }
    }
}

/// Diffuse-colour material
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub diffuse_color: [f32; 4],
    pub diffuse_texture: Option<Arc<Texture>>,
    pub normal_texture: Option<Arc<Texture>>,
    pub emission_color: [f32; 4],
    pub emission_texture: Option<Arc<Texture>>,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            diffuse_color: [1.0; 4],
            diffuse_texture: None,
            normal_texture: None,
            emission_color: [0.0; 4],
            emission_texture: None,
        }
    }
}

/// Host material types outside the built-in kinds.
///
/// Custom serializers downcast through [`CustomMaterial::as_any`].
pub trait CustomMaterial: Debug + Send + Sync {
    fn class_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone)]
pub enum MaterialKind {
    Pbr(PbrMaterial),
    Basic(BasicMaterial),
    Custom(Arc<dyn CustomMaterial>),
}

impl MaterialKind {
    /// Host class name used in diagnostics
    pub fn class_name(&self) -> &str {
        match self {
            Self::Pbr(_) => "PbrMaterial",
            Self::Basic(_) => "BasicMaterial",
            Self::Custom(custom) => custom.class_name(),
        }
    }
}

/// Source material: common render state plus the kind-specific parameters
#[derive(Debug, Clone)]
pub struct Material {
    pub name: Option<String>,
    pub side: Side,
    pub front_face: FrontFace,
    pub light_type: LightType,
    /// Alpha test threshold; 0 disables masking
    pub alpha_cutoff: f32,
    pub transparent: bool,
    /// Arbitrary host data exported as `extras`
    pub user_data: Option<serde_json::Value>,
    pub kind: MaterialKind,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            name: None,
            side: Side::Front,
            front_face: FrontFace::CounterClockwise,
            light_type: LightType::Lit,
            alpha_cutoff: 0.0,
            transparent: false,
            user_data: None,
            kind,
        }
    }

    pub fn pbr(material: PbrMaterial) -> Self {
        Self::new(MaterialKind::Pbr(material))
    }

    pub fn basic(material: BasicMaterial) -> Self {
        Self::new(MaterialKind::Basic(material))
    }

    pub fn custom(material: Arc<dyn CustomMaterial>) -> Self {
        Self::new(MaterialKind::Custom(material))
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn light_type(mut self, light_type: LightType) -> Self {
        self.light_type = light_type;
        self
    }

    pub fn alpha_cutoff(mut self, alpha_cutoff: f32) -> Self {
        self.alpha_cutoff = alpha_cutoff;
        self
    }

    pub fn transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    pub fn user_data(mut self, user_data: serde_json::Value) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn build(self) -> Arc<Material> {
        Arc::new(self)
    }
}

/// One stage of the material chain.
///
/// Returns `Ok(None)` when the material is not handled by this serializer.
pub trait MaterialSerializer: Send + Sync {
    fn serialize(
        &self,
        serializer: &mut GltfSerializer,
        material: &Material,
    ) -> Result<Option<json::Material>>;
}

/// Serializers every exporter starts with, in chain order
pub fn default_serializers() -> Vec<Arc<dyn MaterialSerializer>> {
    vec![
        Arc::new(PbrMaterialSerializer),
        Arc::new(BasicMaterialSerializer),
    ]
}

/// Turn `out` into an unlit material and record the extension as used
pub(crate) fn make_unlit(serializer: &mut GltfSerializer, out: &mut json::Material) {
    let pbr = &mut out.pbr_metallic_roughness;
    pbr.metallic_factor = StrengthFactor(0.0);
    pbr.roughness_factor = StrengthFactor(1.0);
    out.emissive_factor = EmissiveFactor([0.0, 0.0, 0.0]);
    out.extensions
        .get_or_insert_with(Default::default)
        .others
        .insert(KHR_MATERIALS_UNLIT.to_string(), serde_json::json!({}));
    serializer.use_extension(KHR_MATERIALS_UNLIT, false);
}

/// Flat red unlit material emitted for unrecognized materials
pub(crate) fn fallback_material(serializer: &mut GltfSerializer) -> json::Material {
    let mut out = json::Material::default();
    out.pbr_metallic_roughness.base_color_factor = PbrBaseColorFactor([1.0, 0.0, 0.0, 1.0]);
    make_unlit(serializer, &mut out);
    out
}

/// Fields shared by every emitted material
pub(crate) fn finalize(material: &Material, out: &mut json::Material) -> Result<()> {
    out.name = material.name.clone();

    if let Some(user_data) = &material.user_data {
        out.extras = Some(serde_json::value::to_raw_value(user_data)?);
    }

    out.double_sided = material.side != Side::Front;

    if material.alpha_cutoff > 0.0 {
        out.alpha_mode = Valid(AlphaMode::Mask);
        out.alpha_cutoff = (material.alpha_cutoff != 0.5).then_some(AlphaCutoff(material.alpha_cutoff));
    } else if material.transparent {
        out.alpha_mode = Valid(AlphaMode::Blend);
    } else {
        out.alpha_mode = Valid(AlphaMode::Opaque);
    }

    Ok(())
}
