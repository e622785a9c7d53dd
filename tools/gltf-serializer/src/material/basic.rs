//! Diffuse-colour materials mapped onto metallic-roughness

use gltf_json as json;
use gltf_json::material::{EmissiveFactor, NormalTexture, PbrBaseColorFactor, StrengthFactor};

use crate::error::Result;
use crate::material::{LightType, Material, MaterialKind, MaterialSerializer, make_unlit};
use crate::serializer::GltfSerializer;

/// Metallic and roughness of every lit basic material
const BASIC_METALLIC_ROUGHNESS: f32 = 0.5;

/// Serializer for [`MaterialKind::Basic`]
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicMaterialSerializer;

impl MaterialSerializer for BasicMaterialSerializer {
    fn serialize(
        &self,
        serializer: &mut GltfSerializer,
        material: &Material,
    ) -> Result<Option<json::Material>> {
        let MaterialKind::Basic(basic) = &material.kind else {
            return Ok(None);
        };

        let mut out = json::Material::default();

        if let Some(texture) = &basic.diffuse_texture {
            out.pbr_metallic_roughness.base_color_texture = Some(serializer.texture_info(texture)?);
        }
        if basic.diffuse_color != [1.0; 4] {
            out.pbr_metallic_roughness.base_color_factor = PbrBaseColorFactor(basic.diffuse_color);
        }

        if material.light_type == LightType::Unlit {
            make_unlit(serializer, &mut out);
            return Ok(Some(out));
        }

        if let Some(texture) = &basic.normal_texture {
            let info = serializer.texture_info(texture)?;
            out.normal_texture = Some(NormalTexture {
                index: info.index,
                scale: 1.0,
                tex_coord: info.tex_coord,
                extensions: None,
                extras: Default::default(),
            });
        }

        if let Some(texture) = &basic.emission_texture {
            out.emissive_texture = Some(serializer.texture_info(texture)?);
        } else if basic.emission_color != [0.0; 4] {
            let [r, g, b, _] = basic.emission_color;
            out.emissive_factor = EmissiveFactor([r, g, b]);
        }

        out.pbr_metallic_roughness.metallic_factor = StrengthFactor(BASIC_METALLIC_ROUGHNESS);
        out.pbr_metallic_roughness.roughness_factor = StrengthFactor(BASIC_METALLIC_ROUGHNESS);

        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::material::BasicMaterial;
    use crate::texture::Texture;

    fn serializer() -> GltfSerializer {
        GltfSerializer::new(ExportConfig::default(), Vec::new(), None)
    }

    #[test]
    fn test_lit_basic() {
        let mut s = serializer();
        let material = Material::basic(BasicMaterial {
            diffuse_color: [0.2, 0.4, 0.6, 1.0],
            emission_color: [0.1, 0.1, 0.1, 1.0],
            ..Default::default()
        });

        let out = BasicMaterialSerializer.serialize(&mut s, &material).unwrap().unwrap();
        assert_eq!(out.pbr_metallic_roughness.base_color_factor.0, [0.2, 0.4, 0.6, 1.0]);
        assert_eq!(out.pbr_metallic_roughness.metallic_factor.0, 0.5);
        assert_eq!(out.pbr_metallic_roughness.roughness_factor.0, 0.5);
        assert_eq!(out.emissive_factor.0, [0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_emission_texture_wins_over_colour() {
        let mut s = serializer();
        let material = Material::basic(BasicMaterial {
            emission_color: [1.0; 4],
            emission_texture: Some(Texture::new().image_src("glow.png").build()),
            ..Default::default()
        });

        let out = BasicMaterialSerializer.serialize(&mut s, &material).unwrap().unwrap();
        assert!(out.emissive_texture.is_some());
        assert_eq!(out.emissive_factor.0, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unlit_basic_keeps_diffuse_texture() {
        let mut s = serializer();
        let material = Material::basic(BasicMaterial {
            diffuse_texture: Some(Texture::new().image_src("diffuse.png").build()),
            normal_texture: Some(Texture::new().image_src("normal.png").build()),
            ..Default::default()
        })
        .light_type(LightType::Unlit);

        let out = BasicMaterialSerializer.serialize(&mut s, &material).unwrap().unwrap();
        assert!(out.pbr_metallic_roughness.base_color_texture.is_some());
        assert!(out.normal_texture.is_none());
        assert_eq!(out.pbr_metallic_roughness.metallic_factor.0, 0.0);
    }
}
