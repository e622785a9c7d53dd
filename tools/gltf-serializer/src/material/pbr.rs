//! Metallic-roughness materials

use gltf_json as json;
use gltf_json::material::{
    EmissiveFactor, NormalTexture, OcclusionTexture, PbrBaseColorFactor, StrengthFactor,
};

use crate::error::Result;
use crate::material::{LightType, Material, MaterialKind, MaterialSerializer, make_unlit};
use crate::serializer::GltfSerializer;

/// Serializer for [`MaterialKind::Pbr`]
#[derive(Debug, Clone, Copy, Default)]
pub struct PbrMaterialSerializer;

impl MaterialSerializer for PbrMaterialSerializer {
    fn serialize(
        &self,
        serializer: &mut GltfSerializer,
        material: &Material,
    ) -> Result<Option<json::Material>> {
        let MaterialKind::Pbr(pbr) = &material.kind else {
            return Ok(None);
        };

        let mut out = json::Material::default();

        if let Some(texture) = &pbr.base_color_texture {
            out.pbr_metallic_roughness.base_color_texture = Some(serializer.texture_info(texture)?);
        }
        if pbr.base_color_factor != [1.0; 4] {
            out.pbr_metallic_roughness.base_color_factor = PbrBaseColorFactor(pbr.base_color_factor);
        }

        if material.light_type == LightType::Unlit {
            make_unlit(serializer, &mut out);
            return Ok(Some(out));
        }

        if let Some(texture) = &pbr.metallic_roughness_texture {
            out.pbr_metallic_roughness.metallic_roughness_texture =
                Some(serializer.texture_info(texture)?);
        }
        if pbr.metallic != 1.0 {
            out.pbr_metallic_roughness.metallic_factor = StrengthFactor(pbr.metallic);
        }
        if pbr.roughness != 1.0 {
            out.pbr_metallic_roughness.roughness_factor = StrengthFactor(pbr.roughness);
        }

        if let Some(texture) = &pbr.normal_texture {
            let info = serializer.texture_info(texture)?;
            out.normal_texture = Some(NormalTexture {
                index: info.index,
                scale: 1.0,
                tex_coord: info.tex_coord,
                extensions: None,
                extras: Default::default(),
            });
        }

        if let Some(texture) = &pbr.emissive_texture {
            out.emissive_texture = Some(serializer.texture_info(texture)?);
        }
        if pbr.emissive_factor != [0.0; 4] {
            let [r, g, b, _] = pbr.emissive_factor;
            out.emissive_factor = EmissiveFactor([r, g, b]);
        }

        if let Some(texture) = &pbr.occlusion_texture {
            let info = serializer.texture_info(texture)?;
            out.occlusion_texture = Some(OcclusionTexture {
                index: info.index,
                strength: StrengthFactor(1.0),
                tex_coord: info.tex_coord,
                extensions: None,
                extras: Default::default(),
            });
        }

        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::material::{BasicMaterial, KHR_MATERIALS_UNLIT, PbrMaterial};
    use crate::texture::Texture;

    fn serializer() -> GltfSerializer {
        GltfSerializer::new(ExportConfig::default(), Vec::new(), None)
    }

    #[test]
    fn test_skips_other_kinds() {
        let mut s = serializer();
        let material = Material::basic(BasicMaterial::default());
        assert!(PbrMaterialSerializer.serialize(&mut s, &material).unwrap().is_none());
    }

    #[test]
    fn test_lit_factors_and_textures() {
        let mut s = serializer();
        let albedo = Texture::new().image_src("albedo.png").uv(1).build();
        let material = Material::pbr(PbrMaterial {
            base_color_factor: [0.5, 0.5, 0.5, 1.0],
            base_color_texture: Some(albedo.clone()),
            metallic: 0.25,
            emissive_factor: [1.0, 0.5, 0.0, 0.0],
            normal_texture: Some(albedo),
            ..Default::default()
        });

        let out = PbrMaterialSerializer.serialize(&mut s, &material).unwrap().unwrap();
        let pbr = &out.pbr_metallic_roughness;
        assert_eq!(pbr.base_color_factor.0, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(pbr.metallic_factor.0, 0.25);
        assert_eq!(pbr.roughness_factor.0, 1.0);
        assert_eq!(out.emissive_factor.0, [1.0, 0.5, 0.0]);

        let base = pbr.base_color_texture.as_ref().unwrap();
        assert_eq!(base.tex_coord, 1);
        // Same texture reused for the normal map
        assert_eq!(out.normal_texture.as_ref().unwrap().index, base.index);
        assert!(out.extensions.is_none());
    }

    #[test]
    fn test_unlit() {
        let mut s = serializer();
        let material = Material::pbr(PbrMaterial {
            metallic: 0.8,
            roughness: 0.2,
            emissive_factor: [1.0; 4],
            ..Default::default()
        })
        .light_type(LightType::Unlit);

        let out = PbrMaterialSerializer.serialize(&mut s, &material).unwrap().unwrap();
        assert_eq!(out.pbr_metallic_roughness.metallic_factor.0, 0.0);
        assert_eq!(out.pbr_metallic_roughness.roughness_factor.0, 1.0);
        assert_eq!(out.emissive_factor.0, [0.0, 0.0, 0.0]);
        assert!(out.extensions.unwrap().others.contains_key(KHR_MATERIALS_UNLIT));

        let root = s.to_gltf();
        assert_eq!(root.extensions_used, vec![KHR_MATERIALS_UNLIT.to_string()]);
        assert!(root.extensions_required.is_empty());
    }
}
