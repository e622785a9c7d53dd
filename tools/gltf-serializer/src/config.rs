//! Export configuration (optionally loaded from TOML)

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::animation::Animation;
use crate::serializer::GltfSerializer;

/// Hook run after traversal and animation parsing, before the merge passes
pub type ParseEndHook = Arc<dyn Fn(&mut GltfSerializer) + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Export the stage camera and camera attachments
    #[serde(default)]
    pub camera: bool,
    /// Flatten every animation into one named "default"
    #[serde(default = "default_true")]
    pub merge_animations: bool,
    /// Replace unknown materials with a red unlit fallback instead of failing
    #[serde(default = "default_true")]
    pub ignore_unknown_material_error: bool,
    #[serde(default = "default_generator")]
    pub generator: String,
    #[serde(default = "default_copyright")]
    pub copyright: String,
    /// Animations to export; the stage's own list when unset
    #[serde(skip)]
    pub anims: Option<Vec<Arc<Animation>>>,
    #[serde(skip)]
    pub on_parse_end: Option<ParseEndHook>,
}

fn default_true() -> bool { true }
fn default_generator() -> String { format!("gltf-serializer {}", env!("CARGO_PKG_VERSION")) }
fn default_copyright() -> String { "gltf-serializer".to_string() }

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            camera: false,
            merge_animations: true,
            ignore_unknown_material_error: true,
            generator: default_generator(),
            copyright: default_copyright(),
            anims: None,
            on_parse_end: None,
        }
    }
}

impl ExportConfig {
    pub fn camera(mut self, camera: bool) -> Self {
        self.camera = camera;
        self
    }

    pub fn merge_animations(mut self, merge: bool) -> Self {
        self.merge_animations = merge;
        self
    }

    pub fn ignore_unknown_material_error(mut self, ignore: bool) -> Self {
        self.ignore_unknown_material_error = ignore;
        self
    }

    pub fn anims(mut self, anims: Vec<Arc<Animation>>) -> Self {
        self.anims = Some(anims);
        self
    }

    pub fn on_parse_end(mut self, hook: impl Fn(&mut GltfSerializer) + Send + Sync + 'static) -> Self {
        self.on_parse_end = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportConfig")
            .field("camera", &self.camera)
            .field("merge_animations", &self.merge_animations)
            .field("ignore_unknown_material_error", &self.ignore_unknown_material_error)
            .field("generator", &self.generator)
            .field("copyright", &self.copyright)
            .field("anims", &self.anims.as_ref().map(Vec::len))
            .field("on_parse_end", &self.on_parse_end.is_some())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load an export config from a TOML file; missing keys take their defaults
pub fn load_config(path: &Path) -> Result<ExportConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ExportConfig::default();
        assert!(!config.camera);
        assert!(config.merge_animations);
        assert!(config.ignore_unknown_material_error);
        assert!(config.generator.starts_with("gltf-serializer"));
        assert!(config.anims.is_none());
        assert!(config.on_parse_end.is_none());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: ExportConfig = toml::from_str("").unwrap();
        assert!(!config.camera);
        assert!(config.merge_animations);
        assert_eq!(config.copyright, "gltf-serializer");
    }

    #[test]
    fn test_config_deserialize_partial() {
        let toml_str = r#"
camera = true
merge_animations = false
copyright = "ACME"
"#;
        let config: ExportConfig = toml::from_str(toml_str).unwrap();
        assert!(config.camera);
        assert!(!config.merge_animations);
        assert!(config.ignore_unknown_material_error); // default
        assert_eq!(config.copyright, "ACME");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        std::fs::write(&path, "ignore_unknown_material_error = false\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(!config.ignore_unknown_material_error);

        std::fs::write(&path, "camera = \"yes\"\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_serialize_skips_runtime_fields() {
        let config = ExportConfig::default().on_parse_end(|_| {});
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("merge_animations = true"));
        assert!(!toml_str.contains("on_parse_end"));
    }
}
