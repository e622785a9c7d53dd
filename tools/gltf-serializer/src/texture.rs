//! Textures, sampler mapping and fallback rasterization
//!
//! A texture normally already knows where its pixels live (a lazily loaded
//! URL, the image it was created from, or an attached image). When none of
//! those exist the texture is drawn into an offscreen target through a
//! [`RenderDevice`] and embedded as a PNG data URI.

use std::sync::{Arc, Mutex};

use gltf_json as json;
use gltf_json::texture::{MagFilter, MinFilter, WrappingMode};
use gltf_json::validation::Checked::Valid;
use image::{ExtendedColorType, ImageEncoder};
use image::codecs::png::PngEncoder;

use crate::error::{Result, SerializeError};
use crate::utils::data_uri;

/// Side length of the offscreen target when a texture has no size
pub const DEFAULT_RASTER_SIZE: u32 = 512;

/// GL sampler enums as stored on source textures
pub mod gl {
    pub const NEAREST: u32 = 9728;
    pub const LINEAR: u32 = 9729;
    pub const NEAREST_MIPMAP_NEAREST: u32 = 9984;
    pub const LINEAR_MIPMAP_NEAREST: u32 = 9985;
    pub const NEAREST_MIPMAP_LINEAR: u32 = 9986;
    pub const LINEAR_MIPMAP_LINEAR: u32 = 9987;
    pub const REPEAT: u32 = 10497;
    pub const CLAMP_TO_EDGE: u32 = 33071;
    pub const MIRRORED_REPEAT: u32 = 33648;
}

/// Source texture
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: Option<String>,
    /// Deferred load URL
    pub lazy_src: Option<String>,
    /// Source of the image the texture was created from
    pub origin_image_src: Option<String>,
    /// Source of the currently attached image
    pub image_src: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// UV set the texture samples with
    pub uv: u32,
    pub mag_filter: u32,
    pub min_filter: u32,
    pub wrap_s: u32,
    pub wrap_t: u32,
}

impl Default for Texture {
    fn default() -> Self {
        Self {
            name: None,
            lazy_src: None,
            origin_image_src: None,
            image_src: None,
            width: None,
            height: None,
            uv: 0,
            mag_filter: gl::LINEAR,
            min_filter: gl::LINEAR_MIPMAP_LINEAR,
            wrap_s: gl::REPEAT,
            wrap_t: gl::REPEAT,
        }
    }
}

impl Texture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn lazy_src(mut self, src: impl Into<String>) -> Self {
        self.lazy_src = Some(src.into());
        self
    }

    pub fn origin_image_src(mut self, src: impl Into<String>) -> Self {
        self.origin_image_src = Some(src.into());
        self
    }

    pub fn image_src(mut self, src: impl Into<String>) -> Self {
        self.image_src = Some(src.into());
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn uv(mut self, uv: u32) -> Self {
        self.uv = uv;
        self
    }

    pub fn filters(mut self, mag: u32, min: u32) -> Self {
        self.mag_filter = mag;
        self.min_filter = min;
        self
    }

    pub fn wrap(mut self, s: u32, t: u32) -> Self {
        self.wrap_s = s;
        self.wrap_t = t;
        self
    }

    pub fn build(self) -> Arc<Texture> {
        Arc::new(self)
    }

    /// Existing image source: lazy, then original, then attached
    pub fn source(&self) -> Option<&str> {
        self.lazy_src
            .as_deref()
            .or(self.origin_image_src.as_deref())
            .or(self.image_src.as_deref())
    }

    /// glTF sampler for this texture's GL parameters; unknown codes are omitted
    pub fn sampler(&self) -> json::texture::Sampler {
        json::texture::Sampler {
            mag_filter: mag_filter(self.mag_filter).map(Valid),
            min_filter: min_filter(self.min_filter).map(Valid),
            wrap_s: Valid(wrapping_mode(self.wrap_s).unwrap_or_default()),
            wrap_t: Valid(wrapping_mode(self.wrap_t).unwrap_or_default()),
            ..Default::default()
        }
    }
}

fn mag_filter(code: u32) -> Option<MagFilter> {
    match code {
        gl::NEAREST => Some(MagFilter::Nearest),
        gl::LINEAR => Some(MagFilter::Linear),
        _ => None,
    }
}

fn min_filter(code: u32) -> Option<MinFilter> {
    match code {
        gl::NEAREST => Some(MinFilter::Nearest),
        gl::LINEAR => Some(MinFilter::Linear),
        gl::NEAREST_MIPMAP_NEAREST => Some(MinFilter::NearestMipmapNearest),
        gl::LINEAR_MIPMAP_NEAREST => Some(MinFilter::LinearMipmapNearest),
        gl::NEAREST_MIPMAP_LINEAR => Some(MinFilter::NearestMipmapLinear),
        gl::LINEAR_MIPMAP_LINEAR => Some(MinFilter::LinearMipmapLinear),
        _ => None,
    }
}

fn wrapping_mode(code: u32) -> Option<WrappingMode> {
    match code {
        gl::REPEAT => Some(WrappingMode::Repeat),
        gl::CLAMP_TO_EDGE => Some(WrappingMode::ClampToEdge),
        gl::MIRRORED_REPEAT => Some(WrappingMode::MirroredRepeat),
        _ => None,
    }
}

/// Errors reported by a render device
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render device error: {0}")]
    Device(String),

    #[error("readback returned {actual} bytes, expected {expected}")]
    PixelCount { expected: usize, actual: usize },

    #[error("render device lock poisoned")]
    Poisoned,
}

/// Offscreen render target created by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetHandle(pub u64);

/// Full-screen quad created by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadHandle(pub u64);

/// Host GPU access used to rasterize textures without an image source
pub trait RenderDevice: Send {
    fn create_render_target(&mut self) -> std::result::Result<RenderTargetHandle, RenderError>;

    fn create_screen_quad(&mut self) -> std::result::Result<QuadHandle, RenderError>;

    /// Bind `target` resized to `width` x `height`
    fn bind_target(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> std::result::Result<(), RenderError>;

    /// Draw `texture` over the whole bound target
    fn draw_textured_quad(
        &mut self,
        quad: QuadHandle,
        texture: &Texture,
    ) -> std::result::Result<(), RenderError>;

    /// Read back RGBA8 pixels, bottom row first
    fn read_pixels(
        &mut self,
        target: RenderTargetHandle,
        width: u32,
        height: u32,
    ) -> std::result::Result<Vec<u8>, RenderError>;

    fn unbind(&mut self, target: RenderTargetHandle) -> std::result::Result<(), RenderError>;
}

/// Render device shared between exporter and serializers
pub type SharedRenderDevice = Arc<Mutex<dyn RenderDevice>>;

/// Reverse the row order of a tightly packed image
pub fn flip_rows(pixels: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = pixels.len() / row_bytes;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (head, tail) = pixels.split_at_mut(bottom * row_bytes);
        head[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut tail[..row_bytes]);
    }
}

/// Encode top-down RGBA8 pixels as a PNG data URI
pub fn encode_png_data_uri(pixels: &[u8], width: u32, height: u32) -> Result<String> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png).write_image(pixels, width, height, ExtendedColorType::Rgba8)?;
    Ok(data_uri("image/png", &png))
}

/// Draws textures through a render device.
///
/// The render target and quad are created on first use and reused for every
/// later texture.
pub struct Rasterizer {
    device: Option<SharedRenderDevice>,
    resources: Option<(RenderTargetHandle, QuadHandle)>,
}

impl Rasterizer {
    pub fn new(device: Option<SharedRenderDevice>) -> Self {
        Self {
            device,
            resources: None,
        }
    }

    /// Rasterize `texture` into a PNG data URI
    pub fn rasterize(&mut self, texture: &Texture) -> Result<String> {
        let shared = self
            .device
            .as_ref()
            .ok_or_else(|| SerializeError::MissingRenderDevice {
                texture: texture.name.clone(),
            })?;

        let width = texture.width.filter(|&w| w > 0).unwrap_or(DEFAULT_RASTER_SIZE);
        let height = texture.height.filter(|&h| h > 0).unwrap_or(DEFAULT_RASTER_SIZE);

        let mut pixels = {
            let mut device = shared.lock().map_err(|_| RenderError::Poisoned)?;

            let (target, quad) = match self.resources {
                Some(resources) => resources,
                None => {
                    let resources = (device.create_render_target()?, device.create_screen_quad()?);
                    self.resources = Some(resources);
                    resources
                }
            };

            device.bind_target(target, width, height)?;
            let drawn = device
                .draw_textured_quad(quad, texture)
                .and_then(|_| device.read_pixels(target, width, height));
            device.unbind(target)?;
            drawn?
        };

        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::PixelCount {
                expected,
                actual: pixels.len(),
            }
            .into());
        }

        flip_rows(&mut pixels, width as usize * 4);
        tracing::debug!(
            "rasterized texture {:?} at {}x{}",
            texture.name,
            width,
            height
        );
        encode_png_data_uri(&pixels, width, height)
    }
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("device", &self.device.is_some())
            .field("resources", &self.resources)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    /// Device that fills row `y` (bottom-up) with the value `y`
    #[derive(Default)]
    pub(crate) struct MockDevice {
        pub targets_created: usize,
        pub quads_created: usize,
        pub draws: Vec<Option<String>>,
        pub bound: bool,
    }

    impl RenderDevice for MockDevice {
        fn create_render_target(&mut self) -> std::result::Result<RenderTargetHandle, RenderError> {
            self.targets_created += 1;
            Ok(RenderTargetHandle(1))
        }

        fn create_screen_quad(&mut self) -> std::result::Result<QuadHandle, RenderError> {
            self.quads_created += 1;
            Ok(QuadHandle(2))
        }

        fn bind_target(
            &mut self,
            _target: RenderTargetHandle,
            _width: u32,
            _height: u32,
        ) -> std::result::Result<(), RenderError> {
            self.bound = true;
            Ok(())
        }

        fn draw_textured_quad(
            &mut self,
            _quad: QuadHandle,
            texture: &Texture,
        ) -> std::result::Result<(), RenderError> {
            self.draws.push(texture.name.clone());
            Ok(())
        }

        fn read_pixels(
            &mut self,
            _target: RenderTargetHandle,
            width: u32,
            height: u32,
        ) -> std::result::Result<Vec<u8>, RenderError> {
            let mut pixels = Vec::new();
            for y in 0..height {
                pixels.extend(std::iter::repeat_n(y as u8, width as usize * 4));
            }
            Ok(pixels)
        }

        fn unbind(&mut self, _target: RenderTargetHandle) -> std::result::Result<(), RenderError> {
            self.bound = false;
            Ok(())
        }
    }

    fn decode(uri: &str) -> image::RgbaImage {
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let png = STANDARD.decode(payload).unwrap();
        image::load_from_memory(&png).unwrap().to_rgba8()
    }

    #[test]
    fn test_source_resolution_order() {
        let texture = Texture::new().image_src("attached.png");
        assert_eq!(texture.source(), Some("attached.png"));

        let texture = texture.origin_image_src("origin.png");
        assert_eq!(texture.source(), Some("origin.png"));

        let texture = texture.lazy_src("lazy.png");
        assert_eq!(texture.source(), Some("lazy.png"));

        assert_eq!(Texture::new().source(), None);
    }

    #[test]
    fn test_sampler_mapping() {
        let texture = Texture::new()
            .filters(gl::NEAREST, 1234)
            .wrap(gl::CLAMP_TO_EDGE, gl::MIRRORED_REPEAT);
        let sampler = texture.sampler();

        assert_eq!(sampler.mag_filter, Some(Valid(MagFilter::Nearest)));
        assert_eq!(sampler.min_filter, None);
        assert_eq!(sampler.wrap_s, Valid(WrappingMode::ClampToEdge));
        assert_eq!(sampler.wrap_t, Valid(WrappingMode::MirroredRepeat));
    }

    #[test]
    fn test_flip_rows() {
        let mut pixels = vec![1, 1, 2, 2, 3, 3];
        flip_rows(&mut pixels, 2);
        assert_eq!(pixels, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn test_rasterize_flips_to_top_down() {
        let device = Arc::new(Mutex::new(MockDevice::default()));
        let mut rasterizer = Rasterizer::new(Some(device.clone()));

        let uri = rasterizer
            .rasterize(&Texture::new().name("gradient").size(2, 3))
            .unwrap();
        let image = decode(&uri);

        assert_eq!(image.dimensions(), (2, 3));
        // Bottom-up row 2 is the top row of the PNG
        assert_eq!(image.get_pixel(0, 0).0, [2, 2, 2, 2]);
        assert_eq!(image.get_pixel(1, 2).0, [0, 0, 0, 0]);

        let device = device.lock().unwrap();
        assert_eq!(device.draws, vec![Some("gradient".to_string())]);
        assert!(!device.bound);
    }

    #[test]
    fn test_rasterizer_resources_created_once() {
        let device = Arc::new(Mutex::new(MockDevice::default()));
        let mut rasterizer = Rasterizer::new(Some(device.clone()));

        rasterizer.rasterize(&Texture::new().size(4, 4)).unwrap();
        rasterizer.rasterize(&Texture::new().size(8, 2)).unwrap();

        let device = device.lock().unwrap();
        assert_eq!(device.targets_created, 1);
        assert_eq!(device.quads_created, 1);
        assert_eq!(device.draws.len(), 2);
    }

    #[test]
    fn test_default_raster_size() {
        let device = Arc::new(Mutex::new(MockDevice::default()));
        let mut rasterizer = Rasterizer::new(Some(device));
        let image = decode(&rasterizer.rasterize(&Texture::new()).unwrap());
        assert_eq!(image.dimensions(), (DEFAULT_RASTER_SIZE, DEFAULT_RASTER_SIZE));
    }

    #[test]
    fn test_missing_device() {
        let mut rasterizer = Rasterizer::new(None);
        let result = rasterizer.rasterize(&Texture::new().name("orphan"));
        assert!(matches!(
            result,
            Err(SerializeError::MissingRenderDevice { texture: Some(ref name) }) if name == "orphan"
        ));
    }
}
