//! Slide rendering seam
//!
//! Drawing slide content is done elsewhere; this module defines the callback
//! the live core needs from it, the raster surface it hands back, and
//! thumbnail generation on top of it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid surface size {0}x{1}")]
    InvalidSize(u32, u32),

    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Renderer failed: {0}")]
    Renderer(String),

    #[error("PNG encode error: {0}")]
    Encode(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Width / height of a slide
pub const SLIDE_ASPECT: f64 = 16.0 / 9.0;

/// One visual layer of a slide; opaque to this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub properties: serde_json::Map<String, Value>,
}

/// Slide-wide image adjustments, each in `-100..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Adjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Device pixels per logical pixel
    pub pixel_ratio: f32,
}

impl RenderOptions {
    /// Options for a slide-shaped surface `width` pixels wide
    pub fn for_width(width: u32) -> Self {
        let height = ((f64::from(width) / SLIDE_ASPECT).round() as u32).max(1);
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: String,
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub adjustments: Adjustments,
}

/// A flat RGBA8 raster. The buffer always holds `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RasterSurface {
    /// Fully transparent surface
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        Self::filled(width, height, [0, 0, 0, 0])
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> RenderResult<Self> {
        let len = buffer_len(width, height)?;
        let pixels = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> RenderResult<Self> {
        let expected = buffer_len(width, height)?;
        if pixels.len() != expected {
            return Err(RenderError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable view for painting in place; the length is fixed
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.pixels.get(offset..offset + 4)?;
        let mut rgba = [0; 4];
        rgba.copy_from_slice(bytes);
        Some(rgba)
    }

    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, self.width, self.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        writer
            .write_image_data(&self.pixels)
            .map_err(|e| RenderError::Encode(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(out)
    }
}

fn buffer_len(width: u32, height: u32) -> RenderResult<usize> {
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidSize(width, height));
    }
    Ok(width as usize * height as usize * 4)
}

/// The slide-rendering subsystem, consumed as a callback
pub trait SlideRenderer: Send + Sync {
    fn render_slide_to_surface(
        &self,
        layers: &[Layer],
        adjustments: &Adjustments,
        options: &RenderOptions,
    ) -> RenderResult<RasterSurface>;
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub slide_id: String,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Render a PNG thumbnail per slide. Slides that fail to render are skipped.
pub fn render_thumbnails(
    renderer: &dyn SlideRenderer,
    slides: &[Slide],
    width: u32,
) -> Vec<Thumbnail> {
    let options = RenderOptions::for_width(width);
    let mut thumbnails = Vec::with_capacity(slides.len());

    for slide in slides {
        let result = renderer
            .render_slide_to_surface(&slide.layers, &slide.adjustments, &options)
            .and_then(|surface| {
                let png = surface.encode_png()?;
                Ok((surface, png))
            });

        match result {
            Ok((surface, png)) => thumbnails.push(Thumbnail {
                slide_id: slide.id.clone(),
                width: surface.width(),
                height: surface.height(),
                png,
            }),
            Err(e) => tracing::warn!("Skipping thumbnail for slide {}: {}", slide.id, e),
        }
    }

    tracing::debug!("Rendered {}/{} thumbnails", thumbnails.len(), slides.len());
    thumbnails
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paints each surface a solid color; fails on slides with no layers
    struct SolidRenderer;

    impl SlideRenderer for SolidRenderer {
        fn render_slide_to_surface(
            &self,
            layers: &[Layer],
            _adjustments: &Adjustments,
            options: &RenderOptions,
        ) -> RenderResult<RasterSurface> {
            if layers.is_empty() {
                return Err(RenderError::Renderer("empty slide".to_string()));
            }
            RasterSurface::filled(options.width, options.height, [255, 0, 0, 255])
        }
    }

    fn slide(id: &str, layer_count: usize) -> Slide {
        Slide {
            id: id.to_string(),
            layers: (0..layer_count)
                .map(|i| Layer {
                    id: format!("{}-{}", id, i),
                    kind: "text".to_string(),
                    properties: serde_json::Map::new(),
                })
                .collect(),
            adjustments: Adjustments::default(),
        }
    }

    #[test]
    fn test_slide_aspect() {
        let options = RenderOptions::for_width(320);
        assert_eq!(options.height, 180);
    }

    #[test]
    fn test_buffer_checks() {
        assert!(matches!(
            RasterSurface::new(0, 10),
            Err(RenderError::InvalidSize(0, 10))
        ));
        assert!(matches!(
            RasterSurface::from_rgba(2, 2, vec![0; 15]),
            Err(RenderError::BufferSize {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn test_painting_in_place() {
        let mut surface = RasterSurface::new(2, 2).unwrap();
        surface.pixels_mut()[12..16].copy_from_slice(&[1, 2, 3, 4]);

        assert_eq!(surface.pixel(1, 1), Some([1, 2, 3, 4]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixels().len(), 16);
        assert_eq!(surface.into_pixels().len(), 16);
    }

    #[test]
    fn test_png_output_decodes() {
        let surface = RasterSurface::filled(4, 3, [10, 20, 30, 255]).unwrap();
        assert_eq!(surface.pixel(3, 2), Some([10, 20, 30, 255]));
        assert_eq!(surface.pixel(4, 0), None);

        let bytes = surface.encode_png().unwrap();
        let decoder = png::Decoder::new(bytes.as_slice());
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().width, 4);
        assert_eq!(reader.info().height, 3);
    }

    #[test]
    fn test_failed_slides_skipped() {
        let slides = vec![slide("a", 2), slide("b", 0), slide("c", 1)];
        let thumbnails = render_thumbnails(&SolidRenderer, &slides, 160);

        let ids: Vec<_> = thumbnails.iter().map(|t| t.slide_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(thumbnails[0].height, 90);
        assert!(thumbnails[0].png.starts_with(&[0x89, b'P', b'N', b'G']));
    }
}
