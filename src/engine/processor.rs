//! Raster image operations behind the protected endpoints

use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage, ImageError, Luma, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::filter::gaussian_blur_f32;
use rusttype::{Font, Scale};
use thiserror::Error;
use tracing::debug;

use super::format::{CropRect, Filter, OutputFormat, Watermark};

/// Largest accepted output edge, in pixels
pub const MAX_DIMENSION: u32 = 16_384;

/// DejaVu Sans, used for watermark text
const WATERMARK_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Image operation failures, split by who is at fault
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Bad upload or bad parameters; the caller can fix it
    #[error("{0}")]
    InvalidInput(String),
    /// The requested capability is not available in this build
    #[error("{0}")]
    Unavailable(String),
    #[error("Image processing failed: {0}")]
    Internal(String),
}

impl ProcessingError {
    pub(crate) fn from_encode(err: ImageError) -> Self {
        match err {
            ImageError::Unsupported(e) => ProcessingError::Unavailable(e.to_string()),
            ImageError::Parameter(e) => ProcessingError::InvalidInput(e.to_string()),
            ImageError::Limits(e) => ProcessingError::InvalidInput(e.to_string()),
            ImageError::Encoding(e) => ProcessingError::InvalidInput(e.to_string()),
            other => ProcessingError::Internal(other.to_string()),
        }
    }
}

/// An encoded result ready to send back
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decode -> transform -> encode operations
pub trait ImageProcessor: Send + Sync {
    fn resize(&self, data: &[u8], width: u32, height: u32, format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;

    fn crop(&self, data: &[u8], rect: CropRect, format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;

    fn crop_rounded(&self, data: &[u8], rect: CropRect, radius: u32, format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;

    fn convert(&self, data: &[u8], format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;

    fn filter(&self, data: &[u8], filter: Filter, format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;

    fn watermark(&self, data: &[u8], mark: &Watermark, format: OutputFormat) -> Result<ProcessedImage, ProcessingError>;
}

/// Future image enhancement (super-resolution and the like)
pub trait ImageEnhancer: Send + Sync {
    fn enhance(&self, data: &[u8], kind: &str) -> Result<ProcessedImage, ProcessingError>;
}

/// Enhancer used until a real model is wired in
#[derive(Debug, Default)]
pub struct NullEnhancer;

impl ImageEnhancer for NullEnhancer {
    fn enhance(&self, _data: &[u8], kind: &str) -> Result<ProcessedImage, ProcessingError> {
        Err(ProcessingError::Unavailable(format!(
            "Enhancement '{kind}' will be available in a future version."
        )))
    }
}

/// [`ImageProcessor`] backed by the `image` and `imageproc` crates
#[derive(Debug, Default)]
pub struct RasterProcessor;

impl RasterProcessor {
    pub fn new() -> Self {
        RasterProcessor
    }

    fn decode(data: &[u8]) -> Result<DynamicImage, ProcessingError> {
        if data.is_empty() {
            return Err(ProcessingError::InvalidInput("No file provided.".to_string()));
        }
        image::load_from_memory(data)
            .map_err(|_| ProcessingError::InvalidInput("Invalid image file.".to_string()))
    }

    fn finish(img: DynamicImage, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let (width, height) = img.dimensions();
        let bytes = format.encode(&img)?;

        debug!(width, height, format = %format, size = bytes.len(), "Encoded image");

        Ok(ProcessedImage {
            bytes,
            content_type: format.content_type(),
            width,
            height,
        })
    }

    fn crop_image(img: &DynamicImage, rect: CropRect) -> Result<DynamicImage, ProcessingError> {
        let (left, top, width, height) = rect.clamp_to(img.width(), img.height())?;
        Ok(img.crop_imm(left, top, width, height))
    }
}

impl ImageProcessor for RasterProcessor {
    fn resize(&self, data: &[u8], width: u32, height: u32, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(ProcessingError::InvalidInput(format!(
                "Width and height must be between 1 and {MAX_DIMENSION}."
            )));
        }
        let img = Self::decode(data)?;
        Self::finish(img.resize_exact(width, height, FilterType::Lanczos3), format)
    }

    fn crop(&self, data: &[u8], rect: CropRect, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let img = Self::decode(data)?;
        Self::finish(Self::crop_image(&img, rect)?, format)
    }

    fn crop_rounded(&self, data: &[u8], rect: CropRect, radius: u32, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let img = Self::decode(data)?;
        let mut cropped = Self::crop_image(&img, rect)?.to_rgba8();
        round_corners(&mut cropped, radius);
        Self::finish(DynamicImage::ImageRgba8(cropped), format)
    }

    fn convert(&self, data: &[u8], format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let img = Self::decode(data)?;
        Self::finish(img, format)
    }

    fn filter(&self, data: &[u8], filter: Filter, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let img = Self::decode(data)?;

        let filtered = match filter {
            Filter::Grayscale => img.grayscale(),
            Filter::Invert => {
                let mut img = img;
                img.invert();
                img
            }
            Filter::Blur { sigma } => {
                DynamicImage::ImageRgba8(gaussian_blur_f32(&img.to_rgba8(), sigma))
            }
        };

        Self::finish(filtered, format)
    }

    fn watermark(&self, data: &[u8], mark: &Watermark, format: OutputFormat) -> Result<ProcessedImage, ProcessingError> {
        let img = Self::decode(data)?;
        let font = Font::try_from_bytes(WATERMARK_FONT)
            .ok_or_else(|| ProcessingError::Internal("Watermark font could not be loaded".to_string()))?;

        let mut canvas = img.to_rgba8();
        stamp_text(&mut canvas, &font, mark);
        Self::finish(DynamicImage::ImageRgba8(canvas), format)
    }
}

/// Blend `mark` into the bottom-right corner of `img`.
///
/// Glyph coverage is rendered to a mask first, then white is mixed in at
/// `coverage * opacity`, so the result is a true translucent overlay.
fn stamp_text(img: &mut RgbaImage, font: &Font<'_>, mark: &Watermark) {
    let (width, height) = img.dimensions();
    let scale = Scale::uniform(mark.font_size);
    let (text_width, text_height) = text_size(scale, font, &mark.text);

    let margin = mark.margin as i32;
    let x = width as i32 - text_width - margin;
    let y = height as i32 - text_height - margin;

    let mut coverage = GrayImage::new(width, height);
    draw_text_mut(&mut coverage, Luma([255u8]), x, y, scale, font, &mark.text);

    for (pixel, cover) in img.pixels_mut().zip(coverage.pixels()) {
        let alpha = f32::from(cover.0[0]) / 255.0 * mark.opacity;
        if alpha <= 0.0 {
            continue;
        }
        for channel in &mut pixel.0[..3] {
            *channel = (f32::from(*channel) * (1.0 - alpha) + 255.0 * alpha).round() as u8;
        }
        let base = f32::from(pixel.0[3]);
        pixel.0[3] = (base + (255.0 - base) * alpha).round() as u8;
    }
}

/// Make everything outside a rounded rectangle transparent.
///
/// `radius` is clamped to half the shorter side. Edge pixels get partial
/// coverage so the curve is not jagged.
fn round_corners(img: &mut RgbaImage, radius: u32) {
    let (width, height) = img.dimensions();
    let radius = radius.min(width / 2).min(height / 2);
    if radius == 0 {
        return;
    }

    let r = radius as f32;
    let (w, h) = (width as f32, height as f32);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        // Pixel centre
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);

        let cx = if px < r { r } else if px > w - r { w - r } else { continue };
        let cy = if py < r { r } else if py > h - r { h - r } else { continue };

        let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
        let coverage = (r - distance + 0.5).clamp(0.0, 1.0);
        pixel.0[3] = (f32::from(pixel.0[3]) * coverage).round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        OutputFormat::Png.encode(&DynamicImage::ImageRgba8(img)).unwrap()
    }

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn test_resize() {
        let out = RasterProcessor::new()
            .resize(&png(40, 20), 10, 5, OutputFormat::Png)
            .unwrap();

        assert_eq!((out.width, out.height), (10, 5));
        assert_eq!(out.content_type, "image/png");
        assert_eq!(decode(&out.bytes).dimensions(), (10, 5));
    }

    #[test]
    fn test_resize_rejects_zero() {
        let err = RasterProcessor::new()
            .resize(&png(4, 4), 0, 5, OutputFormat::Png)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidInput(_)));
    }

    #[test]
    fn test_invalid_image() {
        let err = RasterProcessor::new()
            .convert(b"definitely not an image", OutputFormat::Png)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidInput(msg) if msg == "Invalid image file."));
    }

    #[test]
    fn test_crop_is_clamped() {
        let rect = CropRect { x: 30, y: 10, width: 100, height: 5 };
        let out = RasterProcessor::new()
            .crop(&png(40, 20), rect, OutputFormat::Png)
            .unwrap();
        assert_eq!((out.width, out.height), (10, 5));
    }

    #[test]
    fn test_crop_rounded_clears_corners() {
        let rect = CropRect { x: 0, y: 0, width: 20, height: 20 };
        let out = RasterProcessor::new()
            .crop_rounded(&png(20, 20), rect, 8, OutputFormat::Png)
            .unwrap();

        let img = decode(&out.bytes).to_rgba8();
        assert_eq!(img.get_pixel(0, 0).0[3], 0);
        assert_eq!(img.get_pixel(19, 19).0[3], 0);
        assert_eq!(img.get_pixel(10, 10).0[3], 255);
        assert_eq!(img.get_pixel(10, 0).0[3], 255);
    }

    #[test]
    fn test_convert_to_jpeg_drops_alpha() {
        let out = RasterProcessor::new()
            .convert(&png(8, 8), OutputFormat::Jpeg)
            .unwrap();
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn test_webp_output_is_unavailable() {
        let err = RasterProcessor::new()
            .convert(&png(8, 8), OutputFormat::WebP)
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Unavailable(_)));
    }

    #[test]
    fn test_filters() {
        let processor = RasterProcessor::new();

        let gray = processor.filter(&png(4, 4), Filter::Grayscale, OutputFormat::Png).unwrap();
        let px = decode(&gray.bytes).to_rgba8().get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);

        let inverted = processor.filter(&png(4, 4), Filter::Invert, OutputFormat::Png).unwrap();
        let px = decode(&inverted.bytes).to_rgba8().get_pixel(0, 0).0;
        assert_eq!(px, [55, 155, 205, 255]);

        let blurred = processor
            .filter(&png(16, 16), Filter::Blur { sigma: 2.0 }, OutputFormat::Png)
            .unwrap();
        assert_eq!((blurred.width, blurred.height), (16, 16));
    }

    #[test]
    fn test_sixteen_bit_png_converts_to_jpeg() {
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(4, 4, image::Rgb([512u16, 40000, 65535])));
        let source = OutputFormat::Png.encode(&img).unwrap();

        let out = RasterProcessor::new().convert(&source, OutputFormat::Jpeg).unwrap();
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!(decode(&out.bytes).color(), image::ColorType::Rgb8);
    }

    #[test]
    fn test_watermark_lands_bottom_right() {
        let black = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
        let source = OutputFormat::Png.encode(&DynamicImage::ImageRgba8(black)).unwrap();
        let mark = Watermark::new("Sample", 32.0, 1.0, 10).unwrap();

        let out = RasterProcessor::new().watermark(&source, &mark, OutputFormat::Png).unwrap();
        let img = decode(&out.bytes).to_rgba8();
        assert_eq!(img.dimensions(), (200, 100));

        let lit = |x0: u32, y0: u32, x1: u32, y1: u32| {
            (y0..y1)
                .flat_map(|y| (x0..x1).map(move |x| (x, y)))
                .filter(|&(x, y)| img.get_pixel(x, y).0[0] > 0)
                .count()
        };
        assert!(lit(100, 50, 200, 100) > 0);
        assert_eq!(lit(0, 0, 100, 50), 0);
        // Margin stays untouched
        assert_eq!(lit(195, 0, 200, 100), 0);
    }

    #[test]
    fn test_transparent_watermark_changes_nothing() {
        let source = png(64, 32);
        let mark = Watermark::new("Hidden", 20.0, 0.0, 2).unwrap();

        let out = RasterProcessor::new().watermark(&source, &mark, OutputFormat::Png).unwrap();
        assert_eq!(decode(&out.bytes).to_rgba8(), decode(&source).to_rgba8());
    }

    #[test]
    fn test_null_enhancer() {
        let err = NullEnhancer.enhance(&png(2, 2), "upscale").unwrap_err();
        assert!(matches!(err, ProcessingError::Unavailable(_)));
    }
}
