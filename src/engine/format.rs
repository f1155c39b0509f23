//! Output encodings and request-level parameters

use image::{ColorType, DynamicImage, ImageOutputFormat};
use std::fmt;
use std::str::FromStr;

use super::processor::ProcessingError;

/// JPEG quality used for every lossy encode
pub const JPEG_QUALITY: u8 = 90;

/// Encodings a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Ico,
    Tiff,
    /// Recognised, but no encoder is compiled in
    WebP,
    Avif,
    Heif,
}

impl OutputFormat {
    /// MIME type for the encoded bytes
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Bmp => "image/bmp",
            OutputFormat::Ico => "image/x-icon",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::WebP => "image/webp",
            OutputFormat::Avif => "image/avif",
            OutputFormat::Heif => "image/heif",
        }
    }

    /// Encode `img`, converting pixel layout where the codec needs it
    pub(crate) fn encode(&self, img: &DynamicImage) -> Result<Vec<u8>, ProcessingError> {
        let target = match self {
            OutputFormat::Png => ImageOutputFormat::Png,
            OutputFormat::Jpeg => ImageOutputFormat::Jpeg(JPEG_QUALITY),
            OutputFormat::Gif => ImageOutputFormat::Gif,
            OutputFormat::Bmp => ImageOutputFormat::Bmp,
            OutputFormat::Ico => ImageOutputFormat::Ico,
            OutputFormat::Tiff => ImageOutputFormat::Tiff,
            OutputFormat::WebP | OutputFormat::Avif | OutputFormat::Heif => {
                return Err(ProcessingError::Unavailable(format!(
                    "The {self} codec isn't available."
                )));
            }
        };

        let normalized = self.normalize(img);
        let img = normalized.as_ref().unwrap_or(img);

        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, target).map_err(ProcessingError::from_encode)?;
        Ok(buf.into_inner())
    }

    /// 8-bit copy of `img` when this codec cannot take its pixel layout
    fn normalize(&self, img: &DynamicImage) -> Option<DynamicImage> {
        let color = img.color();
        let eight_bit = color.bytes_per_pixel() == color.channel_count();
        let float = matches!(color, ColorType::Rgb32F | ColorType::Rgba32F);
        // PNG and TIFF keep 16-bit samples
        let wide_ok = matches!(self, OutputFormat::Png | OutputFormat::Tiff) && !float;

        match self {
            // JPEG has no alpha channel
            OutputFormat::Jpeg if color.has_alpha() || !eight_bit => {
                Some(DynamicImage::ImageRgb8(img.to_rgb8()))
            }
            OutputFormat::Gif if color != ColorType::Rgba8 => {
                Some(DynamicImage::ImageRgba8(img.to_rgba8()))
            }
            _ if eight_bit || wide_ok => None,
            _ if color.has_alpha() => Some(DynamicImage::ImageRgba8(img.to_rgba8())),
            _ => Some(DynamicImage::ImageRgb8(img.to_rgb8())),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "gif" => Ok(OutputFormat::Gif),
            "bmp" => Ok(OutputFormat::Bmp),
            "ico" => Ok(OutputFormat::Ico),
            "tif" | "tiff" => Ok(OutputFormat::Tiff),
            "webp" => Ok(OutputFormat::WebP),
            "avif" => Ok(OutputFormat::Avif),
            "heif" | "heic" => Ok(OutputFormat::Heif),
            _ => Err(ProcessingError::InvalidInput(format!("Unsupported format: {s}"))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Ico => "ico",
            OutputFormat::Tiff => "tiff",
            OutputFormat::WebP => "webp",
            OutputFormat::Avif => "avif",
            OutputFormat::Heif => "heif",
        };
        f.write_str(name)
    }
}

/// Region to cut out of a source image, in source pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CropRect {
    /// Clamp to an image of `img_width` x `img_height`.
    ///
    /// Returns `(left, top, width, height)`; an empty intersection is an error.
    pub fn clamp_to(&self, img_width: u32, img_height: u32) -> Result<(u32, u32, u32, u32), ProcessingError> {
        let out_of_bounds = || ProcessingError::InvalidInput("Crop rectangle is out of bounds.".to_string());

        if img_width == 0 || img_height == 0 {
            return Err(out_of_bounds());
        }
        let (w, h) = (i64::from(img_width), i64::from(img_height));
        let (x, y) = (i64::from(self.x), i64::from(self.y));

        let left = x.clamp(0, w - 1);
        let top = y.clamp(0, h - 1);
        let right = (x + i64::from(self.width)).clamp(1, w);
        let bottom = (y + i64::from(self.height)).clamp(1, h);

        if right <= left || bottom <= top {
            return Err(out_of_bounds());
        }

        Ok((left as u32, top as u32, (right - left) as u32, (bottom - top) as u32))
    }
}

/// Pixel filters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    Grayscale,
    Invert,
    Blur { sigma: f32 },
}

/// Blur strength when none is given
pub const DEFAULT_BLUR_SIGMA: f32 = 5.0;

/// Strongest accepted blur. The kernel grows linearly with sigma.
pub const MAX_BLUR_SIGMA: f32 = 100.0;

impl Filter {
    pub fn parse(kind: &str, intensity: Option<f32>) -> Result<Self, ProcessingError> {
        match kind.to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" => Ok(Filter::Grayscale),
            "invert" => Ok(Filter::Invert),
            "blur" => {
                let sigma = intensity.unwrap_or(DEFAULT_BLUR_SIGMA);
                if !sigma.is_finite() || sigma <= 0.0 || sigma > MAX_BLUR_SIGMA {
                    return Err(ProcessingError::InvalidInput(format!(
                        "Blur intensity must be greater than 0 and at most {MAX_BLUR_SIGMA}."
                    )));
                }
                Ok(Filter::Blur { sigma })
            }
            _ => Err(ProcessingError::InvalidInput(format!("Unsupported filter: {kind}"))),
        }
    }
}

/// Largest watermark font size, in pixels
pub const MAX_WATERMARK_FONT_SIZE: f32 = 512.0;
/// Largest gap kept between the watermark and the image edge
pub const MAX_WATERMARK_MARGIN: u32 = 4096;

/// Text stamped in white in the bottom-right corner
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub text: String,
    pub font_size: f32,
    /// 0 is invisible, 1 is solid
    pub opacity: f32,
    pub margin: u32,
}

impl Watermark {
    pub fn new(text: &str, font_size: f32, opacity: f32, margin: u32) -> Result<Self, ProcessingError> {
        if text.trim().is_empty() {
            return Err(ProcessingError::InvalidInput("Watermark text is required.".to_string()));
        }
        if !font_size.is_finite() || font_size < 1.0 || font_size > MAX_WATERMARK_FONT_SIZE {
            return Err(ProcessingError::InvalidInput(format!(
                "Font size must be between 1 and {MAX_WATERMARK_FONT_SIZE}."
            )));
        }
        if !(0.0..=1.0).contains(&opacity) {
            return Err(ProcessingError::InvalidInput(
                "Opacity must be between 0 and 1.".to_string(),
            ));
        }
        if margin > MAX_WATERMARK_MARGIN {
            return Err(ProcessingError::InvalidInput(format!(
                "Margin must be at most {MAX_WATERMARK_MARGIN}."
            )));
        }

        Ok(Self { text: text.to_string(), font_size, opacity, margin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("PNG".parse::<OutputFormat>().unwrap(), OutputFormat::Png);
        assert_eq!("jpg".parse::<OutputFormat>().unwrap(), OutputFormat::Jpeg);
        assert_eq!("ico".parse::<OutputFormat>().unwrap().content_type(), "image/x-icon");
        assert!(matches!(
            "psd".parse::<OutputFormat>(),
            Err(ProcessingError::InvalidInput(msg)) if msg == "Unsupported format: psd"
        ));
    }

    #[test]
    fn test_crop_rect_clamps_to_image() {
        let rect = CropRect { x: -10, y: 5, width: 50, height: 500 };
        assert_eq!(rect.clamp_to(100, 80).unwrap(), (0, 5, 40, 75));
    }

    #[test]
    fn test_crop_rect_outside_image() {
        let rect = CropRect { x: 10, y: 10, width: 0, height: 10 };
        assert!(matches!(rect.clamp_to(100, 100), Err(ProcessingError::InvalidInput(_))));
    }

    #[test]
    fn test_filter_parsing() {
        assert_eq!(Filter::parse("blur", None).unwrap(), Filter::Blur { sigma: DEFAULT_BLUR_SIGMA });
        assert_eq!(Filter::parse("Invert", Some(3.0)).unwrap(), Filter::Invert);
        assert!(Filter::parse("blur", Some(0.0)).is_err());
        assert!(Filter::parse("sepia", None).is_err());
    }

    #[test]
    fn test_watermark_validation() {
        let mark = Watermark::new("© me", 24.0, 0.5, 10).unwrap();
        assert_eq!(mark.text, "© me");

        assert!(Watermark::new("  ", 24.0, 0.5, 10).is_err());
        assert!(Watermark::new("x", 0.0, 0.5, 10).is_err());
        assert!(Watermark::new("x", 10_000.0, 0.5, 10).is_err());
        assert!(Watermark::new("x", 24.0, 1.5, 10).is_err());
        assert!(Watermark::new("x", 24.0, f32::NAN, 10).is_err());
        assert!(Watermark::new("x", 24.0, 0.5, u32::MAX).is_err());
    }

    #[test]
    fn test_blur_intensity_is_capped() {
        assert_eq!(
            Filter::parse("blur", Some(MAX_BLUR_SIGMA)).unwrap(),
            Filter::Blur { sigma: MAX_BLUR_SIGMA }
        );
        assert!(matches!(
            Filter::parse("blur", Some(1e9)),
            Err(ProcessingError::InvalidInput(_))
        ));
        assert!(Filter::parse("blur", Some(f32::INFINITY)).is_err());
    }

    #[test]
    fn test_sixteen_bit_images_encode_everywhere() {
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::from_pixel(4, 4, image::Rgb([1000u16, 30000, 65535])));

        for format in [OutputFormat::Jpeg, OutputFormat::Bmp, OutputFormat::Ico, OutputFormat::Gif] {
            let bytes = format.encode(&img).unwrap_or_else(|e| panic!("{format}: {e}"));
            let decoded = image::load_from_memory(&bytes).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (4, 4));
        }

        // PNG keeps the wide samples
        let png = OutputFormat::Png.encode(&img).unwrap();
        assert_eq!(image::load_from_memory(&png).unwrap().color(), ColorType::Rgb16);
    }
}
