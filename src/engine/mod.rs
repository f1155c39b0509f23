//! Image processing engine
//!
//! This module contains the codec work behind the protected endpoints:
//! - Output format selection and encoding
//! - Resize, crop, rounded crop, convert and filter operations
//! - Enhancement placeholder reporting the capability as unavailable

mod format;
mod processor;

pub use format::{CropRect, Filter, OutputFormat, Watermark};
pub use processor::{
    ImageEnhancer, ImageProcessor, NullEnhancer, ProcessedImage, ProcessingError, RasterProcessor,
};
