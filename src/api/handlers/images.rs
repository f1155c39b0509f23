//! Image processing endpoints
//!
//! Each endpoint takes the source image as the raw request body and its
//! parameters from the query string, e.g.
//! `POST /api/v1/images/resize?width=200&height=100&fmt=png`.

use actix_web::{http::StatusCode, web, HttpResponse};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::engine::{CropRect, Filter, ImageProcessor, OutputFormat, ProcessedImage, ProcessingError, Watermark};
use crate::AppState;

/// Error response
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ApiError,
}

#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

fn default_fmt() -> String { "png".to_string() }

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ResizeQuery {
    pub width: u32,
    pub height: u32,
    /// Output format (png, jpg, gif, bmp, ico, tiff)
    #[serde(default = "default_fmt")]
    pub fmt: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CropQuery {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Corner radius, rounded crop only
    #[serde(default)]
    pub radius: u32,
    #[serde(default = "default_fmt")]
    pub fmt: String,
}

impl CropQuery {
    fn rect(&self) -> CropRect {
        CropRect { x: self.x, y: self.y, width: self.width, height: self.height }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConvertQuery {
    pub fmt: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FilterQuery {
    /// grayscale, invert or blur
    #[serde(rename = "type")]
    pub kind: String,
    /// Blur sigma (default 5)
    pub intensity: Option<f32>,
    #[serde(default = "default_fmt")]
    pub fmt: String,
}

fn default_font_size() -> f32 { 24.0 }
fn default_opacity() -> f32 { 0.5 }
fn default_margin() -> u32 { 10 }

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WatermarkQuery {
    pub text: String,
    /// Text height in pixels (default 24)
    #[serde(default = "default_font_size", alias = "fontSize")]
    pub font_size: f32,
    /// 0 to 1 (default 0.5)
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Gap to the bottom-right edges in pixels (default 10)
    #[serde(default = "default_margin")]
    pub margin: u32,
    #[serde(default = "default_fmt")]
    pub fmt: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EnhanceQuery {
    #[serde(rename = "type")]
    pub kind: String,
}

fn error_response(err: &ProcessingError) -> HttpResponse {
    let (status, code) = match err {
        ProcessingError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        ProcessingError::Unavailable(_) => (StatusCode::NOT_IMPLEMENTED, "CAPABILITY_UNAVAILABLE"),
        ProcessingError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_FAILED"),
    };

    HttpResponse::build(status).json(ErrorResponse {
        success: false,
        error: ApiError {
            code: code.to_string(),
            message: err.to_string(),
        },
    })
}

/// Run a processing job on the blocking pool and render the outcome
async fn process<F>(operation: &'static str, processor: Arc<dyn ImageProcessor>, body: Bytes, job: F) -> HttpResponse
where
    F: FnOnce(&dyn ImageProcessor, &[u8]) -> Result<ProcessedImage, ProcessingError> + Send + 'static,
{
    let start = Instant::now();
    let input_size = body.len();

    match web::block(move || job(processor.as_ref(), &body)).await {
        Ok(Ok(image)) => {
            info!(
                operation,
                input_size,
                output_size = image.bytes.len(),
                width = image.width,
                height = image.height,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Image processed"
            );
            HttpResponse::Ok().content_type(image.content_type).body(image.bytes)
        }
        Ok(Err(e)) => {
            match &e {
                ProcessingError::Internal(_) => error!(operation, error = %e, "Image processing failed"),
                _ => warn!(operation, error = %e, "Image request rejected"),
            }
            error_response(&e)
        }
        Err(e) => {
            error!(operation, error = %e, "Blocking task failed");
            error_response(&ProcessingError::Internal(e.to_string()))
        }
    }
}

fn parse_format(fmt: &str) -> Result<OutputFormat, HttpResponse> {
    fmt.parse::<OutputFormat>().map_err(|e| error_response(&e))
}

/// POST /api/v1/images/resize - Resize to exact dimensions
#[utoipa::path(
    post,
    path = "/api/v1/images/resize",
    tag = "images",
    params(ResizeQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Resized image"),
        (status = 400, description = "Invalid image or parameters", body = ErrorResponse),
        (status = 429, description = "Rate limited or daily quota exceeded"),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn resize(state: web::Data<AppState>, query: web::Query<ResizeQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let (width, height) = (query.width, query.height);

    process("resize", state.processor.clone(), body, move |p, data| {
        p.resize(data, width, height, format)
    })
    .await
}

/// POST /api/v1/images/crop - Crop a rectangle
#[utoipa::path(
    post,
    path = "/api/v1/images/crop",
    tag = "images",
    params(CropQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Cropped image"),
        (status = 400, description = "Invalid image or rectangle", body = ErrorResponse),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn crop(state: web::Data<AppState>, query: web::Query<CropQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let rect = query.rect();

    process("crop", state.processor.clone(), body, move |p, data| p.crop(data, rect, format)).await
}

/// POST /api/v1/images/crop/rounded - Crop with transparent rounded corners
#[utoipa::path(
    post,
    path = "/api/v1/images/crop/rounded",
    tag = "images",
    params(CropQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Cropped image"),
        (status = 400, description = "Invalid image or rectangle", body = ErrorResponse),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn crop_rounded(state: web::Data<AppState>, query: web::Query<CropQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let (rect, radius) = (query.rect(), query.radius);

    process("crop_rounded", state.processor.clone(), body, move |p, data| {
        p.crop_rounded(data, rect, radius, format)
    })
    .await
}

/// POST /api/v1/images/convert - Re-encode in another format
#[utoipa::path(
    post,
    path = "/api/v1/images/convert",
    tag = "images",
    params(ConvertQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Converted image"),
        (status = 400, description = "Invalid image or format", body = ErrorResponse),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn convert(state: web::Data<AppState>, query: web::Query<ConvertQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };

    process("convert", state.processor.clone(), body, move |p, data| p.convert(data, format)).await
}

/// POST /api/v1/images/filter - Apply a pixel filter
#[utoipa::path(
    post,
    path = "/api/v1/images/filter",
    tag = "images",
    params(FilterQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Filtered image"),
        (status = 400, description = "Invalid image or filter", body = ErrorResponse),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn filter(state: web::Data<AppState>, query: web::Query<FilterQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let filter = match Filter::parse(&query.kind, query.intensity) {
        Ok(f) => f,
        Err(e) => return error_response(&e),
    };

    process("filter", state.processor.clone(), body, move |p, data| p.filter(data, filter, format)).await
}

/// POST /api/v1/images/watermark - Stamp translucent text bottom-right
#[utoipa::path(
    post,
    path = "/api/v1/images/watermark",
    tag = "images",
    params(WatermarkQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Watermarked image"),
        (status = 400, description = "Invalid image or watermark", body = ErrorResponse),
        (status = 501, description = "Output codec unavailable", body = ErrorResponse)
    )
)]
pub async fn watermark(state: web::Data<AppState>, query: web::Query<WatermarkQuery>, body: Bytes) -> HttpResponse {
    let format = match parse_format(&query.fmt) {
        Ok(f) => f,
        Err(res) => return res,
    };
    let mark = match Watermark::new(&query.text, query.font_size, query.opacity, query.margin) {
        Ok(m) => m,
        Err(e) => return error_response(&e),
    };

    process("watermark", state.processor.clone(), body, move |p, data| p.watermark(data, &mark, format)).await
}

/// POST /api/v1/images/enhance - AI enhancement (not yet available)
#[utoipa::path(
    post,
    path = "/api/v1/images/enhance",
    tag = "images",
    params(EnhanceQuery),
    request_body(content = Vec<u8>, description = "Source image", content_type = "application/octet-stream"),
    responses(
        (status = 501, description = "Enhancement unavailable", body = ErrorResponse)
    )
)]
pub async fn enhance(state: web::Data<AppState>, query: web::Query<EnhanceQuery>, body: Bytes) -> HttpResponse {
    match state.enhancer.enhance(&body, &query.kind) {
        Ok(image) => HttpResponse::Ok().content_type(image.content_type).body(image.bytes),
        Err(e) => {
            warn!(kind = %query.kind, error = %e, "Enhancement requested");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use actix_web::{test, App};
    use image::{DynamicImage, Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255])));
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    macro_rules! app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AppState::from_settings(Settings::default())))
                    .configure(crate::api::configure_routes),
            )
            .await
        };
    }

    fn post(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post().uri(uri).set_payload(body)
    }

    #[actix_web::test]
    async fn test_resize_returns_image() {
        let app = app!();
        let res = test::call_service(&app, post("/api/v1/images/resize?width=8&height=4&fmt=png", png(16, 16)).to_request()).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("content-type").unwrap(), "image/png");

        let bytes = test::read_body(res).await;
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (8, 4));
    }

    #[actix_web::test]
    async fn test_invalid_image_is_bad_request() {
        let app = app!();
        let res = test::call_service(&app, post("/api/v1/images/convert?fmt=png", b"nope".to_vec()).to_request()).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }

    #[actix_web::test]
    async fn test_unknown_format_is_bad_request() {
        let app = app!();
        let res = test::call_service(&app, post("/api/v1/images/crop?x=0&y=0&width=2&height=2&fmt=psd", png(4, 4)).to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unavailable_codec_is_not_implemented() {
        let app = app!();
        let res = test::call_service(&app, post("/api/v1/images/convert?fmt=webp", png(4, 4)).to_request()).await;

        assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "CAPABILITY_UNAVAILABLE");
    }

    #[actix_web::test]
    async fn test_filter_and_enhance() {
        let app = app!();

        let res = test::call_service(&app, post("/api/v1/images/filter?type=invert", png(4, 4)).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = test::call_service(&app, post("/api/v1/images/filter?type=sepia", png(4, 4)).to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = test::call_service(&app, post("/api/v1/images/enhance?type=upscale", png(4, 4)).to_request()).await;
        assert_eq!(res.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[actix_web::test]
    async fn test_watermark_endpoint() {
        let app = app!();

        let uri = "/api/v1/images/watermark?text=Hello%20world&fontSize=16&opacity=0.8&margin=4&fmt=jpg";
        let res = test::call_service(&app, post(uri, png(120, 60)).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("content-type").unwrap(), "image/jpeg");

        let res = test::call_service(&app, post("/api/v1/images/watermark?text=x&opacity=2", png(8, 8)).to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_oversized_blur_is_rejected() {
        let app = app!();
        let res = test::call_service(&app, post("/api/v1/images/filter?type=blur&intensity=1e9", png(2, 2)).to_request()).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
    }
}
