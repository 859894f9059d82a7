//! # 解码与摆正模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 摆正的 RGBA”集中管理，并在关键节点增加资源上限控制。
//! 优先做尺寸检查，再进行完整解码，降低超大输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 读取 EXIF 方向（失败按 1 处理）
//! 2. 读取 header 尺寸并按像素/内存上限快速拒绝
//! 3. 完整解码；失败时区分“平台不支持的格式”与“一般解码失败”
//! 4. 按方向标签的像素操作序列摆正，输出宽高可能交换

use std::io::Cursor;

use image::{GenericImageView, ImageReader};

use super::orientation::read_orientation;
use super::source::{NormalizedImage, RawImageData};
use super::{CanvasConfig, ImageError};

/// 已知 `image` 解码器不提供的格式：声明类型包含这些片段即视为不支持。
const UNSUPPORTED_MIME_HINTS: [&str; 2] = ["heif", "heic"];
const UNSUPPORTED_EXTENSIONS: [&str; 2] = [".heif", ".heic"];

/// 将原始字节解码并摆正。
///
/// 失败是终态：不会产出部分或兜底的像素。
pub fn normalize(raw: &RawImageData, config: &CanvasConfig) -> Result<NormalizedImage, ImageError> {
    let orientation = read_orientation(&raw.bytes);

    if let Ok((header_width, header_height)) = inspect_dimensions_from_memory(&raw.bytes) {
        validate_pixel_limits(config, header_width, header_height)?;
        validate_decoded_memory_limits(config, header_width, header_height)?;
    }

    let decoded = image::load_from_memory(&raw.bytes).map_err(|e| classify_decode_error(raw, e))?;

    let (raw_width, raw_height) = decoded.dimensions();
    if raw_width == 0 || raw_height == 0 {
        return Err(ImageError::Decode("图片尺寸为 0".to_string()));
    }
    validate_pixel_limits(config, raw_width, raw_height)?;
    validate_decoded_memory_limits(config, raw_width, raw_height)?;

    let raster = orientation.apply(decoded.into_rgba8());
    let (width, height) = raster.dimensions();

    log::info!(
        "✅ 图片解码成功 - 来源: {} 原始尺寸: {}x{} 方向: {} 输出尺寸: {}x{}",
        raw.source_hint,
        raw_width,
        raw_height,
        orientation.to_exif(),
        width,
        height
    );

    Ok(NormalizedImage {
        raster,
        width,
        height,
        orientation,
    })
}

/// 解码失败时，若声明类型/扩展名/文件签名指向平台不支持的格式，
/// 返回带细节的“不支持的格式”，否则包装为一般解码失败。
fn classify_decode_error(raw: &RawImageData, err: image::ImageError) -> ImageError {
    if let Some(detail) = unsupported_format_hint(raw) {
        return ImageError::UnsupportedFormat(format!(
            "{} 在当前环境不可用（未内置解码器），请转换为 JPEG/PNG 后重试",
            detail
        ));
    }
    ImageError::Decode(err.to_string())
}

fn unsupported_format_hint(raw: &RawImageData) -> Option<String> {
    if let Some(mime) = raw.mime.as_deref() {
        let mime = mime.to_lowercase();
        if UNSUPPORTED_MIME_HINTS.iter().any(|hint| mime.contains(hint)) {
            return Some(mime);
        }
    }

    let name = raw.name.to_lowercase();
    if UNSUPPORTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        return Some(raw.name.clone());
    }

    infer::get(&raw.bytes)
        .map(|kind| kind.mime_type())
        .filter(|mime| UNSUPPORTED_MIME_HINTS.iter().any(|hint| mime.contains(hint)))
        .map(str::to_string)
}

/// 仅通过内存中的图片头信息读取宽高。
///
/// 用于在完整解码前做像素限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &CanvasConfig, width: u32, height: u32) -> Result<(), ImageError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(ImageError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(
    config: &CanvasConfig,
    width: u32,
    height: u32,
) -> Result<(), ImageError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(ImageError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}
