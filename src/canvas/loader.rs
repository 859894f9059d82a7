//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（本地文件 / Base64 / 内存字节）的原始字节加载，并在“尽可能早”的阶段执行输入校验。
//! 目标是尽快失败，减少不必要内存与 CPU 消耗。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 异步读取，按扩展名推断 MIME 提示。
//! - Base64：Data URL 头部解析 MIME + 解码前后体积限制。
//! - 签名校验只拒绝“明确不是图片”的内容；无法识别的字节交给解码器决定。

use std::path::Path;

use base64::{Engine as _, engine::general_purpose};

use super::source::RawImageData;
use super::{CanvasConfig, CanvasHandler, ImageError};

impl CanvasHandler {
    /// 从本地路径加载图片原始字节。
    pub(super) async fn load_from_file(
        &self,
        path: &Path,
        config: &CanvasConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            ImageError::FileSystem(format!("无法读取文件信息：{}（{}）", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(ImageError::FileSystem(format!("不是文件：{}", path.display())));
        }

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        Self::validate_image_signature(&bytes)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(RawImageData {
            mime: Self::mime_from_extension(&name).map(str::to_string),
            bytes,
            name,
            source_hint: "file",
        })
    }

    /// 从 Base64 字符串加载图片原始字节。
    pub(super) fn load_from_base64(
        &self,
        data: &str,
        config: &CanvasConfig,
    ) -> Result<RawImageData, ImageError> {
        log::info!("📝 开始处理 base64 图片");

        let mime = Self::data_url_mime(data);
        let bytes = Self::parse_base64_with_limit(data, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            name: String::new(),
            mime,
            source_hint: "base64",
        })
    }

    /// 直接使用调用方提供的内存字节。
    pub(super) fn load_from_bytes(
        &self,
        name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
        config: &CanvasConfig,
    ) -> Result<RawImageData, ImageError> {
        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "图片过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
        Self::validate_image_signature(&bytes)?;

        Ok(RawImageData {
            mime: mime.or_else(|| Self::mime_from_extension(&name).map(str::to_string)),
            bytes,
            name,
            source_hint: "bytes",
        })
    }

    /// 解析 Data URL 或纯 Base64，并在解码前按长度估算体积。
    pub(super) fn parse_base64_with_limit(data: &str, max_bytes: u64) -> Result<Vec<u8>, ImageError> {
        let payload = match data.trim().strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少数据部分".to_string()))?,
            None => data.trim(),
        };

        let estimated = (payload.len() as u64 / 4) * 3;
        if estimated > max_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 数据过大：约 {:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                max_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ImageError::InvalidFormat(format!("Base64 解码失败：{}", e)))
    }

    /// `data:image/png;base64,...` → `image/png`。
    fn data_url_mime(data: &str) -> Option<String> {
        let header = data.trim().strip_prefix("data:")?.split_once(',')?.0;
        let mime = header.split(';').next()?.trim();
        (!mime.is_empty()).then(|| mime.to_lowercase())
    }

    fn mime_from_extension(name: &str) -> Option<&'static str> {
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some("image/jpeg"),
            "png" => Some("image/png"),
            "gif" => Some("image/gif"),
            "webp" => Some("image/webp"),
            "bmp" => Some("image/bmp"),
            "tif" | "tiff" => Some("image/tiff"),
            "avif" => Some("image/avif"),
            "heic" => Some("image/heic"),
            "heif" => Some("image/heif"),
            _ => None,
        }
    }

    /// 通过文件签名（magic bytes）拒绝明确不是图片的内容。
    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
        }

        if let Some(kind) = infer::get(bytes) {
            if kind.matcher_type() != infer::MatcherType::Image {
                return Err(ImageError::InvalidFormat(format!(
                    "文件签名不是图片类型：{}",
                    kind.mime_type()
                )));
            }
        }

        Ok(())
    }
}
