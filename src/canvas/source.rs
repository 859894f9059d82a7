//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示外部来源语义
//! - `RawImageData` 表示已加载但未解码的字节（附带文件名与 MIME 提示）
//! - `NormalizedImage` 表示已按 EXIF 摆正的 RGBA 像素
//! - `TargetSpec` / `EncodeResult` 为单次渲染、导出的瞬时结果

use std::path::PathBuf;

use image::{Rgba, RgbaImage};

use super::{BackgroundMode, OrientationMode, OrientationTag};

/// 图片输入来源。
pub enum ImageSource {
    /// 本地文件路径来源。
    FilePath(PathBuf),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 已在内存中的字节，`mime` 仅作提示。
    Bytes {
        name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// 加载阶段输出：原始字节与来源标识。
pub struct RawImageData {
    /// 原始图片字节。
    pub bytes: Vec<u8>,
    /// 文件名（可能为空），用于按扩展名判断格式。
    pub name: String,
    /// 声明的 MIME 类型，不作为权威依据。
    pub mime: Option<String>,
    /// 来源提示（用于日志与诊断）。
    pub source_hint: &'static str,
}

/// 解码阶段输出：已摆正的像素数据。
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub raster: RgbaImage,
    pub width: u32,
    pub height: u32,
    /// 解码时读取到的方向标签。
    pub orientation: OrientationTag,
}

/// 一次渲染的目标：尺寸与已确定的背景色。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub dest_w: u32,
    pub dest_h: u32,
    pub background: Rgba<u8>,
}

impl TargetSpec {
    pub fn new(dest_w: u32, dest_h: u32, background: Rgba<u8>) -> Self {
        Self {
            dest_w,
            dest_h,
            background,
        }
    }

    /// 按画布朝向构造全尺寸导出目标。
    pub fn for_mode(mode: OrientationMode, background: &BackgroundMode) -> Self {
        let (dest_w, dest_h) = mode.target_size();
        Self::new(dest_w, dest_h, background.to_rgba())
    }
}

/// 体积受限编码结果。
#[derive(Debug, Clone)]
pub struct EncodeResult {
    pub bytes: Vec<u8>,
    pub size_in_bytes: usize,
    /// 保留两位小数的质量。
    pub quality: f64,
}

/// 选图成功后的源图摘要。
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SourceSummary {
    pub width: u32,
    pub height: u32,
    /// 长边 / 短边。
    pub ratio: f64,
    pub suggested_mode: OrientationMode,
    /// 长短边比是否 ≥ 2。
    pub meets_ratio: bool,
}

impl SourceSummary {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let long_side = width.max(height);
        let short_side = width.min(height).max(1);
        let ratio = long_side as f64 / short_side as f64;
        Self {
            width,
            height,
            ratio,
            suggested_mode: OrientationMode::suggest(width, height),
            meets_ratio: ratio >= 2.0,
        }
    }
}
