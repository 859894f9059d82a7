//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CanvasConfig`，保证运行时行为可观测、可调整、可测试。
//! 画布朝向（landscape / portrait）作为高层语义，映射到两组固定的导出分辨率。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的配置（5 MiB 预算、质量 0.40~0.95、8 次迭代、3.5 秒）。
//! - `OrientationMode` 负责朝向字符串解析与反向输出。
//! - `EncodeOptions::normalized` 把调用方给出的质量区间收敛到编码器可接受的范围。
//! - 整体可由 JSON 反序列化，缺省字段取默认值。

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ImageError;

/// 横版画布尺寸。
pub const LANDSCAPE_SIZE: (u32, u32) = (4400, 2200);
/// 竖版画布尺寸。
pub const PORTRAIT_SIZE: (u32, u32) = (2200, 4400);
/// 导出体积上限：5 MiB。
pub const MAX_EXPORT_BYTES: u64 = 5 * 1024 * 1024;
/// 预览画布最大边长。
pub const PREVIEW_MAX_EDGE: u32 = 1100;

/// 质量下限允许的取值范围。
const MIN_Q_RANGE: (f64, f64) = (0.05, 0.95);
/// 质量上限允许的取值范围。
const MAX_Q_RANGE: (f64, f64) = (0.05, 0.99);

/// 画布朝向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationMode {
    #[default]
    Landscape,
    Portrait,
}

impl OrientationMode {
    /// 从外部字符串解析朝向。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use wx_hd_canvas::canvas::OrientationMode;
    ///
    /// let mode = OrientationMode::from_str("portrait")?;
    /// assert_eq!(mode.as_str(), "portrait");
    /// # Ok::<(), wx_hd_canvas::canvas::ImageError>(())
    /// ```
    pub fn from_str(mode: &str) -> Result<Self, ImageError> {
        match mode.trim().to_lowercase().as_str() {
            "landscape" => Ok(Self::Landscape),
            "portrait" => Ok(Self::Portrait),
            other => Err(ImageError::InvalidFormat(format!(
                "未知画布朝向：{}（可选：landscape / portrait）",
                other
            ))),
        }
    }

    /// 稳定字符串，用于文件名与报告。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
        }
    }

    pub fn target_size(self) -> (u32, u32) {
        match self {
            Self::Landscape => LANDSCAPE_SIZE,
            Self::Portrait => PORTRAIT_SIZE,
        }
    }

    /// 依据源图朝向选择更匹配的画布（宽 ≥ 高 时取横版）。
    pub fn suggest(width: u32, height: u32) -> Self {
        if width >= height {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

/// 可行解的保留策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeasiblePolicy {
    /// 保留满足预算的最小体积结果。
    #[default]
    SmallestSize,
    /// 保留满足预算的最高质量结果。
    HighestQuality,
}

/// 体积受限编码的搜索参数。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// 最低质量（包含）。
    pub min_q: f64,
    /// 最高质量（包含），首轮探测从这里开始。
    pub max_q: f64,
    /// 最大迭代次数。
    pub max_iters: u32,
    /// 超时（毫秒），到时返回当前最好结果。
    pub timeout_ms: u64,
    pub policy: FeasiblePolicy,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            min_q: 0.40,
            max_q: 0.95,
            max_iters: 8,
            timeout_ms: 3500,
            policy: FeasiblePolicy::SmallestSize,
        }
    }
}

impl EncodeOptions {
    /// 把质量区间收敛到编码器可接受的范围。
    ///
    /// 下限落在 [0.05, 0.95]，上限落在 [0.05, 0.99]；下限大于上限时区间塌缩为下限。
    pub fn normalized(self) -> Self {
        let min_q = clamp_q(self.min_q, MIN_Q_RANGE);
        let mut max_q = clamp_q(self.max_q, MAX_Q_RANGE);
        if min_q > max_q {
            max_q = min_q;
        }
        Self {
            min_q,
            max_q,
            ..self
        }
    }
}

fn clamp_q(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if value.is_nan() {
        return lo;
    }
    value.clamp(lo, hi)
}

/// 画布处理配置。
///
/// 字段覆盖了读取、解码、预览与导出四个阶段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 预览画布最大边长。
    pub preview_max_edge: u32,
    /// 导出体积预算（字节）。
    pub max_bytes: u64,
    pub encode: EncodeOptions,
    /// 合成时的缩放滤镜。
    #[serde(skip, default = "default_resize_filter")]
    pub resize_filter: FilterType,
}

fn default_resize_filter() -> FilterType {
    FilterType::CatmullRom
}

/// 导出预算下限。
pub const MIN_EXPORT_BYTES: u64 = 64 * 1024;

impl CanvasConfig {
    /// 校验可调参数的取值范围。配置文件与运行时更新共用这一套规则。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_bytes < MIN_EXPORT_BYTES {
            return Err(ImageError::InvalidFormat("max_bytes 不能小于 64KB".to_string()));
        }
        if !(1..=64).contains(&self.encode.max_iters) {
            return Err(ImageError::InvalidFormat("max_iters 必须在 1~64 之间".to_string()));
        }
        if !(100..=60_000).contains(&self.encode.timeout_ms) {
            return Err(ImageError::InvalidFormat(
                "timeout_ms 必须在 100~60000 毫秒之间".to_string(),
            ));
        }
        if self.preview_max_edge == 0 {
            return Err(ImageError::InvalidFormat("preview_max_edge 必须大于 0".to_string()));
        }
        Ok(())
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            max_file_size: 64 * 1024 * 1024,
            max_decoded_pixels: 100_000_000,
            max_decoded_bytes: 400 * 1024 * 1024,
            preview_max_edge: PREVIEW_MAX_EDGE,
            max_bytes: MAX_EXPORT_BYTES,
            encode: EncodeOptions::default(),
            resize_filter: default_resize_filter(),
        }
    }
}
