//! # 画布处理模块（canvas）
//!
//! ## 设计思路
//!
//! 该模块把“选图 → 解码摆正 → 合成 → 体积受限编码”按职责拆分为多个子模块：
//!
//! - `handler`：编排整条流水线，持有配置与当前源图
//! - `loader`：负责文件/Base64/内存字节加载与签名校验
//! - `decoder`：负责解码、资源上限与 EXIF 摆正
//! - `orientation`：EXIF 方向读取与 8 种像素变换
//! - `geometry`：contain 等比适配矩形
//! - `compositor`：背景填充 + 源图绘制（预览与导出共用）
//! - `encoder`：JPEG 质量二分搜索，保证在预算内或返回最小结果
//! - `color/config/error/source`：颜色、配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! 纯计算部分（`geometry`、`orientation`、`encoder` 的搜索）不依赖 I/O，
//! 便于单独测试；需要异步读取的只有 `loader` 的文件路径分支。
//!
//! ## 新同事快速上手
//!
//! ```text
//! CLI / 调用方
//!    ↓
//! handler.rs（配置快照 + 代次检查 + 阶段耗时日志）
//!    ├─ loader.rs（来源加载 + 体积/签名校验）
//!    ├─ decoder.rs（解码 + 像素限制 + orientation.rs 摆正）
//!    ├─ compositor.rs（geometry.rs 计算绘制矩形）
//!    └─ encoder.rs（质量搜索 + data URL 回退）
//!    ↓
//! ExportOutcome / AppError
//! ```

mod color;
mod compositor;
mod config;
mod decoder;
mod encoder;
mod error;
mod geometry;
mod handler;
mod loader;
mod orientation;
mod source;

pub use color::{BackgroundMode, ensure_hex6, is_valid_hex};
pub use compositor::{compose, preview_size};
pub use config::{
    CanvasConfig, EncodeOptions, FeasiblePolicy, LANDSCAPE_SIZE, MAX_EXPORT_BYTES, MIN_EXPORT_BYTES,
    OrientationMode, PORTRAIT_SIZE, PREVIEW_MAX_EDGE,
};
pub use decoder::normalize;
pub use encoder::{
    ImageJpegBackend, JpegBackend, codec_quality, data_url_to_bytes, encode_once, encode_under_budget,
};
pub use error::ImageError;
pub use geometry::{Rect, contain};
pub use handler::{CanvasHandler, ExportOutcome, export_file_name};
pub use orientation::{OrientationTag, PixelOp, read_orientation, read_orientation_from_file};
pub use source::{
    EncodeResult, ImageSource, NormalizedImage, RawImageData, SourceSummary, TargetSpec,
};
