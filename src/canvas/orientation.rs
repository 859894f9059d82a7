//! # 方向读取与变换表模块
//!
//! ## 设计思路
//!
//! 相机常把“如何摆正”写在 EXIF Orientation（1..8）里而不是直接旋转像素。
//! 本模块把 8 种取值建模为枚举，每个取值对应一段固定的像素操作序列，
//! 便于在脱离解码的情况下单独审计与测试二维变换。
//!
//! ## 实现思路
//!
//! - `read_orientation`：用 `kamadak-exif` 解析容器，任何失败都回退为 1。
//! - `OrientationTag::ops`：标签 → 像素操作序列（按顺序作用于源图）。
//! - `OrientationTag::map_point`：同一序列作用于单个坐标，供测试与诊断。
//! - `OrientationTag::apply`：同一序列作用于整幅 RGBA 图像。
//!
//! ```text
//!  1 原样        2 水平翻转     3 旋转180      4 垂直翻转
//!  5 垂直翻转后顺时针90（转置）   6 顺时针90
//!  7 垂直翻转后顺时针270（反转置） 8 顺时针270
//! ```

use std::io::Cursor;
use std::path::Path;

use image::{RgbaImage, imageops};

/// 单步像素操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOp {
    FlipHorizontal,
    FlipVertical,
    /// 顺时针 90°。
    Rotate90,
    Rotate180,
    /// 顺时针 270°（逆时针 90°）。
    Rotate270,
}

impl PixelOp {
    /// 在 `w × h` 图像上变换坐标，返回新坐标与新尺寸。
    fn map(self, x: u32, y: u32, w: u32, h: u32) -> (u32, u32, u32, u32) {
        match self {
            Self::FlipHorizontal => (w - 1 - x, y, w, h),
            Self::FlipVertical => (x, h - 1 - y, w, h),
            Self::Rotate90 => (h - 1 - y, x, h, w),
            Self::Rotate180 => (w - 1 - x, h - 1 - y, w, h),
            Self::Rotate270 => (y, w - 1 - x, h, w),
        }
    }

    fn apply(self, image: &RgbaImage) -> RgbaImage {
        match self {
            Self::FlipHorizontal => imageops::flip_horizontal(image),
            Self::FlipVertical => imageops::flip_vertical(image),
            Self::Rotate90 => imageops::rotate90(image),
            Self::Rotate180 => imageops::rotate180(image),
            Self::Rotate270 => imageops::rotate270(image),
        }
    }
}

/// EXIF 方向标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrientationTag {
    #[default]
    Identity,
    FlipHorizontal,
    Rotate180,
    FlipVertical,
    Transpose,
    Rotate90,
    Transverse,
    Rotate270,
}

impl OrientationTag {
    const ALL: [Self; 8] = [
        Self::Identity,
        Self::FlipHorizontal,
        Self::Rotate180,
        Self::FlipVertical,
        Self::Transpose,
        Self::Rotate90,
        Self::Transverse,
        Self::Rotate270,
    ];

    /// 从原始数值构造；范围外的值一律归一为 1。
    pub fn from_exif(value: u32) -> Self {
        match value {
            1..=8 => Self::ALL[(value - 1) as usize],
            _ => Self::Identity,
        }
    }

    pub fn to_exif(self) -> u8 {
        match self {
            Self::Identity => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// 摆正所需的像素操作序列（按顺序作用于源图）。
    pub fn ops(self) -> &'static [PixelOp] {
        match self {
            Self::Identity => &[],
            Self::FlipHorizontal => &[PixelOp::FlipHorizontal],
            Self::Rotate180 => &[PixelOp::Rotate180],
            Self::FlipVertical => &[PixelOp::FlipVertical],
            Self::Transpose => &[PixelOp::FlipVertical, PixelOp::Rotate90],
            Self::Rotate90 => &[PixelOp::Rotate90],
            Self::Transverse => &[PixelOp::FlipVertical, PixelOp::Rotate270],
            Self::Rotate270 => &[PixelOp::Rotate270],
        }
    }

    /// 是否交换宽高（5/6/7/8）。
    pub fn swaps_axes(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// 摆正后的尺寸。
    pub fn output_dimensions(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// 源图坐标 `(x, y)` 在摆正后图像中的位置。
    ///
    /// 要求 `x < width && y < height`。
    pub fn map_point(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        let (mut x, mut y, mut w, mut h) = (x, y, width, height);
        for op in self.ops() {
            (x, y, w, h) = op.map(x, y, w, h);
        }
        (x, y)
    }

    /// 将整幅图像摆正。
    pub fn apply(self, image: RgbaImage) -> RgbaImage {
        self.ops()
            .iter()
            .fold(image, |current, op| op.apply(&current))
    }
}

/// 从内存字节读取方向标签，从不失败：无 EXIF、解析失败或取值越界都返回 1。
pub fn read_orientation(bytes: &[u8]) -> OrientationTag {
    let mut cursor = Cursor::new(bytes);
    let exif = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(err) => {
            log::debug!("未读取到 EXIF，按原始方向处理：{}", err);
            return OrientationTag::Identity;
        }
    };

    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(OrientationTag::from_exif)
        .unwrap_or_default()
}

/// 从本地文件读取方向标签；读取失败同样回退为 1。
pub async fn read_orientation_from_file(path: &Path) -> OrientationTag {
    match tokio::fs::read(path).await {
        Ok(bytes) => read_orientation(&bytes),
        Err(err) => {
            log::debug!("读取文件失败，方向按 1 处理：{}", err);
            OrientationTag::Identity
        }
    }
}
