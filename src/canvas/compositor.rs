//! # 合成模块
//!
//! ## 设计思路
//!
//! 以 contain 策略将已摆正的源图绘制到指定尺寸的新画布上，并先填充背景色。
//! 同一函数服务两条链路：限制最大边的交互预览，以及全尺寸导出。
//!
//! ## 实现思路
//!
//! - 背景色在进入本模块前已确定为不透明颜色。
//! - 缩放优先走 `fast_image_resize`，失败时回退 `image::imageops::resize`。
//! - 源图带透明通道时按 alpha 叠加到背景上。

use fast_image_resize as fr;
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba, RgbaImage};

use super::geometry::contain;
use super::source::TargetSpec;
use super::ImageError;

/// 在预览最大边约束下计算预览尺寸，保持目标宽高比（不放大）。
pub fn preview_size(dest_w: u32, dest_h: u32, max_edge: u32) -> (u32, u32) {
    if dest_w == 0 || dest_h == 0 {
        return (dest_w, dest_h);
    }
    let scale = (max_edge as f64 / dest_w as f64)
        .min(max_edge as f64 / dest_h as f64)
        .min(1.0);
    let w = (dest_w as f64 * scale).round() as u32;
    let h = (dest_h as f64 * scale).round() as u32;
    (w, h)
}

/// 合成画布：填充背景，再把源图按 contain 矩形绘入。
///
/// `source` 为空时仅输出背景（选图前的预览）。
pub fn compose(
    target: &TargetSpec,
    source: Option<&RgbaImage>,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    let mut canvas = allocate_canvas(target.dest_w, target.dest_h, target.background)?;

    let Some(source) = source else {
        return Ok(canvas);
    };

    let (src_w, src_h) = source.dimensions();
    let rect = contain(
        src_w as i64,
        src_h as i64,
        target.dest_w as i64,
        target.dest_h as i64,
    );
    if rect.is_empty() {
        log::debug!(
            "源图 {}x{} 在 {}x{} 画布中无可绘制区域",
            src_w,
            src_h,
            target.dest_w,
            target.dest_h
        );
        return Ok(canvas);
    }

    let (draw_w, draw_h) = (rect.w as u32, rect.h as u32);
    let scaled = if (draw_w, draw_h) == (src_w, src_h) {
        source.clone()
    } else {
        match resize_with_fast_image_resize(source, draw_w, draw_h, filter) {
            Ok(resized) => resized,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 缩放失败，回退 imageops::resize：{}", err);
                imageops::resize(source, draw_w, draw_h, filter)
            }
        }
    };

    imageops::overlay(&mut canvas, &scaled, rect.x, rect.y);
    Ok(canvas)
}

fn allocate_canvas(width: u32, height: u32, background: Rgba<u8>) -> Result<RgbaImage, ImageError> {
    if width == 0 || height == 0 {
        return Err(ImageError::Context(format!(
            "画布尺寸无效：{}x{}",
            width, height
        )));
    }

    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| ImageError::Context("画布尺寸导致内存溢出风险".to_string()))?;

    let pixels: Vec<u8> = background.0.iter().copied().cycle().take(len).collect();
    ImageBuffer::from_raw(width, height, pixels)
        .ok_or_else(|| ImageError::Context("画布缓冲长度异常".to_string()))
}

fn resize_with_fast_image_resize(
    source: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbaImage, ImageError> {
    let (src_width, src_height) = source.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        source.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| ImageError::Context(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new().resize_alg(to_resize_alg(filter));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Context(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Context("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_resize_alg(filter: FilterType) -> fr::ResizeAlg {
    match filter {
        FilterType::Nearest => fr::ResizeAlg::Nearest,
        FilterType::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
        FilterType::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        FilterType::Gaussian => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
        FilterType::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
    }
}
