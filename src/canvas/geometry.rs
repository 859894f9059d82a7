//! # 贴合几何模块
//!
//! 以 contain 策略计算源图在目标画布中的放置矩形：等比缩放到完全放入，
//! 再在两个方向上居中。纯函数，无副作用。

/// 目标画布内的放置矩形（整数像素）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,
}

impl Rect {
    /// 退化输入的哨兵结果：没有可绘制的内容。
    pub const EMPTY: Self = Self {
        x: 0,
        y: 0,
        w: 0,
        h: 0,
    };

    pub const fn new(x: i64, y: i64, w: i64, h: i64) -> Self {
        Self { x, y, w, h }
    }

    /// 面积为 0 时不应绘制（含哨兵与极端比例下被舍入为 0 的边）。
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// 计算 contain 放置矩形。
///
/// 任一尺寸 ≤ 0 时返回 [`Rect::EMPTY`]。缩放比例不设上限 1，
/// 小图放入大画布时会被放大。
///
/// ```rust,ignore
/// use wx_hd_canvas::canvas::{contain, Rect};
///
/// assert_eq!(contain(4000, 2000, 2000, 1000), Rect::new(0, 0, 2000, 1000));
/// ```
pub fn contain(src_w: i64, src_h: i64, dest_w: i64, dest_h: i64) -> Rect {
    if src_w <= 0 || src_h <= 0 || dest_w <= 0 || dest_h <= 0 {
        return Rect::EMPTY;
    }

    let scale = (dest_w as f64 / src_w as f64).min(dest_h as f64 / src_h as f64);
    let w = (src_w as f64 * scale).round() as i64;
    let h = (src_h as f64 * scale).round() as i64;
    let x = ((dest_w - w) as f64 / 2.0).round() as i64;
    let y = ((dest_h - h) as f64 / 2.0).round() as i64;

    Rect { x, y, w, h }
}
