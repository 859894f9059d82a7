//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载画布链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 注意：体积超限不是错误。编码器总会返回结果，由调用方比较体积与预算。

/// 画布处理统一错误类型。
///
/// 该类型会在应用层被上转为 `AppError`，最终以可读文案展示给用户。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 当前平台无法解码的容器/编码（如 HEIF/HEIC）。
    #[error("不支持的格式：{0}")]
    UnsupportedFormat(String),

    #[error("图片解码失败：{0}")]
    Decode(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    /// 像素缓冲（绘制表面）无法创建。
    #[error("画布创建失败：{0}")]
    Context(String),

    /// 主路径与兜底路径均未产出可用字节。
    #[error("导出失败：{0}")]
    Encode(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 解码完成前已选择了新的图片，本次结果作废。
    #[error("已取消：{0}")]
    Cancelled(String),
}

impl From<ImageError> for String {
    fn from(error: ImageError) -> Self {
        error.to_string()
    }
}
