//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级 `AppError`，把画布链路的 `ImageError`、文件 I/O、
//! 配置解析与导出写入失败收拢到同一个类型，命令行入口只需处理一种错误。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 `--json` 报告直接输出。

use serde::Serialize;

use crate::canvas::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 画布处理流水线错误（加载 / 解码 / 合成 / 编码）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件或命令行参数无效
    #[error("配置错误: {0}")]
    Config(String),

    /// 输出目录不可用或写入失败
    #[error("存储目录不可用: {0}")]
    Storage(String),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
