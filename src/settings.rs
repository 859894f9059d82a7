//! 配置文件模块
//!
//! # 设计思路
//!
//! 配置文件是可选的 JSON，字段缺省时回落到 `CanvasConfig::default()`，
//! 因此只写需要调整的字段即可，例如：
//!
//! ```json
//! { "max_bytes": 3145728, "encode": { "max_iters": 12, "policy": "highest_quality" } }
//! ```
//!
//! # 实现思路
//!
//! - 读取失败归为 `AppError::Io`，解析失败归为 `AppError::Config`。
//! - 解析后统一经过 `EncodeOptions::normalized()`，保证质量区间有效。
//! - 取值范围与运行时更新共用 `CanvasConfig::validate()`。

use std::fs;
use std::path::Path;

use crate::canvas::CanvasConfig;
use crate::error::AppError;

/// 从 JSON 文件读取画布配置。
pub fn load_config(path: &Path) -> Result<CanvasConfig, AppError> {
    let content = fs::read_to_string(path)?;
    let mut config = serde_json::from_str::<CanvasConfig>(&content)
        .map_err(|e| AppError::Config(format!("解析配置文件 '{}' 失败: {}", path.display(), e)))?;

    config.encode = config.encode.normalized();
    config
        .validate()
        .map_err(|e| AppError::Config(format!("配置文件 '{}' 取值无效: {}", path.display(), e)))?;

    log::info!(
        "⚙️ 已加载配置文件 {}：budget={} q={:.2}~{:.2} iters={}",
        path.display(),
        config.max_bytes,
        config.encode.min_q,
        config.encode.max_q,
        config.encode.max_iters
    );

    Ok(config)
}

/// 有路径则读取，否则使用默认配置。
pub fn load_config_or_default(path: Option<&Path>) -> Result<CanvasConfig, AppError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CanvasConfig::default()),
    }
}
