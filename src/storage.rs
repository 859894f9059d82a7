//! 导出文件存储模块
//!
//! # 设计思路
//!
//! 统一管理导出 JPEG 的落盘位置，支持用户指定目录，
//! 并在目录不存在时自动创建。
//!
//! # 实现思路
//!
//! - 优先使用用户指定的输出目录。
//! - 未指定时回退到当前工作目录。
//! - 目录不存在时自动 `create_dir_all`，避免上层判断。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::canvas::ExportOutcome;
use crate::error::AppError;

/// 获取导出目录
///
/// # 参数
/// * `custom_dir` - 用户指定目录（可选，空路径视为未指定）
///
/// # 返回
/// - `Ok(PathBuf)`：可用的导出目录
/// - `Err(AppError::Storage)`：无法获取或创建目录
pub fn resolve_output_dir(custom_dir: Option<&Path>) -> Result<PathBuf, AppError> {
    if let Some(dir) = custom_dir.filter(|dir| !dir.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::Storage(format!("创建输出目录 '{}' 失败: {}", dir.display(), e))
            })?;
        }
        return Ok(dir.to_path_buf());
    }

    std::env::current_dir().map_err(|e| AppError::Storage(format!("获取当前目录失败: {}", e)))
}

/// 写入导出结果，返回完整文件路径。
pub fn write_export(dir: &Path, outcome: &ExportOutcome) -> Result<PathBuf, AppError> {
    let start = Instant::now();
    let dir = resolve_output_dir(Some(dir))?;
    let path = dir.join(&outcome.file_name);

    fs::write(&path, &outcome.bytes)
        .map_err(|e| AppError::Storage(format!("写入 '{}' 失败: {}", path.display(), e)))?;

    log::info!(
        "💾 已写入 {}（{} 字节，write={}ms）",
        path.display(),
        outcome.size_in_bytes,
        start.elapsed().as_millis()
    );
    Ok(path)
}
