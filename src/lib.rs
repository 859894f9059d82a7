//! # 微信高清画布（库入口）
//!
//! 把任意照片放进固定 2:1（或 1:2）的高清画布，并导出体积受限的 JPEG。
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 调用方 (CLI main.rs)                      │
//! │   参数解析 ── settings::load_config ── storage 写出       │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ Result<T, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            canvas（核心流水线）                   │
//! │                                                          │
//! │  handler ── 配置快照 + 当前源图（代次号）                 │
//! │   ├─ loader        文件 / Base64 / 字节 + 签名校验         │
//! │   ├─ decoder       解码 + 资源上限                        │
//! │   │   └─ orientation  EXIF 方向 → 像素变换               │
//! │   ├─ compositor    背景 + contain 绘制                    │
//! │   │   └─ geometry     contain 矩形                       │
//! │   └─ encoder       JPEG 质量二分搜索 + 回退               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`canvas`] | 选图、摆正、合成、体积受限编码的完整流水线 |
//! | [`error`] | 应用级错误类型 `AppError` |
//! | [`settings`] | 可选 JSON 配置文件的读取 |
//! | [`storage`] | 输出目录解析与导出文件写入 |

pub mod canvas;
pub mod error;
pub mod settings;
pub mod storage;
