//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `CanvasHandler` 只负责流程编排与配置管理，不直接与命令行或界面绑定。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源加载原始字节
//! 3. 解码并按 EXIF 摆正
//! 4. 合成（低分辨率预览 / 全尺寸导出）
//! 5. 体积受限编码（仅导出）
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<CanvasConfig>>` 支持运行时调整编码参数。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 当前源图带代次号：解码完成时若已选择了更新的图片，本次结果作废。
//! - 记录 `load/decode/compose/encode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use chrono::{DateTime, Local};
use image::RgbaImage;

use super::compositor::{compose, preview_size};
use super::decoder::normalize;
use super::encoder::{ImageJpegBackend, JpegBackend, encode_under_budget};
use super::source::{NormalizedImage, SourceSummary, TargetSpec};
use super::{BackgroundMode, CanvasConfig, EncodeOptions, ImageError, ImageSource, OrientationMode};

/// 一次导出的完整结果。
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub size_in_bytes: usize,
    pub quality: f64,
    pub file_name: String,
    pub mode: OrientationMode,
    pub width: u32,
    pub height: u32,
    pub max_bytes: u64,
    /// 体积是否在预算内；为 `false` 时是“已尽力”的最小结果。
    pub within_budget: bool,
}

#[derive(Default)]
struct CurrentSource {
    generation: u64,
    image: Option<Arc<NormalizedImage>>,
}

/// 画布处理器。
///
/// 封装了配置状态、当前源图与编码后端，并编排各子模块实现完整流程。
pub struct CanvasHandler {
    pub(super) config: Arc<RwLock<CanvasConfig>>,
    current: Arc<Mutex<CurrentSource>>,
    backend: Arc<dyn JpegBackend + Send + Sync>,
}

impl CanvasHandler {
    /// 根据初始配置创建处理器，使用 `image` 的 JPEG 编码器。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use wx_hd_canvas::canvas::{CanvasConfig, CanvasHandler};
    ///
    /// let handler = CanvasHandler::new(CanvasConfig::default());
    /// ```
    pub fn new(config: CanvasConfig) -> Self {
        Self::with_backend(config, Arc::new(ImageJpegBackend))
    }

    pub fn with_backend(config: CanvasConfig, backend: Arc<dyn JpegBackend + Send + Sync>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            current: Arc::new(Mutex::new(CurrentSource::default())),
            backend,
        }
    }

    /// 获取配置快照。
    ///
    /// 作用：保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> CanvasConfig {
        match self.config.read() {
            Ok(cfg) => cfg.clone(),
            Err(poisoned) => {
                log::warn!("配置锁中毒，继续使用恢复数据");
                poisoned.into_inner().clone()
            }
        }
    }

    /// 更新导出预算与编码搜索参数。
    ///
    /// 取值范围与配置文件一致，见 [`CanvasConfig::validate`]；校验失败时配置保持不变。
    pub fn set_encode_options(&self, max_bytes: u64, options: EncodeOptions) -> Result<(), ImageError> {
        let options = options.normalized();
        let mut config = match self.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("配置锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        };

        let updated = CanvasConfig {
            max_bytes,
            encode: options,
            ..config.clone()
        };
        updated.validate()?;
        *config = updated;

        log::info!(
            "⚙️ 已更新编码参数：budget={} q={:.2}~{:.2} iters={} timeout={}ms policy={:?}",
            max_bytes,
            options.min_q,
            options.max_q,
            options.max_iters,
            options.timeout_ms,
            options.policy
        );

        Ok(())
    }

    /// 选择新的源图：加载、解码并替换当前源图。
    ///
    /// 若解码期间又选择了新的图片，本次结果作废并返回 `Cancelled`。
    ///
    /// # 示例
    /// ```rust,ignore
    /// use wx_hd_canvas::canvas::{CanvasConfig, CanvasHandler, ImageSource};
    ///
    /// # async fn demo() -> Result<(), wx_hd_canvas::canvas::ImageError> {
    /// let handler = CanvasHandler::new(CanvasConfig::default());
    /// let summary = handler
    ///     .select_source(ImageSource::FilePath("/tmp/photo.jpg".into()))
    ///     .await?;
    /// println!("{}x{}", summary.width, summary.height);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn select_source(&self, source: ImageSource) -> Result<SourceSummary, ImageError> {
        let generation = self.begin_selection();
        let config = self.config_snapshot();
        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = match source {
            ImageSource::FilePath(path) => self.load_from_file(&path, &config).await?,
            ImageSource::Base64(data) => self.load_from_base64(&data, &config)?,
            ImageSource::Bytes { name, mime, bytes } => {
                self.load_from_bytes(name, mime, bytes, &config)?
            }
        };
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let normalized = normalize(&raw, &config)?;
        let decode_elapsed = decode_start.elapsed();

        let summary = SourceSummary::from_dimensions(normalized.width, normalized.height);
        self.commit_selection(generation, normalized)?;

        log::info!(
            "✅ 源图就绪 - {}x{} ratio={:.3} load={}ms decode={}ms total={}ms",
            summary.width,
            summary.height,
            summary.ratio,
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );
        if summary.meets_ratio {
            log::info!("📐 已满足比例条件：长边/短边 ≥ 2");
        }

        Ok(summary)
    }

    /// 丢弃当前源图，之后的预览只有背景。
    pub fn clear_source(&self) {
        let mut current = self.lock_current();
        current.generation += 1;
        current.image = None;
    }

    pub fn current_source(&self) -> Option<Arc<NormalizedImage>> {
        self.lock_current().image.clone()
    }

    /// 渲染交互预览：目标尺寸按最大边等比缩小后再合成。
    pub fn render_preview(
        &self,
        mode: OrientationMode,
        background: &BackgroundMode,
    ) -> Result<RgbaImage, ImageError> {
        let config = self.config_snapshot();
        let full = TargetSpec::for_mode(mode, background);
        let (w, h) = preview_size(full.dest_w, full.dest_h, config.preview_max_edge);
        let target = TargetSpec::new(w, h, full.background);

        let source = self.current_source();
        compose(&target, source.as_ref().map(|s| &s.raster), config.resize_filter)
    }

    /// 全尺寸导出：合成后在体积预算内编码为 JPEG。
    pub async fn export(
        &self,
        mode: OrientationMode,
        background: &BackgroundMode,
    ) -> Result<ExportOutcome, ImageError> {
        let source = self
            .current_source()
            .ok_or_else(|| ImageError::InvalidFormat("请先选择一张图片".to_string()))?;
        let config = self.config_snapshot();
        let target = TargetSpec::for_mode(mode, background);
        let total_start = Instant::now();

        let compose_start = Instant::now();
        let canvas = compose(&target, Some(&source.raster), config.resize_filter)?;
        let compose_elapsed = compose_start.elapsed();

        tokio::task::yield_now().await;

        let encode_start = Instant::now();
        let encoded = encode_under_budget(self.backend.as_ref(), &canvas, config.max_bytes, config.encode)?;
        let encode_elapsed = encode_start.elapsed();

        let within_budget = encoded.size_in_bytes as u64 <= config.max_bytes;
        let outcome = ExportOutcome {
            file_name: export_file_name(mode, target.dest_w, target.dest_h, Local::now()),
            size_in_bytes: encoded.size_in_bytes,
            quality: encoded.quality,
            bytes: encoded.bytes,
            mode,
            width: target.dest_w,
            height: target.dest_h,
            max_bytes: config.max_bytes,
            within_budget,
        };

        log::info!(
            "✅ 导出完成 - {} size={} q={:.2} within_budget={} compose={}ms encode={}ms total={}ms",
            outcome.file_name,
            outcome.size_in_bytes,
            outcome.quality,
            within_budget,
            compose_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(outcome)
    }

    fn lock_current(&self) -> MutexGuard<'_, CurrentSource> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("源图状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 开始一次新选择，返回其代次号。
    ///
    /// 旧源图在此刻即被丢弃：新图片加载或解码失败时不会回退到旧图。
    pub(crate) fn begin_selection(&self) -> u64 {
        let mut current = self.lock_current();
        current.generation += 1;
        current.image = None;
        current.generation
    }

    /// 仅当代次号仍是最新时才替换当前源图。
    pub(crate) fn commit_selection(
        &self,
        generation: u64,
        image: NormalizedImage,
    ) -> Result<(), ImageError> {
        let mut current = self.lock_current();
        if current.generation != generation {
            log::info!(
                "↩️ 丢弃过期的解码结果（代次 {}，当前 {}）",
                generation,
                current.generation
            );
            return Err(ImageError::Cancelled("已选择新的图片，本次解码结果作废".to_string()));
        }
        current.image = Some(Arc::new(image));
        Ok(())
    }
}

/// 导出文件名：`wx-hd-{朝向}-{宽}x{高}-{YYYYMMDD_HHMMSS}.jpg`。
pub fn export_file_name(mode: OrientationMode, width: u32, height: u32, at: DateTime<Local>) -> String {
    format!(
        "wx-hd-{}-{}x{}-{}.jpg",
        mode.as_str(),
        width,
        height,
        at.format("%Y%m%d_%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::OrientationTag;
    use chrono::TimeZone;
    use image::{DynamicImage, ImageFormat, Rgba, RgbImage};
    use std::io::Cursor;

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    fn png_source(width: u32, height: u32) -> ImageSource {
        ImageSource::Bytes {
            name: "test.png".into(),
            mime: Some("image/png".into()),
            bytes: create_png_bytes(width, height),
        }
    }

    /// 固定体积的编码器，避免在测试中编码 4400x2200 的 JPEG。
    struct FixedSizeBackend(usize);

    impl JpegBackend for FixedSizeBackend {
        fn encode_blob(&self, _: &RgbImage, _: f64) -> Result<Option<Vec<u8>>, ImageError> {
            Ok(Some(vec![0u8; self.0]))
        }

        fn encode_data_url(&self, _: &RgbImage, _: f64) -> Result<String, ImageError> {
            Err(ImageError::Encode("unused".into()))
        }
    }

    #[test]
    fn export_file_name_embeds_mode_size_and_timestamp() {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 2)
            .single()
            .expect("valid local time");
        assert_eq!(
            export_file_name(OrientationMode::Portrait, 2200, 4400, at),
            "wx-hd-portrait-2200x4400-20240309_070502.jpg"
        );
    }

    #[tokio::test]
    async fn select_source_reports_summary() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let summary = handler.select_source(png_source(200, 80)).await.expect("select failed");

        assert_eq!((summary.width, summary.height), (200, 80));
        assert!(summary.meets_ratio);
        assert_eq!(summary.suggested_mode, OrientationMode::Landscape);

        let current = handler.current_source().expect("source present");
        assert_eq!(current.orientation, OrientationTag::Identity);
    }

    #[test]
    fn stale_selection_is_discarded() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let first = handler.begin_selection();
        let second = handler.begin_selection();

        let image = NormalizedImage {
            raster: RgbaImage::new(2, 2),
            width: 2,
            height: 2,
            orientation: OrientationTag::Identity,
        };

        assert!(matches!(
            handler.commit_selection(first, image.clone()),
            Err(ImageError::Cancelled(_))
        ));
        handler.commit_selection(second, image).expect("latest commit succeeds");
        assert!(handler.current_source().is_some());
    }

    #[tokio::test]
    async fn failed_selection_keeps_no_partial_raster() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let result = handler
            .select_source(ImageSource::Bytes {
                name: "broken.jpg".into(),
                mime: Some("image/jpeg".into()),
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0],
            })
            .await;

        assert!(matches!(result, Err(ImageError::Decode(_))));
        assert!(handler.current_source().is_none());
    }

    #[tokio::test]
    async fn failed_new_selection_discards_previous_source() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        handler.select_source(png_source(64, 32)).await.expect("first select failed");
        assert!(handler.current_source().is_some());

        let result = handler
            .select_source(ImageSource::Bytes {
                name: "broken.jpg".into(),
                mime: Some("image/jpeg".into()),
                bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0, 0],
            })
            .await;
        assert!(matches!(result, Err(ImageError::Decode(_))));
        assert!(handler.current_source().is_none());

        let export = handler
            .export(OrientationMode::Landscape, &BackgroundMode::Black)
            .await;
        assert!(matches!(export, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn begin_selection_drops_current_raster() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let generation = handler.begin_selection();
        handler
            .commit_selection(
                generation,
                NormalizedImage {
                    raster: RgbaImage::new(2, 2),
                    width: 2,
                    height: 2,
                    orientation: OrientationTag::Identity,
                },
            )
            .expect("commit failed");

        handler.begin_selection();
        assert!(handler.current_source().is_none());
    }

    #[test]
    fn preview_without_source_is_background_only() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let preview = handler
            .render_preview(OrientationMode::Landscape, &BackgroundMode::White)
            .expect("preview failed");

        assert_eq!(preview.dimensions(), (1100, 550));
        assert!(preview.pixels().all(|p| *p == Rgba([255, 255, 255, 255])));
    }

    #[tokio::test]
    async fn preview_uses_current_source_and_portrait_cap() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        handler.select_source(png_source(100, 100)).await.expect("select failed");

        let preview = handler
            .render_preview(OrientationMode::Portrait, &BackgroundMode::Black)
            .expect("preview failed");
        assert_eq!(preview.dimensions(), (550, 1100));
        // 源图为正方形，位于竖版预览中部
        assert_eq!(*preview.get_pixel(275, 10), Rgba([0, 0, 0, 255]));
        assert_ne!(*preview.get_pixel(275, 550), Rgba([0, 0, 0, 255]));

        handler.clear_source();
        assert!(handler.current_source().is_none());
    }

    #[tokio::test]
    async fn export_requires_source() {
        let handler = CanvasHandler::new(CanvasConfig::default());
        let result = handler
            .export(OrientationMode::Landscape, &BackgroundMode::Black)
            .await;
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn export_reports_budget_status() {
        let handler = CanvasHandler::with_backend(
            CanvasConfig::default(),
            Arc::new(FixedSizeBackend(6 * 1024 * 1024)),
        );
        handler.select_source(png_source(64, 32)).await.expect("select failed");

        let outcome = handler
            .export(OrientationMode::Landscape, &BackgroundMode::Custom("#abc".into()))
            .await
            .expect("export failed");

        assert_eq!((outcome.width, outcome.height), (4400, 2200));
        assert_eq!(outcome.size_in_bytes, 6 * 1024 * 1024);
        assert!(!outcome.within_budget);
        assert!(outcome.file_name.starts_with("wx-hd-landscape-4400x2200-"));
        assert!(outcome.file_name.ends_with(".jpg"));
    }

    #[test]
    fn set_encode_options_validates_ranges() {
        let handler = CanvasHandler::new(CanvasConfig::default());

        let too_small = handler.set_encode_options(1024, EncodeOptions::default());
        assert!(matches!(too_small, Err(ImageError::InvalidFormat(_))));

        let no_iters = handler.set_encode_options(
            5 * 1024 * 1024,
            EncodeOptions {
                max_iters: 0,
                ..EncodeOptions::default()
            },
        );
        assert!(matches!(no_iters, Err(ImageError::InvalidFormat(_))));
        // 被拒绝的更新不改动现有配置
        assert_eq!(handler.config_snapshot().max_bytes, CanvasConfig::default().max_bytes);
        assert_eq!(handler.config_snapshot().encode.max_iters, 8);

        handler
            .set_encode_options(
                2 * 1024 * 1024,
                EncodeOptions {
                    min_q: 0.01,
                    timeout_ms: 1000,
                    ..EncodeOptions::default()
                },
            )
            .expect("valid options");
        let config = handler.config_snapshot();
        assert_eq!(config.max_bytes, 2 * 1024 * 1024);
        assert_eq!(config.encode.min_q, 0.05);
        assert_eq!(config.encode.timeout_ms, 1000);
    }
}
