//! # 体积受限编码模块
//!
//! ## 设计思路
//!
//! 在质量区间内搜索体积不超过预算的 JPEG：首轮直接探测最高质量
//! （大多数输入在高质量下已满足预算，可提前结束），之后按区间中点二分。
//! 搜索受迭代次数与墙钟超时双重约束，超时只会截断搜索，不会报错。
//!
//! ## 实现思路
//!
//! - `JpegBackend` 抽象单次编码，生产实现基于 `image` 的 baseline JPEG 编码器，
//!   测试可注入“质量 → 体积”脚本。
//! - 单次编码先走主路径（直接产出字节）；主路径失败或无输出时，
//!   走兜底路径（Data URL → Base64 解码回字节），两者都失败才返回 `Encode`。
//! - 同时记录“全局最小体积”与“可行解”（体积 ≤ 预算），可行解按
//!   `FeasiblePolicy` 保留最小体积或最高质量。

use std::io::Cursor;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::buffer::ConvertBuffer;
use image::{RgbImage, RgbaImage};

use super::source::EncodeResult;
use super::{EncodeOptions, FeasiblePolicy, ImageError};

/// 区间收敛阈值。
const CONVERGENCE_EPSILON: f64 = 0.01;

/// 单次 JPEG 编码的两条路径。
pub trait JpegBackend {
    /// 主路径：直接产出字节。`Ok(None)` 表示本次没有可用输出。
    fn encode_blob(&self, raster: &RgbImage, quality: f64) -> Result<Option<Vec<u8>>, ImageError>;

    /// 兜底路径：产出 `data:image/jpeg;base64,...` 形式的 Data URL。
    fn encode_data_url(&self, raster: &RgbImage, quality: f64) -> Result<String, ImageError>;
}

/// 基于 `image` crate 的 baseline JPEG 编码器。
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageJpegBackend;

impl ImageJpegBackend {
    fn encode_bytes(raster: &RgbImage, quality: f64) -> Result<Vec<u8>, ImageError> {
        let mut cursor = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut cursor, codec_quality(quality));
        encoder
            .encode_image(raster)
            .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
        Ok(cursor.into_inner())
    }
}

impl JpegBackend for ImageJpegBackend {
    fn encode_blob(&self, raster: &RgbImage, quality: f64) -> Result<Option<Vec<u8>>, ImageError> {
        let bytes = Self::encode_bytes(raster, quality)?;
        Ok((!bytes.is_empty()).then_some(bytes))
    }

    fn encode_data_url(&self, raster: &RgbImage, quality: f64) -> Result<String, ImageError> {
        let bytes = Self::encode_bytes(raster, quality)?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            general_purpose::STANDARD.encode(bytes)
        ))
    }
}

/// 0..1 的质量映射到编码器的 1..=100。
pub fn codec_quality(quality: f64) -> u8 {
    if quality.is_nan() {
        return 1;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Data URL → 原始字节。
pub fn data_url_to_bytes(data_url: &str) -> Result<Vec<u8>, ImageError> {
    let payload = data_url
        .split_once(',')
        .map(|(_, payload)| payload)
        .unwrap_or(data_url);

    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::Encode(format!("Data URL 解码失败：{}", e)))
}

/// 单次编码：主路径优先，失败或无输出时透明回退到 Data URL 路径。
pub fn encode_once<B: JpegBackend + ?Sized>(
    backend: &B,
    raster: &RgbImage,
    quality: f64,
) -> Result<Vec<u8>, ImageError> {
    match backend.encode_blob(raster, quality) {
        Ok(Some(bytes)) if !bytes.is_empty() => return Ok(bytes),
        Ok(_) => log::warn!("⚠️ 主编码路径无输出（q={:.3}），回退 Data URL 路径", quality),
        Err(err) => log::warn!("⚠️ 主编码路径失败（q={:.3}），回退 Data URL 路径：{}", quality, err),
    }

    let data_url = backend.encode_data_url(raster, quality)?;
    data_url_to_bytes(&data_url)
}

/// 一次探测的结果。
struct Attempt {
    bytes: Vec<u8>,
    quality: f64,
}

impl Attempt {
    fn size(&self) -> usize {
        self.bytes.len()
    }

    fn into_result(self) -> EncodeResult {
        EncodeResult {
            size_in_bytes: self.bytes.len(),
            bytes: self.bytes,
            quality: round2(self.quality),
        }
    }
}

/// 搜索过程中维护的三个候选。
#[derive(Default)]
struct SearchState {
    /// 全局最小体积（不论是否满足预算）。
    smallest: Option<Attempt>,
    /// 满足预算的最小体积。
    feasible_smallest: Option<Attempt>,
    /// 满足预算的最高质量。
    feasible_highest: Option<Attempt>,
}

impl SearchState {
    fn record(&mut self, attempt: Attempt, max_bytes: u64) {
        let size = attempt.size();
        let feasible = size as u64 <= max_bytes;

        if feasible {
            let replace_highest = self
                .feasible_highest
                .as_ref()
                .is_none_or(|best| attempt.quality > best.quality);
            if replace_highest {
                self.feasible_highest = Some(Attempt {
                    bytes: attempt.bytes.clone(),
                    quality: attempt.quality,
                });
            }

            let replace_smallest = self
                .feasible_smallest
                .as_ref()
                .is_none_or(|best| size < best.size());
            if replace_smallest {
                self.feasible_smallest = Some(Attempt {
                    bytes: attempt.bytes.clone(),
                    quality: attempt.quality,
                });
            }
        }

        if self.smallest.as_ref().is_none_or(|best| size < best.size()) {
            self.smallest = Some(attempt);
        }
    }

    fn finish(self, policy: FeasiblePolicy) -> Option<Attempt> {
        let feasible = match policy {
            FeasiblePolicy::SmallestSize => self.feasible_smallest,
            FeasiblePolicy::HighestQuality => self.feasible_highest,
        };
        feasible.or(self.smallest)
    }
}

/// 在体积预算内搜索尽可能高的质量。
///
/// 总会返回结果：找到可行解时返回可行解；否则返回搜索中体积最小的结果
/// （可能超出预算，由调用方比较 `size_in_bytes` 与预算）；若一次都未能探测
/// （例如超时为 0），直接以最低质量编码。
pub fn encode_under_budget<B: JpegBackend + ?Sized>(
    backend: &B,
    raster: &RgbaImage,
    max_bytes: u64,
    options: EncodeOptions,
) -> Result<EncodeResult, ImageError> {
    let options = options.normalized();
    let rgb: RgbImage = raster.convert();
    search(backend, &rgb, max_bytes, options)
}

fn search<B: JpegBackend + ?Sized>(
    backend: &B,
    raster: &RgbImage,
    max_bytes: u64,
    options: EncodeOptions,
) -> Result<EncodeResult, ImageError> {
    let started = Instant::now();
    let deadline = started + Duration::from_millis(options.timeout_ms);

    let mut lo = options.min_q;
    let mut hi = options.max_q;
    let mut state = SearchState::default();
    let mut iterations = 0;

    for i in 0..options.max_iters {
        if Instant::now() > deadline {
            log::info!("⏱️ 编码搜索超时，已完成 {} 次探测", i);
            break;
        }

        let quality = if i == 0 { hi } else { (lo + hi) / 2.0 };
        let bytes = encode_once(backend, raster, quality)?;
        let size = bytes.len();
        iterations = i + 1;

        log::debug!(
            "🔍 第 {} 次探测：q={:.4} size={} budget={}",
            iterations,
            quality,
            size,
            max_bytes
        );

        state.record(Attempt { bytes, quality }, max_bytes);

        if size as u64 <= max_bytes {
            lo = quality;
        } else {
            hi = quality;
        }

        if (hi - lo).abs() < CONVERGENCE_EPSILON {
            break;
        }
    }

    if let Some(attempt) = state.finish(options.policy) {
        let result = attempt.into_result();
        log::info!(
            "✅ 编码搜索完成 - 探测 {} 次，q={:.2} size={} budget={} 耗时 {}ms",
            iterations,
            result.quality,
            result.size_in_bytes,
            max_bytes,
            started.elapsed().as_millis()
        );
        return Ok(result);
    }

    log::warn!("⚠️ 编码搜索未产生结果，直接以最低质量 {:.2} 导出", options.min_q);
    let bytes = encode_once(backend, raster, options.min_q)?;
    Ok(Attempt {
        bytes,
        quality: options.min_q,
    }
    .into_result())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// 按“质量 → 体积”脚本产出字节的编码器。
    struct ScriptedBackend<F: Fn(f64) -> usize> {
        size_of: F,
        probes: RefCell<Vec<f64>>,
    }

    impl<F: Fn(f64) -> usize> ScriptedBackend<F> {
        fn new(size_of: F) -> Self {
            Self {
                size_of,
                probes: RefCell::new(Vec::new()),
            }
        }
    }

    impl<F: Fn(f64) -> usize> JpegBackend for ScriptedBackend<F> {
        fn encode_blob(&self, _: &RgbImage, quality: f64) -> Result<Option<Vec<u8>>, ImageError> {
            self.probes.borrow_mut().push(quality);
            Ok(Some(vec![0u8; (self.size_of)(quality)]))
        }

        fn encode_data_url(&self, _: &RgbImage, _: f64) -> Result<String, ImageError> {
            Err(ImageError::Encode("unused".into()))
        }
    }

    fn tiny_raster() -> RgbaImage {
        RgbaImage::new(4, 2)
    }

    #[test]
    fn finds_quality_under_cap() {
        let backend = ScriptedBackend::new(|q| (q * 2000.0).round() as usize);
        let result = encode_under_budget(&backend, &tiny_raster(), 1000, EncodeOptions::default())
            .expect("encode failed");

        assert!(result.size_in_bytes <= 1000);
        assert!(result.quality > 0.3 && result.quality < 0.6, "q={}", result.quality);
        assert_eq!(result.bytes.len(), result.size_in_bytes);
    }

    #[test]
    fn first_probe_uses_max_quality_and_exits_early() {
        let backend = ScriptedBackend::new(|_| 10);
        let result = encode_under_budget(&backend, &tiny_raster(), 1000, EncodeOptions::default())
            .expect("encode failed");

        assert_eq!(*backend.probes.borrow(), vec![0.95]);
        assert_eq!(result.quality, 0.95);
    }

    #[test]
    fn returns_smallest_when_nothing_fits() {
        let backend = ScriptedBackend::new(|q| 5000 + (q * 1000.0).round() as usize);
        let options = EncodeOptions {
            min_q: 0.4,
            max_q: 0.95,
            ..EncodeOptions::default()
        };
        let result = encode_under_budget(&backend, &tiny_raster(), 1000, options).expect("encode failed");

        assert!(result.size_in_bytes > 1000);
        assert!((0.4..=0.5).contains(&result.quality), "q={}", result.quality);
        let min_probe = backend
            .probes
            .borrow()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.size_in_bytes, 5000 + (min_probe * 1000.0).round() as usize);
    }

    #[test]
    fn respects_max_iters() {
        let backend = ScriptedBackend::new(|q| (q * 1_000_000.0) as usize);
        let options = EncodeOptions {
            max_iters: 3,
            ..EncodeOptions::default()
        };
        encode_under_budget(&backend, &tiny_raster(), 1, options).expect("encode failed");

        assert_eq!(backend.probes.borrow().len(), 3);
    }

    #[test]
    fn smallest_size_policy_keeps_smallest_feasible() {
        // 可行探测依次为 0.46875(938)、0.4859375(972)、0.49453125(989)
        let size_of = |q: f64| (q * 2000.0).round() as usize;

        let smallest = encode_under_budget(
            &ScriptedBackend::new(size_of),
            &tiny_raster(),
            1000,
            EncodeOptions::default(),
        )
        .expect("encode failed");
        assert_eq!(smallest.size_in_bytes, 938);
        assert_eq!(smallest.quality, 0.47);

        let highest = encode_under_budget(
            &ScriptedBackend::new(size_of),
            &tiny_raster(),
            1000,
            EncodeOptions {
                policy: FeasiblePolicy::HighestQuality,
                ..EncodeOptions::default()
            },
        )
        .expect("encode failed");
        assert_eq!(highest.size_in_bytes, 989);
        assert_eq!(highest.quality, 0.49);
    }

    #[test]
    fn policies_diverge_on_non_monotonic_mapping() {
        // 0.95 超预算；0.6 以上可行且体积相同，保留最先出现的那次
        let size_of = |q: f64| {
            if q > 0.9 {
                2000
            } else if q > 0.6 {
                900
            } else {
                300
            }
        };
        let options = EncodeOptions {
            min_q: 0.4,
            max_q: 0.95,
            max_iters: 8,
            ..EncodeOptions::default()
        };

        let smallest = encode_under_budget(
            &ScriptedBackend::new(size_of),
            &tiny_raster(),
            1000,
            options,
        )
        .expect("encode failed");
        let highest = encode_under_budget(
            &ScriptedBackend::new(size_of),
            &tiny_raster(),
            1000,
            EncodeOptions {
                policy: FeasiblePolicy::HighestQuality,
                ..options
            },
        )
        .expect("encode failed");

        assert_eq!(smallest.size_in_bytes, 900);
        assert!(highest.quality >= smallest.quality);
        assert!(highest.size_in_bytes <= 1000);
        assert!(highest.quality > 0.85, "q={}", highest.quality);
    }

    #[test]
    fn highest_quality_policy_converges_to_threshold() {
        // 单调映射，阈值 q = 0.5
        let backend = ScriptedBackend::new(|q| (q * 2000.0).round() as usize);
        let options = EncodeOptions {
            min_q: 0.1,
            max_q: 0.95,
            max_iters: 30,
            timeout_ms: 10_000,
            policy: FeasiblePolicy::HighestQuality,
        };
        let result = encode_under_budget(&backend, &tiny_raster(), 1000, options).expect("encode failed");

        assert!(result.size_in_bytes <= 1000);
        assert!((result.quality - 0.5).abs() <= 0.02, "q={}", result.quality);
    }

    #[test]
    fn zero_timeout_still_returns_result() {
        let backend = ScriptedBackend::new(|_| 42);
        let options = EncodeOptions {
            timeout_ms: 0,
            ..EncodeOptions::default()
        };
        let result = encode_under_budget(&backend, &tiny_raster(), 10, options).expect("encode failed");

        assert_eq!(result.size_in_bytes, 42);
        assert!(!backend.probes.borrow().is_empty());
    }

    #[test]
    fn timeout_truncates_search() {
        struct SlowBackend {
            calls: Cell<u32>,
        }

        impl JpegBackend for SlowBackend {
            fn encode_blob(&self, _: &RgbImage, _: f64) -> Result<Option<Vec<u8>>, ImageError> {
                self.calls.set(self.calls.get() + 1);
                std::thread::sleep(Duration::from_millis(40));
                Ok(Some(vec![0u8; 5000]))
            }

            fn encode_data_url(&self, _: &RgbImage, _: f64) -> Result<String, ImageError> {
                Err(ImageError::Encode("unused".into()))
            }
        }

        let backend = SlowBackend { calls: Cell::new(0) };
        let options = EncodeOptions {
            max_iters: 8,
            timeout_ms: 60,
            ..EncodeOptions::default()
        };
        let result = encode_under_budget(&backend, &tiny_raster(), 10, options).expect("encode failed");

        assert!(backend.calls.get() < 8, "calls={}", backend.calls.get());
        assert_eq!(result.size_in_bytes, 5000);
    }

    #[test]
    fn falls_back_to_data_url_when_blob_is_missing() {
        struct NullBlobBackend;

        impl JpegBackend for NullBlobBackend {
            fn encode_blob(&self, _: &RgbImage, _: f64) -> Result<Option<Vec<u8>>, ImageError> {
                Ok(None)
            }

            fn encode_data_url(&self, _: &RgbImage, _: f64) -> Result<String, ImageError> {
                // 1024 个 Base64 字符 → 768 字节
                Ok(format!("data:image/jpeg;base64,{}", "A".repeat(1024)))
            }
        }

        let result = encode_under_budget(&NullBlobBackend, &tiny_raster(), 1_000_000, EncodeOptions::default())
            .expect("encode failed");
        assert_eq!(result.size_in_bytes, 768);
    }

    #[test]
    fn fails_only_when_both_paths_fail() {
        struct BrokenBackend;

        impl JpegBackend for BrokenBackend {
            fn encode_blob(&self, _: &RgbImage, _: f64) -> Result<Option<Vec<u8>>, ImageError> {
                Err(ImageError::Encode("primary".into()))
            }

            fn encode_data_url(&self, _: &RgbImage, _: f64) -> Result<String, ImageError> {
                Ok("data:image/jpeg;base64,@@@not-base64@@@".to_string())
            }
        }

        let result = encode_under_budget(&BrokenBackend, &tiny_raster(), 1000, EncodeOptions::default());
        assert!(matches!(result, Err(ImageError::Encode(_))));
    }

    #[test]
    fn real_jpeg_backend_produces_jpeg() {
        let raster = RgbaImage::from_fn(64, 64, |x, y| image::Rgba([x as u8 * 4, y as u8 * 4, 128, 255]));
        let result = encode_under_budget(&ImageJpegBackend, &raster, 5 * 1024 * 1024, EncodeOptions::default())
            .expect("encode failed");

        assert_eq!(&result.bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(result.quality, 0.95);
    }

    #[test]
    fn codec_quality_is_clamped() {
        assert_eq!(codec_quality(0.0), 1);
        assert_eq!(codec_quality(0.404), 40);
        assert_eq!(codec_quality(0.95), 95);
        assert_eq!(codec_quality(2.0), 100);
        assert_eq!(codec_quality(f64::NAN), 1);
    }
}
