//! # 背景色模块
//!
//! 自定义十六进制颜色在进入合成器之前完成校验与标准化，
//! 非法输入静默回退为黑色，合成器只接收确定的不透明颜色。

use image::Rgba;
use once_cell::sync::Lazy;
use regex::Regex;

use super::ImageError;

const FALLBACK_HEX: &str = "#000000";

static HEX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#?([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("hex pattern is valid")
});

/// 是否为合法的 `#RGB` / `#RRGGBB`（`#` 可省略，大小写皆可）。
pub fn is_valid_hex(input: &str) -> bool {
    let s = input.trim();
    !s.is_empty() && HEX_PATTERN.is_match(s)
}

/// 标准化为小写 `#rrggbb`；非法输入回退为 `#000000`。
pub fn ensure_hex6(input: &str) -> String {
    if !is_valid_hex(input) {
        return FALLBACK_HEX.to_string();
    }

    let digits = input.trim().trim_start_matches('#').to_lowercase();
    if digits.len() == 3 {
        let expanded: String = digits.chars().flat_map(|c| [c, c]).collect();
        return format!("#{}", expanded);
    }
    format!("#{}", digits)
}

/// 背景填充模式。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackgroundMode {
    #[default]
    Black,
    White,
    /// 用户输入的原始文本，使用前再标准化。
    Custom(String),
}

impl BackgroundMode {
    /// 解析命令行/配置文本：`black`、`white` 或十六进制颜色。
    pub fn from_str(input: &str) -> Result<Self, ImageError> {
        match input.trim().to_lowercase().as_str() {
            "black" => Ok(Self::Black),
            "white" => Ok(Self::White),
            "" => Err(ImageError::InvalidFormat(
                "背景色不能为空（可选：black / white / #RRGGBB）".to_string(),
            )),
            _ => Ok(Self::Custom(input.trim().to_string())),
        }
    }

    /// 实际生效的颜色（`#rrggbb`）。
    pub fn effective_hex(&self) -> String {
        match self {
            Self::Black => FALLBACK_HEX.to_string(),
            Self::White => "#ffffff".to_string(),
            Self::Custom(hex) => {
                if !is_valid_hex(hex) {
                    log::warn!("⚠️ 自定义背景色无效，回退为黑色：{}", hex);
                }
                ensure_hex6(hex)
            }
        }
    }

    pub fn to_rgba(&self) -> Rgba<u8> {
        hex6_to_rgba(&self.effective_hex())
    }
}

/// `#rrggbb` → 不透明像素。调用方需保证输入已经过 [`ensure_hex6`]。
fn hex6_to_rgba(hex: &str) -> Rgba<u8> {
    let digits = hex.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        digits
            .get(range)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .unwrap_or(0)
    };
    Rgba([channel(0..2), channel(2..4), channel(4..6), 255])
}
