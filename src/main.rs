//! # 微信高清画布（命令行入口）
//!
//! 本文件仅负责参数解析、日志初始化与结果输出。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use wx_hd_canvas::canvas::{
    BackgroundMode, CanvasHandler, ExportOutcome, ImageError, ImageSource, OrientationMode,
    SourceSummary,
};
use wx_hd_canvas::error::AppError;
use wx_hd_canvas::{settings, storage};

const USAGE: &str = "用法: wx-hd-canvas <INPUT> [--mode landscape|portrait|auto] \
[--bg black|white|#hex] [--out DIR] [--config FILE] [--preview FILE.png] [--json]";

#[derive(Debug)]
struct CliArgs {
    input: PathBuf,
    /// `None` 表示 auto：按源图宽高选择。
    mode: Option<OrientationMode>,
    background: BackgroundMode,
    out_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    preview: Option<PathBuf>,
    json: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, AppError> {
    let mut input = None;
    let mut mode = None;
    let mut background = BackgroundMode::default();
    let mut out_dir = None;
    let mut config = None;
    let mut preview = None;
    let mut json = false;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let mut value_of = |flag: &str| {
            args.next()
                .ok_or_else(|| AppError::Config(format!("{} 缺少参数值\n{}", flag, USAGE)))
        };
        match arg.as_str() {
            "--mode" => {
                let value = value_of("--mode")?;
                mode = match value.as_str() {
                    "auto" => None,
                    other => Some(OrientationMode::from_str(other)?),
                };
            }
            "--bg" => background = BackgroundMode::from_str(&value_of("--bg")?)?,
            "--out" => out_dir = Some(PathBuf::from(value_of("--out")?)),
            "--config" => config = Some(PathBuf::from(value_of("--config")?)),
            "--preview" => preview = Some(PathBuf::from(value_of("--preview")?)),
            "--json" => json = true,
            "-h" | "--help" => return Err(AppError::Config(USAGE.to_string())),
            flag if flag.starts_with("--") => {
                return Err(AppError::Config(format!("未知参数 {}\n{}", flag, USAGE)));
            }
            _ if input.is_none() => input = Some(PathBuf::from(&arg)),
            _ => return Err(AppError::Config(format!("多余的输入 {}\n{}", arg, USAGE))),
        }
    }

    let input = input.ok_or_else(|| AppError::Config(format!("缺少输入图片\n{}", USAGE)))?;
    Ok(CliArgs {
        input,
        mode,
        background,
        out_dir,
        config,
        preview,
        json,
    })
}

async fn run(args: &CliArgs) -> Result<(SourceSummary, ExportOutcome, PathBuf), AppError> {
    let config = settings::load_config_or_default(args.config.as_deref())?;
    let handler = CanvasHandler::new(config);

    let summary = handler
        .select_source(ImageSource::FilePath(args.input.clone()))
        .await?;
    let mode = args.mode.unwrap_or(summary.suggested_mode);
    log::info!(
        "🖼️ 画布: {} 背景: {}",
        mode.as_str(),
        args.background.effective_hex()
    );

    if let Some(preview_path) = &args.preview {
        let preview = handler.render_preview(mode, &args.background)?;
        preview
            .save(preview_path)
            .map_err(|e| ImageError::Encode(format!("保存预览失败：{}", e)))?;
        log::info!("👀 预览已保存: {}", preview_path.display());
    }

    let outcome = handler.export(mode, &args.background).await?;
    let out_dir = storage::resolve_output_dir(args.out_dir.as_deref())?;
    let path = storage::write_export(&out_dir, &outcome)?;

    Ok((summary, outcome, path))
}

fn print_report(summary: &SourceSummary, outcome: &ExportOutcome, path: &std::path::Path) {
    let size_mb = outcome.size_in_bytes as f64 / 1024.0 / 1024.0;
    println!("已导出: {}", path.display());
    println!(
        "尺寸: {}x{}  体积: {:.2} MB  质量: {:.2}",
        outcome.width, outcome.height, size_mb, outcome.quality
    );
    if outcome.within_budget {
        println!("✅ 已满足 {:.2} MB 上限", outcome.max_bytes as f64 / 1024.0 / 1024.0);
    } else {
        println!(
            "⚠️ 未能压到 {:.2} MB 以内，已输出可达到的最小体积",
            outcome.max_bytes as f64 / 1024.0 / 1024.0
        );
    }
    if !summary.meets_ratio {
        println!("提示: 原图长短边比为 {:.2}，不足 2:1", summary.ratio);
    }
}

fn json_report(summary: &SourceSummary, outcome: &ExportOutcome, path: &std::path::Path) -> serde_json::Value {
    serde_json::json!({
        "path": path.to_string_lossy(),
        "file_name": outcome.file_name,
        "mode": outcome.mode,
        "width": outcome.width,
        "height": outcome.height,
        "size_in_bytes": outcome.size_in_bytes,
        "size_mb": format!("{:.2}", outcome.size_in_bytes as f64 / 1024.0 / 1024.0),
        "quality": outcome.quality,
        "max_bytes": outcome.max_bytes,
        "within_budget": outcome.within_budget,
        "source": summary,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    match run(&args).await {
        Ok((summary, outcome, path)) => {
            if args.json {
                println!("{}", json_report(&summary, &outcome, &path));
            } else {
                print_report(&summary, &outcome, &path);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("导出失败: {err}");
            if args.json {
                println!("{}", serde_json::json!({ "error": err }));
            } else {
                eprintln!("导出失败: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
