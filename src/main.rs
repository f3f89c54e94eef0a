// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kanjian::{
  FromUrl,
  model::{DetectItem, OnnxYoloBuilder},
  output::table,
  session::Session,
};

fn report_table(selected: &[DetectItem], table_path: Option<&std::path::Path>) -> Result<()> {
  let rows = table::rows(selected);
  if rows.is_empty() {
    info!("没有符合条件的检测结果");
  } else {
    info!("检测结果:\n{}", table::to_text(&rows));
  }
  if let Some(path) = table_path {
    table::write_table(path, &rows)?;
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();
  let output = args.output_url()?;

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", output);

  let session = Session::new(args.session_config())?;

  let mut builder = OnnxYoloBuilder::from_url(&args.model)?;
  if let Some(confidence) = args.confidence {
    builder = builder.confidence(confidence);
  }
  if let Some(iou) = args.iou {
    builder = builder.iou(iou);
  }
  info!("正在加载模型...");
  let model = builder.build()?;
  info!("模型加载完成, {} 个类别", model.labels().len());

  match args.input.scheme() {
    "image" => {
      let report = session.run_image(model, &args.input, &output)?;
      info!(
        "检测到 {} 个目标, 标签: {:?}",
        report.result.len(),
        report.result.labels()
      );
      report_table(&report.selected, args.table.as_deref())?;
    }
    #[cfg(all(feature = "gstreamer_input", feature = "gstreamer_output"))]
    "video" => {
      let report = session.run_video(
        model,
        &args.input,
        &output,
        kanjian::progress::LogProgress::new(),
      )?;
      if let kanjian::task::StreamEnd::DecodeFailed(reason) = &report.end {
        tracing::warn!("视频在第 {} 帧后被截断: {}", report.frames, reason);
      }
      info!("已写入 {} 帧", report.frames);
      if args.table.is_some() {
        tracing::warn!("视频路径不输出检测表格");
      }
    }
    other => {
      anyhow::bail!("不支持的输入方案: {}", other);
    }
  }

  info!("输出文件: {}", output);
  Ok(())
}
