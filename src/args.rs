// 该文件是 Kanjian （看见） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use kanjian::{
  media::UploadPolicy,
  model::LabelFilter,
  session::SessionConfig,
};

pub const DEFAULT_IMAGE_OUTPUT: &str = "hasil_deteksi.png";
pub const DEFAULT_VIDEO_OUTPUT: &str = "hasil_deteksi_video.mp4";

/// Kanjian 图片与视频目标检测标注工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型，例如 onnx:///models/yolov8n.onnx?size=640
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// - 图片: image:///path/to/in.jpg （jpg / jpeg / png）
  /// - 视频: video:///path/to/in.mp4 （mp4 / avi / mov）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径，省略时写到当前目录下的默认文件名
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)，覆盖模型 URL 中的 conf
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)，覆盖模型 URL 中的 iou
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,

  /// 只在表格中保留这些标签，可重复
  #[arg(long = "label", value_name = "LABEL")]
  pub labels: Vec<String>,

  /// 图片上传上限（MiB）
  #[arg(long, default_value_t = 5, value_name = "MIB")]
  pub max_image_mb: u64,

  /// 不限制上传大小
  #[arg(long, default_value_t = false)]
  pub no_size_limit: bool,

  /// 检测表格输出文件（.csv 或 .json）
  #[arg(long, value_name = "FILE")]
  pub table: Option<PathBuf>,
}

impl Args {
  pub fn session_config(&self) -> SessionConfig {
    let upload = if self.no_size_limit {
      UploadPolicy::unlimited()
    } else {
      UploadPolicy {
        max_image_bytes: Some(self.max_image_mb * 1024 * 1024),
        ..UploadPolicy::default()
      }
    };

    SessionConfig {
      upload,
      filter: LabelFilter::only(self.labels.iter().cloned()),
    }
  }

  /// 输出 URL；未指定时与输入同类型，写到当前目录
  pub fn output_url(&self) -> anyhow::Result<Url> {
    if let Some(output) = &self.output {
      return Ok(output.clone());
    }

    let name = if self.input.scheme() == "video" {
      DEFAULT_VIDEO_OUTPUT
    } else {
      DEFAULT_IMAGE_OUTPUT
    };
    let path = std::env::current_dir()?.join(name);
    let mut url = Url::parse(&format!("{}://", self.input.scheme()))?;
    url.set_path(&path.to_string_lossy());
    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn size_limit_flags() {
    let args = Args::parse_from([
      "kanjian",
      "--model",
      "onnx:///m.onnx",
      "--input",
      "image:///in.png",
      "--max-image-mb",
      "2",
    ]);
    assert_eq!(args.session_config().upload.max_image_bytes, Some(2 * 1024 * 1024));

    let args = Args::parse_from([
      "kanjian",
      "--model",
      "onnx:///m.onnx",
      "--input",
      "image:///in.png",
      "--no-size-limit",
    ]);
    assert_eq!(args.session_config().upload, UploadPolicy::unlimited());
  }

  #[test]
  fn repeated_labels_build_filter() {
    let args = Args::parse_from([
      "kanjian",
      "--model",
      "onnx:///m.onnx",
      "--input",
      "image:///in.png",
      "--label",
      "person",
      "--label",
      "car",
    ]);
    let filter = args.session_config().filter;
    assert!(filter.accepts("person"));
    assert!(filter.accepts("car"));
    assert!(!filter.accepts("dog"));
  }

  #[test]
  fn default_output_follows_input_kind() {
    let args = Args::parse_from([
      "kanjian",
      "--model",
      "onnx:///m.onnx",
      "--input",
      "video:///clip.mp4",
    ]);
    let url = args.output_url().unwrap();
    assert_eq!(url.scheme(), "video");
    assert!(url.path().ends_with(DEFAULT_VIDEO_OUTPUT));
  }
}
