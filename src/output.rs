// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 标注结果输出
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

use image::RgbImage;
use thiserror::Error;

/// 输出写入器：接收已标注的帧，按写入顺序保存
pub trait OutputWriter {
  type Error: std::error::Error + Send + Sync + 'static;

  /// 写入一帧
  fn write_frame(&mut self, image: &RgbImage) -> Result<(), Self::Error>;

  /// 完成写入并释放资源，重复调用无副作用
  fn finish(&mut self) -> Result<(), Self::Error>;
}

impl<O: OutputWriter + ?Sized> OutputWriter for &mut O {
  type Error = O::Error;

  fn write_frame(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    (**self).write_frame(image)
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    (**self).finish()
  }
}

pub mod table;
pub mod visualizer;
pub use self::visualizer::Visualizer;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}
