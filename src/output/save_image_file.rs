// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图片
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

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, media::url_to_path, output::OutputWriter};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("不支持的输出格式: {0}")]
  UnsupportedFormat(String),
  #[error("图片输出只接受一帧")]
  AlreadyWritten,
}

/// 单张图片输出，格式由扩展名决定（PNG 或 JPEG）
///
/// 只在写入帧时创建文件。
pub struct SaveImageFileOutput {
  path: PathBuf,
  format: ImageFormat,
  written: bool,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Self::new(url_to_path(uri))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Result<Self, SaveImageFileError> {
    let path = path.into();
    let format = match path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase)
      .as_deref()
    {
      Some("png") => ImageFormat::Png,
      Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
      _ => return Err(SaveImageFileError::UnsupportedFormat(path.display().to_string())),
    };

    Ok(Self {
      path,
      format,
      written: false,
    })
  }

  /// 下载时使用的 MIME 类型
  pub fn mime_type(&self) -> &'static str {
    self.format.to_mime_type()
  }
}

impl OutputWriter for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn write_frame(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    if self.written {
      return Err(SaveImageFileError::AlreadyWritten);
    }

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save_with_format(&self.path, self.format)?;
    self.written = true;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    Ok(())
  }
}
