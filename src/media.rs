// 该文件是 Kanjian （看见） 项目的一部分。
// src/media.rs - 上传文件的类型与大小检查
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

//! 上传文件的准入检查。
//!
//! 检查发生在任何解码之前：超出大小限制的文件不会被读取，
//! 也不会产生任何检测结果或输出文件。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];

/// 图片默认上传上限：5 MiB
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("不支持的文件类型: {0}")]
  UnsupportedFormat(String),
  #[error("文件过大: {size} 字节，最大允许 {limit} 字节")]
  Oversized { size: u64, limit: u64 },
  #[error("文件类型不符: 期望 {expected}, 实际 {found}")]
  UnexpectedKind { expected: MediaKind, found: MediaKind },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Image,
  Video,
}

impl MediaKind {
  pub fn from_path(path: &Path) -> Result<Self, UploadError> {
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
      Ok(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
      Ok(MediaKind::Video)
    } else {
      Err(UploadError::UnsupportedFormat(path.display().to_string()))
    }
  }
}

impl std::fmt::Display for MediaKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MediaKind::Image => write!(f, "图片"),
      MediaKind::Video => write!(f, "视频"),
    }
  }
}

/// 按媒体类型限制上传大小，`None` 表示不限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
  pub max_image_bytes: Option<u64>,
  pub max_video_bytes: Option<u64>,
}

impl Default for UploadPolicy {
  fn default() -> Self {
    Self {
      max_image_bytes: Some(DEFAULT_MAX_IMAGE_BYTES),
      max_video_bytes: None,
    }
  }
}

/// 通过准入检查的上传文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
  pub path: PathBuf,
  pub kind: MediaKind,
  pub size: u64,
}

impl UploadPolicy {
  pub fn unlimited() -> Self {
    Self {
      max_image_bytes: None,
      max_video_bytes: None,
    }
  }

  pub fn limit_for(&self, kind: MediaKind) -> Option<u64> {
    match kind {
      MediaKind::Image => self.max_image_bytes,
      MediaKind::Video => self.max_video_bytes,
    }
  }

  pub fn admit(&self, path: &Path) -> Result<Upload, UploadError> {
    let kind = MediaKind::from_path(path)?;
    let size = std::fs::metadata(path)?.len();

    if let Some(limit) = self.limit_for(kind)
      && size > limit
    {
      warn!("上传文件过大: {} ({} > {})", path.display(), size, limit);
      return Err(UploadError::Oversized { size, limit });
    }

    debug!("接受{}文件: {} ({} 字节)", kind, path.display(), size);
    Ok(Upload {
      path: path.to_path_buf(),
      kind,
      size,
    })
  }

  pub fn admit_as(&self, path: &Path, expected: MediaKind) -> Result<Upload, UploadError> {
    let upload = self.admit(path)?;
    if upload.kind != expected {
      return Err(UploadError::UnexpectedKind {
        expected,
        found: upload.kind,
      });
    }
    Ok(upload)
  }
}

/// 将 `scheme:///path` 形式的 URL 转为本地路径
pub fn url_to_path(url: &Url) -> PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(raw),
  }
}
