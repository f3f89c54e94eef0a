// 该文件是 Kanjian （看见） 项目的一部分。
// src/session.rs - 标注会话
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

//! 一次请求的完整流程：准入检查、解码、标注、写出。
//!
//! 会话不保存请求之间的状态，所有设置都来自 [`SessionConfig`]。

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  media::{MediaKind, UploadError, UploadPolicy, url_to_path},
  model::{LabelFilter, Model},
  output::Visualizer,
};

#[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
use crate::{
  FromUrl, FromUrlWithScheme,
  input::{ImageFileInput, InputError},
  output::{OutputError, SaveImageFileOutput},
  task::{ImageReport, ImageTask, Task},
};

#[cfg(all(feature = "gstreamer_input", feature = "gstreamer_output"))]
use crate::{
  input::GStreamerVideoInput,
  output::GStreamerVideoOutput,
  progress::Progress,
  task::{VideoReport, VideoTask},
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("上传被拒绝: {0}")]
  Upload(#[from] UploadError),
  #[error("输入错误: {0}")]
  Input(#[from] crate::input::InputError),
  #[error("输出错误: {0}")]
  Output(#[from] crate::output::OutputError),
  #[error("字体加载失败: {0}")]
  Font(#[from] ab_glyph::InvalidFont),
  #[error(transparent)]
  Task(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
  pub upload: UploadPolicy,
  pub filter: LabelFilter,
}

pub struct Session {
  config: SessionConfig,
  visualizer: Visualizer,
}

impl Session {
  pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
    Ok(Self {
      config,
      visualizer: Visualizer::new()?,
    })
  }

  /// 检查上传文件；未通过时不会读取文件内容
  fn admit(&self, url: &Url, kind: MediaKind) -> Result<std::path::PathBuf, SessionError> {
    let upload = self.config.upload.admit_as(&url_to_path(url), kind)?;
    info!("{}已接受: {} ({} 字节)", kind, upload.path.display(), upload.size);
    Ok(upload.path)
  }

  /// 图片路径：准入、解码、推理一次、保存标注图片
  #[cfg(all(feature = "read_image_file", feature = "save_image_file"))]
  pub fn run_image<M: Model>(
    &self,
    model: M,
    input: &Url,
    output: &Url,
  ) -> Result<ImageReport, SessionError> {
    if input.scheme() != ImageFileInput::SCHEME {
      return Err(InputError::SchemeMismatch.into());
    }
    if output.scheme() != SaveImageFileOutput::SCHEME {
      return Err(OutputError::SchemeMismatch.into());
    }

    let path = self.admit(input, MediaKind::Image)?;
    let source = ImageFileInput::open(&path).map_err(InputError::from)?;
    let sink = SaveImageFileOutput::from_url(output).map_err(OutputError::from)?;

    let task = ImageTask::new(self.visualizer.clone(), self.config.filter.clone());
    Ok(task.run_task(source, model, sink)?)
  }

  /// 视频路径：输出视频与输入的分辨率、帧率一致
  #[cfg(all(feature = "gstreamer_input", feature = "gstreamer_output"))]
  pub fn run_video<M: Model, P: Progress>(
    &self,
    model: M,
    input: &Url,
    output: &Url,
    progress: P,
  ) -> Result<VideoReport, SessionError> {
    use crate::{
      FromUrlWithScheme,
      input::{InputError, InputSource},
      output::OutputError,
      task::Task,
    };

    if input.scheme() != GStreamerVideoInput::SCHEME {
      return Err(InputError::SchemeMismatch.into());
    }
    if output.scheme() != GStreamerVideoOutput::SCHEME {
      return Err(OutputError::SchemeMismatch.into());
    }

    let path = self.admit(input, MediaKind::Video)?;
    let source = GStreamerVideoInput::open(&path).map_err(InputError::from)?;
    let sink = GStreamerVideoOutput::create(&url_to_path(output), &source.info())
      .map_err(OutputError::from)?;

    let task = VideoTask::new(self.visualizer.clone(), progress);
    Ok(task.run_task(source, model, sink)?)
  }
}
