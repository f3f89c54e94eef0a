// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频输入模块
//!
//! 按顺序解码视频文件（mp4 / avi / mov），逐帧产出 RGB 图像。
//!
//! ## 系统依赖
//!
//! 使用前需要安装 GStreamer 开发库及常用插件：
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!   gstreamer1.0-plugins-good gstreamer1.0-plugins-bad gstreamer1.0-libav
//! ```
//!
//! ## 基本用法
//!
//! ```no_run
//! use kanjian::{FromUrl, input::GStreamerVideoInput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("video:///data/clip.mp4")?;
//! let input = GStreamerVideoInput::from_url(&url)?;
//!
//! for frame in input {
//!     let frame = frame?;
//!     println!("帧 {}: {}x{}", frame.index, frame.image.width(), frame.image.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! 与实时流输入不同，appsink 不丢帧：解码速度受推理速度反压。

use std::path::Path;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameRate, VideoInfo},
  input::{InputError, InputSource},
  media::url_to_path,
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "video://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取管道元素
  #[error("Failed to get element: {0}")]
  ElementNotFound(&'static str),
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

const GSTREAMER_INPUT_PIPELINE: &str = "filesrc name=src ! decodebin ! videoconvert ! \
  video/x-raw,format=RGB ! appsink name=sink sync=false max-buffers=4 drop=false";

/// 等待预卷（读取视频参数）的超时时间
const PREROLL_TIMEOUT_SECS: u64 = 30;

/// GStreamer 视频输入
///
/// 管理解码管道与 appsink。管道在 `Drop` 时置为 `Null` 状态释放资源。
pub struct GStreamerVideoInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  info: VideoInfo,
  frame_index: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerVideoInput {
  const SCHEME: &'static str = "video";
}

impl FromUrl for GStreamerVideoInput {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerInputError::SchemeMismatch);
    }

    Self::open(&url_to_path(url))
  }
}

impl GStreamerVideoInput {
  pub fn open(path: &Path) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    info!("GStreamer pipeline description: {}", GSTREAMER_INPUT_PIPELINE);
    let pipeline = gst::parse::launch(GSTREAMER_INPUT_PIPELINE)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let filesrc = pipeline
      .by_name("src")
      .ok_or(GStreamerInputError::ElementNotFound("filesrc"))?;
    filesrc.set_property("location", path.to_string_lossy().as_ref());

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::ElementNotFound("appsink"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::ElementNotFound("appsink"))?;

    let mut input = GStreamerVideoInput {
      pipeline,
      appsink,
      info: VideoInfo::still(0, 0),
      frame_index: 0,
      finished: false,
    };
    // 此后出错时由 Drop 释放管道
    input.info = input.preroll()?;

    info!(
      "视频已打开: {} ({}x{} @ {} fps, 约 {} 帧)",
      path.display(),
      input.info.width,
      input.info.height,
      input.info.fps.unwrap_or_default(),
      input
        .info
        .frame_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "未知".to_string())
    );

    input.pipeline.set_state(gst::State::Playing)?;
    Ok(input)
  }

  /// 预卷到 Paused 状态，读取分辨率、帧率，并按时长估计帧数
  fn preroll(&self) -> Result<VideoInfo, GStreamerInputError> {
    self.pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Err(e) = result {
      return Err(match self.bus_error() {
        Some(message) => GStreamerInputError::PipelineError(message),
        None => GStreamerInputError::StateChangeError(e),
      });
    }

    // 预卷的样本在 Playing 后仍会作为第一帧返回
    let sample = self.appsink.pull_preroll()?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = video_info.fps();
    let fps = FrameRate::new(fps.numer(), fps.denom());
    let frame_count = if fps.is_valid() {
      self
        .pipeline
        .query_duration::<gst::ClockTime>()
        .map(|duration| (duration.nseconds() as f64 * fps.as_f64() / 1e9).round() as u64)
    } else {
      None
    };

    Ok(VideoInfo {
      width: video_info.width(),
      height: video_info.height(),
      fps: fps.is_valid().then_some(fps),
      frame_count,
    })
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(format!(
        "{} ({})",
        err.error(),
        err.debug().map(|d| d.to_string()).unwrap_or_default()
      )),
      _ => None,
    }
  }

  fn convert_sample(&self, sample: gst::Sample) -> Result<Frame, GStreamerInputError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let width = video_info.width() as usize;
    let height = video_info.height() as usize;
    let stride = video_info.stride()[0] as usize;

    let map = buffer.map_readable().map_err(|e| {
      GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
    })?;
    let pixels = packed_rgb(map.as_slice(), width, height, stride, video_info.format())?;

    let image = RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
      GStreamerInputError::BufferSizeMismatch {
        expected: width * height * 3,
        actual: 0,
      },
    )?;

    let timestamp_ms = buffer.pts().map(|pts| pts.mseconds()).unwrap_or(0);

    Ok(Frame {
      image,
      index: self.frame_index,
      timestamp_ms,
    })
  }
}

/// 去掉每行的对齐填充，得到紧凑的 RGB 数据；BGR 会交换通道
fn packed_rgb(
  data: &[u8],
  width: usize,
  height: usize,
  stride: usize,
  format: gst_video::VideoFormat,
) -> Result<Vec<u8>, GStreamerInputError> {
  if !matches!(
    format,
    gst_video::VideoFormat::Rgb | gst_video::VideoFormat::Bgr
  ) {
    return Err(GStreamerInputError::UnsupportedFormat(format));
  }

  let row_bytes = width * 3;
  if stride < row_bytes {
    return Err(GStreamerInputError::PipelineError(format!(
      "行跨度 {} 小于行宽 {}",
      stride, row_bytes
    )));
  }

  // 最后一行不要求包含对齐填充
  let expected = stride * height.saturating_sub(1) + row_bytes;
  if height > 0 && data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for y in 0..height {
    let row = &data[y * stride..y * stride + row_bytes];
    if format == gst_video::VideoFormat::Bgr {
      for bgr in row.chunks_exact(3) {
        pixels.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
      }
    } else {
      pixels.extend_from_slice(row);
    }
  }
  Ok(pixels)
}

impl Drop for GStreamerVideoInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
    debug!("视频输入已释放, 共解码 {} 帧", self.frame_index);
  }
}

impl Iterator for GStreamerVideoInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.appsink.pull_sample() {
      Ok(sample) => match self.convert_sample(sample) {
        Ok(frame) => {
          self.frame_index += 1;
          Some(Ok(frame))
        }
        Err(e) => {
          self.finished = true;
          Some(Err(e.into()))
        }
      },
      Err(_) => {
        self.finished = true;
        match self.bus_error() {
          Some(message) => {
            error!("视频解码失败: {}", message);
            Some(Err(InputError::FrameDecode(message)))
          }
          None if self.appsink.is_eos() => None,
          None => Some(Err(InputError::FrameDecode(
            "appsink 停止产出样本".to_string(),
          ))),
        }
      }
    }
  }
}

impl InputSource for GStreamerVideoInput {
  fn info(&self) -> VideoInfo {
    self.info
  }
}
