// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧按写入顺序编码为 MP4 (H.264) 文件，帧率与输入一致。
//!
//! ## URL Scheme
//!
//! `video://`
//!
//! ```no_run
//! use kanjian::{FromUrl, output::GStreamerVideoOutput};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let url = Url::parse("video:///tmp/hasil_deteksi_video.mp4?width=1280&height=720&fps=30000/1001")?;
//! let output = GStreamerVideoOutput::from_url(&url)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 参数说明
//!
//! - `width` / `height`: 帧尺寸（像素），必须与写入的帧一致
//! - `fps`: 帧率，整数或分数，默认 30
//!
//! 文件在 [`OutputWriter::finish`] 之后才完整可播放。

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameRate, VideoInfo},
  media::url_to_path,
  output::OutputWriter,
};

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get element: {0}")]
  ElementNotFound(&'static str),
  /// 参数无效
  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),
  /// 帧尺寸与输出不一致
  #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
  FrameSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 推送缓冲区失败
  #[error("Flow error: {0:?}")]
  FlowError(gst::FlowError),
  /// 输出已结束
  #[error("Output already finished")]
  Finished,
}

/// x264 的 4:2:0 输入要求宽高均为偶数，奇数尺寸使用 4:4:4
fn encoder_format(width: u32, height: u32) -> &'static str {
  if width % 2 == 0 && height % 2 == 0 {
    "I420"
  } else {
    "Y444"
  }
}

fn output_pipeline(width: u32, height: u32) -> String {
  format!(
    "appsrc name=src ! videoconvert ! video/x-raw,format={} ! \
     x264enc speed-preset=fast ! h264parse ! mp4mux ! filesink name=sink",
    encoder_format(width, height)
  )
}

/// 等待编码器写完文件尾的超时时间
const EOS_TIMEOUT_SECS: u64 = 60;

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  path: PathBuf,
  width: u32,
  height: u32,
  stride: usize,
  fps: FrameRate,
  frames_written: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "video";
}

fn parse_fps(value: &str) -> Option<FrameRate> {
  let fps = match value.split_once('/') {
    Some((n, d)) => FrameRate::new(n.trim().parse().ok()?, d.trim().parse().ok()?),
    None => FrameRate::new(value.trim().parse().ok()?, 1),
  };
  fps.is_valid().then_some(fps)
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let query_pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
    let dimension = |key: &'static str| -> Result<u32, GStreamerVideoOutputError> {
      query_pairs
        .get(key)
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| GStreamerVideoOutputError::InvalidParameter(format!("缺少或无效的 {key}")))
    };
    let width = dimension("width")?;
    let height = dimension("height")?;
    let fps = match query_pairs.get("fps") {
      Some(v) => parse_fps(v)
        .ok_or_else(|| GStreamerVideoOutputError::InvalidParameter(format!("无效的帧率 {v}")))?,
      None => FrameRate::default(),
    };

    Self::create(
      &url_to_path(url),
      &VideoInfo {
        width,
        height,
        fps: Some(fps),
        frame_count: None,
      },
    )
  }
}

impl GStreamerVideoOutput {
  /// 按输入参数创建编码管道；输入没有帧率时使用 30 fps
  pub fn create(path: &Path, info: &VideoInfo) -> Result<Self, GStreamerVideoOutputError> {
    if info.width == 0 || info.height == 0 {
      return Err(GStreamerVideoOutputError::InvalidParameter(format!(
        "无效的帧尺寸 {}x{}",
        info.width, info.height
      )));
    }
    let fps = info.fps.filter(FrameRate::is_valid).unwrap_or_default();

    gst::init()?;

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)
        .map_err(|e| GStreamerVideoOutputError::PipelineError(format!("创建输出目录失败: {e}")))?;
    }

    let description = output_pipeline(info.width, info.height);
    info!("Creating video output pipeline: {}", description);
    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let filesink = pipeline
      .by_name("sink")
      .ok_or(GStreamerVideoOutputError::ElementNotFound("filesink"))?;
    filesink.set_property("location", path.to_string_lossy().as_ref());

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::ElementNotFound("appsrc"))?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::ElementNotFound("appsrc"))?;

    let video_info =
      gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, info.width, info.height)
        .fps(gst::Fraction::new(fps.numerator, fps.denominator))
        .build()?;
    appsrc.set_caps(Some(&video_info.to_caps()?));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "视频输出已创建: {}x{} @ {} fps -> {}",
      info.width,
      info.height,
      fps,
      path.display()
    );

    Ok(GStreamerVideoOutput {
      pipeline,
      appsrc,
      path: path.to_path_buf(),
      width: info.width,
      height: info.height,
      stride: video_info.stride()[0] as usize,
      fps,
      frames_written: 0,
      finished: false,
    })
  }

  fn push_frame(&mut self, image: &RgbImage) -> Result<(), GStreamerVideoOutputError> {
    let row_bytes = self.width as usize * 3;
    let mut data = vec![0u8; self.stride * self.height as usize];
    for (dst, src) in data
      .chunks_exact_mut(self.stride)
      .zip(image.as_raw().chunks_exact(row_bytes))
    {
      dst[..row_bytes].copy_from_slice(src);
    }

    let mut buffer = gst::Buffer::from_mut_slice(data);
    {
      let buffer_ref = buffer.get_mut().ok_or_else(|| {
        GStreamerVideoOutputError::PipelineError("Buffer is not writable".to_string())
      })?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.fps.pts_ns(self.frames_written),
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.fps.frame_duration_ns()));
    }

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(GStreamerVideoOutputError::FlowError)?;
    self.frames_written += 1;
    Ok(())
  }

  /// 发送 EOS 并等待 mp4mux 写完文件尾
  fn close(&mut self) -> Result<(), GStreamerVideoOutputError> {
    self.finished = true;

    let eos = self
      .appsrc
      .end_of_stream()
      .map_err(GStreamerVideoOutputError::FlowError);

    let mut result = eos.map(|_| ());
    if result.is_ok()
      && let Some(bus) = self.pipeline.bus()
    {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      result = match message {
        Some(message) => match message.view() {
          gst::MessageView::Error(err) => Err(GStreamerVideoOutputError::PipelineError(format!(
            "{} ({})",
            err.error(),
            err.debug().map(|d| d.to_string()).unwrap_or_default()
          ))),
          _ => Ok(()),
        },
        None => Err(GStreamerVideoOutputError::PipelineError(
          "等待编码结束超时".to_string(),
        )),
      };
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
    info!(
      "视频输出已关闭: {} (共写入 {} 帧)",
      self.path.display(),
      self.frames_written
    );
    result
  }
}

impl OutputWriter for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn write_frame(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    if self.finished {
      return Err(GStreamerVideoOutputError::Finished);
    }
    if image.dimensions() != (self.width, self.height) {
      return Err(GStreamerVideoOutputError::FrameSizeMismatch {
        expected: (self.width, self.height),
        actual: image.dimensions(),
      });
    }
    self.push_frame(image)?;
    debug!("已写入第 {} 帧", self.frames_written);
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    if self.finished {
      return Ok(());
    }
    self.close()
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if !self.finished
      && let Err(e) = self.close()
    {
      warn!("关闭视频输出失败: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fps_accepts_integer_and_fraction() {
    assert_eq!(parse_fps("25"), Some(FrameRate::new(25, 1)));
    assert_eq!(parse_fps("30000/1001"), Some(FrameRate::new(30000, 1001)));
    assert_eq!(parse_fps("0"), None);
    assert_eq!(parse_fps("abc"), None);
  }

  #[test]
  fn odd_sizes_encode_as_444() {
    assert_eq!(encoder_format(1280, 720), "I420");
    assert_eq!(encoder_format(853, 480), "Y444");
    assert_eq!(encoder_format(640, 361), "Y444");
    assert!(output_pipeline(853, 480).contains("format=Y444 ! x264enc"));
    assert!(output_pipeline(1920, 1080).contains("format=I420 ! x264enc"));
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("image:///tmp/out.png").unwrap();
    assert!(matches!(
      GStreamerVideoOutput::from_url(&url),
      Err(GStreamerVideoOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn requires_dimensions() {
    let url = Url::parse("video:///tmp/out.mp4?fps=30").unwrap();
    assert!(matches!(
      GStreamerVideoOutput::from_url(&url),
      Err(GStreamerVideoOutputError::InvalidParameter(_))
    ));
  }
}
