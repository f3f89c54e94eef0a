// 该文件是 Kanjian （看见） 项目的一部分。
// tests/common/mod.rs - 集成测试公用桩
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

#![allow(dead_code)]

use image::{Rgb, RgbImage};
use kanjian::{
  frame::{Frame, FrameRate, VideoInfo},
  input::{InputError, InputSource},
  model::{DetectItem, DetectResult, Model},
  output::OutputWriter,
};

/// 返回固定结果的模型，记录调用次数
#[derive(Default)]
pub struct StubModel {
  pub items: Vec<DetectItem>,
  pub calls: usize,
  /// 第 n 次调用（从 1 开始）返回错误
  pub fail_on: Option<usize>,
}

impl StubModel {
  pub fn with_items(items: Vec<DetectItem>) -> Self {
    Self {
      items,
      ..Self::default()
    }
  }
}

impl Model for StubModel {
  type Error = std::io::Error;

  fn infer(&mut self, _image: &RgbImage) -> Result<DetectResult, Self::Error> {
    self.calls += 1;
    if self.fail_on == Some(self.calls) {
      return Err(std::io::Error::other("推理失败"));
    }
    Ok(DetectResult::from(self.items.clone()))
  }
}

/// 内存中的帧序列
pub struct VecSource {
  frames: std::vec::IntoIter<Result<Frame, InputError>>,
  info: VideoInfo,
}

impl VecSource {
  pub fn new(frames: Vec<Result<Frame, InputError>>, frame_count: Option<u64>) -> Self {
    Self {
      frames: frames.into_iter(),
      info: VideoInfo {
        width: WIDTH,
        height: HEIGHT,
        fps: Some(FrameRate::new(25, 1)),
        frame_count,
      },
    }
  }

  /// `n` 帧，第 i 帧的像素值为 i
  pub fn numbered(n: u8, frame_count: Option<u64>) -> Self {
    Self::new((0..n).map(|i| Ok(numbered_frame(i))).collect(), frame_count)
  }
}

impl Iterator for VecSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.next()
  }
}

impl InputSource for VecSource {
  fn info(&self) -> VideoInfo {
    self.info
  }
}

pub const WIDTH: u32 = 32;
pub const HEIGHT: u32 = 24;

pub fn numbered_frame(i: u8) -> Frame {
  Frame {
    image: RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([i, i, i])),
    index: i as u64,
    timestamp_ms: i as u64 * 40,
  }
}

/// 记录写入帧的输出
#[derive(Default)]
pub struct RecordingSink {
  pub frames: Vec<RgbImage>,
  pub finished: usize,
  /// 第 n 次写入（从 1 开始）返回错误
  pub fail_on: Option<usize>,
}

impl OutputWriter for RecordingSink {
  type Error = std::io::Error;

  fn write_frame(&mut self, image: &RgbImage) -> Result<(), Self::Error> {
    if self.fail_on == Some(self.frames.len() + 1) {
      return Err(std::io::Error::other("磁盘已满"));
    }
    self.frames.push(image.clone());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Self::Error> {
    self.finished += 1;
    Ok(())
  }
}
