// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 帧与视频参数定义
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

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn still(image: RgbImage) -> Self {
    Self {
      image,
      index: 0,
      timestamp_ms: 0,
    }
  }
}

/// 帧率，按分数保存以避免取整误差
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
  pub numerator: i32,
  pub denominator: i32,
}

impl FrameRate {
  pub const fn new(numerator: i32, denominator: i32) -> Self {
    Self {
      numerator,
      denominator,
    }
  }

  pub fn as_f64(&self) -> f64 {
    if self.denominator == 0 {
      return 0.0;
    }
    self.numerator as f64 / self.denominator as f64
  }

  pub fn is_valid(&self) -> bool {
    self.numerator > 0 && self.denominator > 0
  }

  /// 第 `index` 帧的显示时间（纳秒）
  pub fn pts_ns(&self, index: u64) -> u64 {
    if !self.is_valid() {
      return 0;
    }
    let ns = index as u128 * self.denominator as u128 * NANOS_PER_SECOND / self.numerator as u128;
    ns as u64
  }

  /// 单帧时长（纳秒）
  pub fn frame_duration_ns(&self) -> u64 {
    self.pts_ns(1)
  }
}

impl Default for FrameRate {
  fn default() -> Self {
    Self::new(30, 1)
  }
}

impl std::fmt::Display for FrameRate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.numerator, self.denominator)
  }
}

/// 输入源参数，在处理开始前读取一次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
  pub width: u32,
  pub height: u32,
  /// 图片没有帧率
  pub fps: Option<FrameRate>,
  /// 帧数估计值，仅用于计算进度
  pub frame_count: Option<u64>,
}

impl VideoInfo {
  pub fn still(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      fps: None,
      frame_count: Some(1),
    }
  }
}
