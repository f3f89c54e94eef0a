// 该文件是 Kanjian （看见） 项目的一部分。
// src/progress.rs - 视频处理进度
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

use tracing::info;

/// 处理中报告的进度上限，1.0 只在流结束后报告
pub const IN_FLIGHT_CEILING: f32 = 0.99;

/// 进度接收者，取值范围 [0, 1]
pub trait Progress {
  fn update(&mut self, fraction: f32);
}

impl<F: FnMut(f32)> Progress for F {
  fn update(&mut self, fraction: f32) {
    self(fraction)
  }
}

/// 不报告进度
pub struct NoProgress;

impl Progress for NoProgress {
  fn update(&mut self, _fraction: f32) {}
}

/// 按 10% 的步长写日志
#[derive(Debug, Default)]
pub struct LogProgress {
  last_step: Option<u32>,
}

impl LogProgress {
  pub fn new() -> Self {
    Self::default()
  }
}

impl Progress for LogProgress {
  fn update(&mut self, fraction: f32) {
    let step = (fraction.clamp(0.0, 1.0) * 10.0).floor() as u32;
    if self.last_step.is_none_or(|last| step > last) {
      self.last_step = Some(step);
      info!("处理进度: {}%", step * 10);
    }
  }
}

/// 由已处理帧数与估计总帧数计算进度
///
/// 总帧数只是估计值：实际帧数可能多于或少于它。
/// 处理中的值单调不减，且不超过 [`IN_FLIGHT_CEILING`]。
#[derive(Debug, Clone)]
pub struct ProgressTracker {
  total: Option<u64>,
  processed: u64,
  last: f32,
}

impl ProgressTracker {
  pub fn new(total: Option<u64>) -> Self {
    Self {
      total,
      processed: 0,
      last: 0.0,
    }
  }

  /// 记录一帧完成，返回当前进度
  pub fn advance(&mut self) -> f32 {
    self.processed += 1;
    let fraction = match self.total {
      Some(total) if total > 0 => {
        (self.processed as f64 / total as f64).min(IN_FLIGHT_CEILING as f64) as f32
      }
      _ => 0.0,
    };
    self.last = self.last.max(fraction);
    self.last
  }

  /// 流结束
  pub fn complete(&mut self) -> f32 {
    self.last = 1.0;
    self.last
  }

  pub fn processed(&self) -> u64 {
    self.processed
  }
}
