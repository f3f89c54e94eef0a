// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 图片与视频标注任务
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
use tracing::{debug, info, warn};

use crate::{
  frame::VideoInfo,
  input::InputSource,
  model::{DetectItem, DetectResult, LabelFilter, Model},
  output::{OutputWriter, Visualizer},
  progress::{Progress, ProgressTracker},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 一次推理的结果及对应的标注图像
#[derive(Debug, Clone)]
pub struct Annotated {
  pub image: RgbImage,
  pub result: DetectResult,
}

/// 推理一次并绘制标注，输入图像不被修改
pub fn annotate_frame<M: Model>(
  model: &mut M,
  visualizer: &Visualizer,
  image: &RgbImage,
) -> Result<Annotated, M::Error> {
  let result = model.infer(image)?;
  let image = visualizer.render(image, &result);
  Ok(Annotated { image, result })
}

/// 单张图片任务
pub struct ImageTask {
  visualizer: Visualizer,
  filter: LabelFilter,
}

#[derive(Debug, Clone)]
pub struct ImageReport {
  /// 完整的检测结果
  pub result: DetectResult,
  /// 筛选后按置信度降序排列的表格行
  pub selected: Vec<DetectItem>,
  pub info: VideoInfo,
}

impl ImageTask {
  pub fn new(visualizer: Visualizer, filter: LabelFilter) -> Self {
    Self { visualizer, filter }
  }
}

impl<I, M, O> Task<I, M, O> for ImageTask
where
  I: InputSource,
  M: Model,
  O: OutputWriter,
{
  type Output = ImageReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, mut output: O) -> Result<ImageReport, Self::Error> {
    let info = input.info();
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("图片读取成功 ({}x{})，开始推理...", info.width, info.height);

    let now = std::time::Instant::now();
    let annotated = annotate_frame(&mut model, &self.visualizer, &frame.image)?;
    info!(
      "推理完成，检测到 {} 个目标，耗时: {:.2?}",
      annotated.result.len(),
      now.elapsed()
    );

    output.write_frame(&annotated.image)?;
    output.finish()?;

    let selected = annotated.result.select(&self.filter);
    Ok(ImageReport {
      result: annotated.result,
      selected,
      info,
    })
  }
}

/// 视频循环结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
  /// 正常读完
  Exhausted,
  /// 某一帧解码失败，输出视频只包含此前的帧
  DecodeFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoReport {
  /// 已写入输出的帧数
  pub frames: u64,
  pub end: StreamEnd,
  pub info: VideoInfo,
}

impl VideoReport {
  pub fn is_complete(&self) -> bool {
    self.end == StreamEnd::Exhausted
  }
}

/// 逐帧视频任务
///
/// 每次只持有一帧：读取、推理、标注、写入，再读取下一帧。
/// 无论循环如何结束，输出都会被 `finish`。
pub struct VideoTask<P> {
  visualizer: Visualizer,
  progress: P,
}

impl<P: Progress> VideoTask<P> {
  pub fn new(visualizer: Visualizer, progress: P) -> Self {
    Self {
      visualizer,
      progress,
    }
  }

  fn run_loop<I, M, O>(
    &mut self,
    input: &mut I,
    model: &mut M,
    output: &mut O,
    tracker: &mut ProgressTracker,
  ) -> anyhow::Result<StreamEnd>
  where
    I: InputSource,
    M: Model,
    O: OutputWriter,
  {
    for frame in input {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          warn!("第 {} 帧解码失败，提前结束: {}", tracker.processed(), e);
          return Ok(StreamEnd::DecodeFailed(e.to_string()));
        }
      };

      let annotated = annotate_frame(model, &self.visualizer, &frame.image)?;
      output.write_frame(&annotated.image)?;

      let fraction = tracker.advance();
      debug!(
        "第 {} 帧 ({} ms): {} 个目标",
        frame.index,
        frame.timestamp_ms,
        annotated.result.len()
      );
      self.progress.update(fraction);
    }
    Ok(StreamEnd::Exhausted)
  }
}

impl<I, M, O, P> Task<I, M, O> for VideoTask<P>
where
  I: InputSource,
  M: Model,
  O: OutputWriter,
  P: Progress,
{
  type Output = VideoReport;
  type Error = anyhow::Error;

  fn run_task(
    mut self,
    mut input: I,
    mut model: M,
    mut output: O,
  ) -> Result<VideoReport, Self::Error> {
    let info = input.info();
    info!(
      "开始处理视频: {}x{}, 预计 {} 帧",
      info.width,
      info.height,
      info
        .frame_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "未知".to_string())
    );

    let now = std::time::Instant::now();
    let mut tracker = ProgressTracker::new(info.frame_count);
    self.progress.update(0.0);

    let end = match self.run_loop(&mut input, &mut model, &mut output, &mut tracker) {
      Ok(end) => end,
      Err(e) => {
        if let Err(finish_err) = output.finish() {
          warn!("出错后关闭输出失败: {}", finish_err);
        }
        return Err(e);
      }
    };

    output.finish()?;
    self.progress.update(tracker.complete());

    info!(
      "视频处理完成: {} 帧，耗时: {:.2?}",
      tracker.processed(),
      now.elapsed()
    );
    Ok(VideoReport {
      frames: tracker.processed(),
      end,
      info,
    })
  }
}
