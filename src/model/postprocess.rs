// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/postprocess.rs - YOLO 输出解码与非极大值抑制
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

use crate::model::{DetectItem, LabelMap};

/// 等比缩放并居中填充到模型输入尺寸的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub resized_width: u32,
  pub resized_height: u32,
}

impl Letterbox {
  pub fn new(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
    let scale =
      (dst_width as f32 / src_width as f32).min(dst_height as f32 / src_height as f32);
    let resized_width = ((src_width as f32 * scale).round() as u32).clamp(1, dst_width);
    let resized_height = ((src_height as f32 * scale).round() as u32).clamp(1, dst_height);
    Self {
      scale,
      pad_x: ((dst_width - resized_width) / 2) as f32,
      pad_y: ((dst_height - resized_height) / 2) as f32,
      resized_width,
      resized_height,
    }
  }

  /// 模型坐标 -> 原图坐标，并裁剪到原图范围内
  pub fn restore(&self, bbox: [f32; 4], src_width: u32, src_height: u32) -> [f32; 4] {
    let w = src_width as f32;
    let h = src_height as f32;
    [
      ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
      ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
      ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
    ]
  }
}

/// 解码后的候选框，坐标仍在模型输入空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 输出张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  /// `[1, 4 + nc, N]`，YOLOv8/11 默认导出
  AttributesFirst { attributes: usize, anchors: usize },
  /// `[1, N, 4 + nc]`
  AnchorsFirst { attributes: usize, anchors: usize },
}

impl OutputLayout {
  /// 按形状推断布局
  ///
  /// `attributes` 为已知的 `4 + 类别数`，与某一维相等时按该维取属性轴；
  /// 两维都相等或都不相等时，取较小的一维作为属性轴。
  pub fn infer(shape: &[i64], attributes: Option<usize>) -> Option<Self> {
    if shape.len() != 3 || shape[0] != 1 {
      return None;
    }
    let (a, b) = (shape[1], shape[2]);
    if a <= 4 || b <= 4 {
      return None;
    }
    let (a, b) = (a as usize, b as usize);
    let attributes_first = match attributes {
      Some(n) if n == a && n != b => true,
      Some(n) if n == b && n != a => false,
      _ => a <= b,
    };
    if attributes_first {
      Some(OutputLayout::AttributesFirst {
        attributes: a,
        anchors: b,
      })
    } else {
      Some(OutputLayout::AnchorsFirst {
        attributes: b,
        anchors: a,
      })
    }
  }

  fn attributes(&self) -> usize {
    match *self {
      OutputLayout::AttributesFirst { attributes, .. } => attributes,
      OutputLayout::AnchorsFirst { attributes, .. } => attributes,
    }
  }

  fn anchors(&self) -> usize {
    match *self {
      OutputLayout::AttributesFirst { anchors, .. } => anchors,
      OutputLayout::AnchorsFirst { anchors, .. } => anchors,
    }
  }

  fn at(&self, data: &[f32], anchor: usize, attribute: usize) -> f32 {
    match *self {
      OutputLayout::AttributesFirst { anchors, .. } => data[attribute * anchors + anchor],
      OutputLayout::AnchorsFirst { attributes, .. } => data[anchor * attributes + attribute],
    }
  }
}

/// 逐锚点取最高类别分数，低于阈值的丢弃，`cxcywh` 转为 `xyxy`
pub fn decode_predictions(data: &[f32], layout: OutputLayout, conf_threshold: f32) -> Vec<Candidate> {
  let attributes = layout.attributes();
  let anchors = layout.anchors();
  if data.len() < attributes * anchors {
    return Vec::new();
  }

  let mut candidates = Vec::new();
  for anchor in 0..anchors {
    let mut best_class = 0usize;
    let mut best_score = f32::MIN;
    for class in 0..attributes - 4 {
      let score = layout.at(data, anchor, 4 + class);
      if score > best_score {
        best_score = score;
        best_class = class;
      }
    }

    if best_score < conf_threshold {
      continue;
    }

    let cx = layout.at(data, anchor, 0);
    let cy = layout.at(data, anchor, 1);
    let w = layout.at(data, anchor, 2);
    let h = layout.at(data, anchor, 3);

    candidates.push(Candidate {
      class_id: best_class as u32,
      score: best_score,
      bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
    });
  }
  candidates
}

/// 计算两个 `xyxy` 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别的非极大值抑制，结果按置信度降序
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
  for candidate in candidates {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) >= iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

/// 还原坐标并解析标签，丢弃还原后退化为空的框
pub fn to_detections(
  candidates: Vec<Candidate>,
  letterbox: &Letterbox,
  src_width: u32,
  src_height: u32,
  labels: &LabelMap,
) -> Vec<DetectItem> {
  candidates
    .into_iter()
    .filter_map(|c| {
      let bbox = letterbox.restore(c.bbox, src_width, src_height);
      if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
        return None;
      }
      Some(DetectItem::new(
        c.class_id,
        labels.resolve(c.class_id),
        c.score,
        bbox,
      ))
    })
    .collect()
}
