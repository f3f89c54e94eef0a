// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use std::collections::BTreeSet;

use image::RgbImage;

/// 检测能力，作为参数显式传入标注函数
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

impl<M: Model + ?Sized> Model for &mut M {
  type Error = M::Error;

  fn infer(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    (**self).infer(image)
  }
}

impl<M: Model + ?Sized> Model for Box<M> {
  type Error = M::Error;

  fn infer(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    (**self).infer(image)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn new(class_id: u32, label: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
    let score = if score.is_nan() {
      0.0
    } else {
      score.clamp(0.0, 1.0)
    };
    Self {
      class_id,
      label: label.into(),
      score,
      bbox,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 结果中出现过的标签（去重、排序）
  pub fn labels(&self) -> BTreeSet<&str> {
    self.items.iter().map(|item| item.label.as_str()).collect()
  }

  /// 按标签筛选并按置信度降序排列，不修改原结果
  pub fn select(&self, filter: &LabelFilter) -> Vec<DetectItem> {
    let mut selected: Vec<DetectItem> = self
      .items
      .iter()
      .filter(|item| filter.accepts(&item.label))
      .cloned()
      .collect();
    selected.sort_by(|a, b| b.score.total_cmp(&a.score));
    selected
  }
}

/// 标签筛选条件，为空时保留全部
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
  labels: BTreeSet<String>,
}

impl LabelFilter {
  pub fn all() -> Self {
    Self::default()
  }

  pub fn only<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn accepts(&self, label: &str) -> bool {
    self.labels.is_empty() || self.labels.contains(label)
  }
}

mod labels;
pub use self::labels::{COCO_CLASSES, LabelMap};

pub mod postprocess;

#[cfg(feature = "model_onnx")]
mod onnx_yolo;
#[cfg(feature = "model_onnx")]
pub use self::onnx_yolo::{OnnxYolo, OnnxYoloBuilder, OnnxYoloError};

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> DetectResult {
    DetectResult::from(vec![
      DetectItem::new(2, "car", 0.41, [0.0, 0.0, 10.0, 10.0]),
      DetectItem::new(0, "person", 0.93, [5.0, 5.0, 20.0, 40.0]),
      DetectItem::new(0, "person", 0.57, [30.0, 5.0, 45.0, 40.0]),
      DetectItem::new(16, "dog", 0.88, [50.0, 50.0, 70.0, 65.0]),
    ])
  }

  #[test]
  fn no_filter_keeps_everything_sorted() {
    let rows = sample().select(&LabelFilter::all());
    assert_eq!(rows.len(), 4);
    let scores: Vec<f32> = rows.iter().map(|r| r.score).collect();
    assert_eq!(scores, vec![0.93, 0.88, 0.57, 0.41]);
  }

  #[test]
  fn filter_by_present_label() {
    let rows = sample().select(&LabelFilter::only(["person"]));
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.label == "person"));
    assert!(rows[0].score >= rows[1].score);
  }

  #[test]
  fn filter_by_several_labels() {
    let rows = sample().select(&LabelFilter::only(["dog", "car"]));
    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["dog", "car"]);
  }

  #[test]
  fn filter_by_absent_label_is_empty() {
    assert!(sample().select(&LabelFilter::only(["giraffe"])).is_empty());
  }

  #[test]
  fn select_leaves_result_untouched() {
    let result = sample();
    let before = result.clone();
    let _ = result.select(&LabelFilter::only(["dog"]));
    assert_eq!(result, before);
  }

  #[test]
  fn unique_labels() {
    let result = sample();
    let labels: Vec<&str> = result.labels().into_iter().collect();
    assert_eq!(labels, vec!["car", "dog", "person"]);
  }

  #[test]
  fn score_is_clamped() {
    assert_eq!(DetectItem::new(0, "a", 1.7, [0.0; 4]).score, 1.0);
    assert_eq!(DetectItem::new(0, "a", -0.2, [0.0; 4]).score, 0.0);
    assert_eq!(DetectItem::new(0, "a", f32::NAN, [0.0; 4]).score, 0.0);
  }
}
