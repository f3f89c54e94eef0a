// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/onnx_yolo.rs - 基于 ONNX Runtime 的 YOLO 检测器
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

use std::collections::HashMap;
use std::path::PathBuf;

use image::{RgbImage, imageops::FilterType};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  media::url_to_path,
  model::{
    DetectResult, LabelMap, Model,
    postprocess::{Letterbox, OutputLayout, decode_predictions, non_max_suppression, to_detections},
  },
};

const ONNX_YOLO_INPUT_SIZE: u32 = 640;
const ONNX_YOLO_CONF_THRESH: f32 = 0.25;
const ONNX_YOLO_IOU_THRESH: f32 = 0.45;
const ONNX_YOLO_PAD_VALUE: f32 = 114.0 / 255.0;
const ONNX_YOLO_NAMES_KEY: &str = "names";

#[derive(Error, Debug)]
pub enum OnnxYoloError {
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

pub struct OnnxYoloBuilder {
  model_path: PathBuf,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
  labels: Option<LabelMap>,
}

impl FromUrlWithScheme for OnnxYoloBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxYoloBuilder {
  type Error = OnnxYoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OnnxYoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut builder = Self::new(url_to_path(url));
    if let Some(conf) = query.get("conf") {
      builder.conf_threshold = parse_param("conf", conf)?;
    }
    if let Some(iou) = query.get("iou") {
      builder.iou_threshold = parse_param("iou", iou)?;
    }
    if let Some(size) = query.get("size") {
      builder.input_size = parse_param("size", size)?;
    }
    Ok(builder)
  }
}

fn parse_param<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, OnnxYoloError> {
  value
    .parse()
    .map_err(|_| OnnxYoloError::InvalidParameter(format!("{}={}", name, value)))
}

impl OnnxYoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      input_size: ONNX_YOLO_INPUT_SIZE,
      conf_threshold: ONNX_YOLO_CONF_THRESH,
      iou_threshold: ONNX_YOLO_IOU_THRESH,
      labels: None,
    }
  }

  pub fn confidence(mut self, threshold: f32) -> Self {
    self.conf_threshold = threshold;
    self
  }

  pub fn iou(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  /// 覆盖模型元数据中的类别名称
  pub fn labels(mut self, labels: LabelMap) -> Self {
    self.labels = Some(labels);
    self
  }

  pub fn build(self) -> Result<OnnxYolo, OnnxYoloError> {
    for (name, value) in [("conf", self.conf_threshold), ("iou", self.iou_threshold)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(OnnxYoloError::InvalidParameter(format!(
          "{} 必须在 0.0 - 1.0 之间, 实际为 {}",
          name, value
        )));
      }
    }
    if self.input_size == 0 || self.input_size % 32 != 0 {
      return Err(OnnxYoloError::InvalidParameter(format!(
        "输入尺寸必须是 32 的正整数倍, 实际为 {}",
        self.input_size
      )));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()?
      .with_optimization_level(GraphOptimizationLevel::Level3)?
      .commit_from_file(&self.model_path)?;
    info!("模型加载完成");

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| OnnxYoloError::ModelInvalid("模型没有输入".to_string()))?;
    if session.outputs.is_empty() {
      return Err(OnnxYoloError::ModelInvalid("模型没有输出".to_string()));
    }
    debug!("模型输入名称: {}", input_name);

    let labels = match self.labels {
      Some(labels) => labels,
      None => {
        let names = session.metadata()?.custom(ONNX_YOLO_NAMES_KEY)?;
        match names.as_deref().and_then(LabelMap::from_metadata) {
          Some(labels) => {
            debug!("从模型元数据读取到 {} 个类别", labels.len());
            labels
          }
          None => {
            warn!("模型元数据中没有类别名称，使用 COCO 类别");
            LabelMap::coco()
          }
        }
      }
    };

    Ok(OnnxYolo {
      session,
      input_name,
      input_size: self.input_size,
      conf_threshold: self.conf_threshold,
      iou_threshold: self.iou_threshold,
      labels,
    })
  }
}

/// YOLOv8/YOLO11 目标检测器
pub struct OnnxYolo {
  session: Session,
  input_name: String,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
  labels: LabelMap,
}

impl OnnxYolo {
  pub fn labels(&self) -> &LabelMap {
    &self.labels
  }

  /// 等比缩放、居中填充并转换为 NCHW 浮点张量
  fn preprocess(&self, image: &RgbImage) -> (Vec<f32>, Letterbox) {
    let size = self.input_size;
    let letterbox = Letterbox::new(image.width(), image.height(), size, size);
    let resized = image::imageops::resize(
      image,
      letterbox.resized_width,
      letterbox.resized_height,
      FilterType::Triangle,
    );

    let plane = (size * size) as usize;
    let mut data = vec![ONNX_YOLO_PAD_VALUE; 3 * plane];
    let (pad_x, pad_y) = (letterbox.pad_x as u32, letterbox.pad_y as u32);

    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = ((y + pad_y) * size + (x + pad_x)) as usize;
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    (data, letterbox)
  }
}

impl Model for OnnxYolo {
  type Error = OnnxYoloError;

  fn infer(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let (input, letterbox) = self.preprocess(image);
    let size = self.input_size as usize;
    let tensor = Tensor::from_array(([1usize, 3, size, size], input.into_boxed_slice()))?;

    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])?;
    let (_, output) = outputs
      .iter()
      .next()
      .ok_or_else(|| OnnxYoloError::ModelInvalid("推理没有输出".to_string()))?;
    let (shape, data) = output.try_extract_tensor::<f32>()?;

    let layout = OutputLayout::infer(shape, Some(self.labels.len() + 4)).ok_or_else(|| {
      OnnxYoloError::ModelInvalid(format!("无法识别的输出形状: {:?}", shape))
    })?;
    let candidates = decode_predictions(data, layout, self.conf_threshold);
    let kept = non_max_suppression(candidates, self.iou_threshold);
    let items = to_detections(kept, &letterbox, image.width(), image.height(), &self.labels);
    debug!("检测到 {} 个对象", items.len());

    Ok(DetectResult::from(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_reads_url_query() {
    let url = Url::parse("onnx:///models/yolov8n.onnx?conf=0.4&iou=0.6&size=320").unwrap();
    let builder = OnnxYoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/yolov8n.onnx"));
    assert_eq!(builder.conf_threshold, 0.4);
    assert_eq!(builder.iou_threshold, 0.6);
    assert_eq!(builder.input_size, 320);
  }

  #[test]
  fn setters_override_url_and_metadata() {
    let labels = LabelMap::new(vec!["helmet".to_string(), "vest".to_string()]);
    let builder = OnnxYoloBuilder::new("m.onnx")
      .confidence(0.5)
      .iou(0.3)
      .input_size(416)
      .labels(labels.clone());
    assert_eq!(builder.conf_threshold, 0.5);
    assert_eq!(builder.iou_threshold, 0.3);
    assert_eq!(builder.input_size, 416);
    assert_eq!(builder.labels, Some(labels));
  }

  #[test]
  fn invalid_parameters_fail_before_loading() {
    let missing = PathBuf::from("/nonexistent/model.onnx");
    assert!(matches!(
      OnnxYoloBuilder::new(&missing).input_size(30).build(),
      Err(OnnxYoloError::InvalidParameter(_))
    ));
    assert!(matches!(
      OnnxYoloBuilder::new(&missing).confidence(1.5).build(),
      Err(OnnxYoloError::InvalidParameter(_))
    ));
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("image:///models/yolov8n.onnx").unwrap();
    assert!(matches!(
      OnnxYoloBuilder::from_url(&url),
      Err(OnnxYoloError::ModelPathError(_))
    ));
  }
}
