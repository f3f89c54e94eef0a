// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/labels.rs - 类别索引与名称映射
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

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 元数据中允许的最大类别数
pub const MAX_METADATA_CLASSES: usize = 4096;

/// 类别索引到名称的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
  names: Vec<String>,
}

impl Default for LabelMap {
  fn default() -> Self {
    Self::coco()
  }
}

impl LabelMap {
  pub fn coco() -> Self {
    Self::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
  }

  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 超出表范围的索引解析为 `class_<索引>`
  pub fn resolve(&self, class_id: u32) -> String {
    self
      .names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }

  /// 解析 Ultralytics 导出模型中的 `names` 元数据，
  /// 形如 `{0: 'person', 1: 'bicycle'}`
  pub fn from_metadata(text: &str) -> Option<Self> {
    let body = text.trim().strip_prefix('{')?.strip_suffix('}')?;
    let mut entries = Vec::new();
    let mut rest = body;

    loop {
      rest = rest.trim_start_matches([',', ' ', '\n', '\t']);
      if rest.is_empty() {
        break;
      }
      let (key, after) = rest.split_once(':')?;
      let index: usize = key.trim().parse().ok()?;
      if index >= MAX_METADATA_CLASSES {
        return None;
      }
      let after = after.trim_start();
      let quote = after.chars().next()?;
      if quote != '\'' && quote != '"' {
        return None;
      }
      let after = &after[1..];
      let end = after.find(quote)?;
      entries.push((index, after[..end].to_string()));
      rest = &after[end + 1..];
    }

    let size = entries.iter().map(|(i, _)| i + 1).max()?;
    let mut names: Vec<String> = (0..size).map(|i| format!("class_{}", i)).collect();
    for (index, name) in entries {
      names[index] = name;
    }
    Some(Self { names })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_is_default() {
    let map = LabelMap::default();
    assert_eq!(map.len(), 80);
    assert_eq!(map.resolve(0), "person");
    assert_eq!(map.resolve(79), "toothbrush");
  }

  #[test]
  fn unknown_index_still_resolves() {
    assert_eq!(LabelMap::coco().resolve(80), "class_80");
  }

  #[test]
  fn parses_ultralytics_metadata() {
    let map = LabelMap::from_metadata("{0: 'helmet', 1: \"no helmet\", 3: 'vest'}").unwrap();
    assert_eq!(map.len(), 4);
    assert_eq!(map.resolve(0), "helmet");
    assert_eq!(map.resolve(1), "no helmet");
    assert_eq!(map.resolve(2), "class_2");
    assert_eq!(map.resolve(3), "vest");
  }

  #[test]
  fn rejects_oversized_class_index() {
    assert!(LabelMap::from_metadata("{4000000000: 'x'}").is_none());
    assert!(LabelMap::from_metadata("{0: 'a', 4096: 'b'}").is_none());
    let map = LabelMap::from_metadata("{4095: 'last'}").unwrap();
    assert_eq!(map.len(), MAX_METADATA_CLASSES);
    assert_eq!(map.resolve(4095), "last");
  }

  #[test]
  fn rejects_malformed_metadata() {
    assert!(LabelMap::from_metadata("person, bicycle").is_none());
    assert!(LabelMap::from_metadata("{0: person}").is_none());
    assert!(LabelMap::from_metadata("{}").is_none());
  }
}
