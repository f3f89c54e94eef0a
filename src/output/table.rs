// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/table.rs - 检测结果表格
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

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::model::DetectItem;

pub const TABLE_HEADER: [&str; 6] = ["label", "confidence", "x1", "y1", "x2", "y2"];

#[derive(Error, Debug)]
pub enum TableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 表格中的一行，对应一个检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRow {
  pub label: String,
  pub confidence: f32,
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl From<&DetectItem> for DetectionRow {
  fn from(item: &DetectItem) -> Self {
    Self {
      label: item.label.clone(),
      confidence: item.score,
      x1: item.bbox[0],
      y1: item.bbox[1],
      x2: item.bbox[2],
      y2: item.bbox[3],
    }
  }
}

pub fn rows(items: &[DetectItem]) -> Vec<DetectionRow> {
  items.iter().map(DetectionRow::from).collect()
}

fn csv_field(value: &str) -> String {
  if value.contains([',', '"', '\n']) {
    format!("\"{}\"", value.replace('"', "\"\""))
  } else {
    value.to_string()
  }
}

pub fn to_csv(rows: &[DetectionRow]) -> String {
  let mut out = TABLE_HEADER.join(",");
  out.push('\n');
  for row in rows {
    out.push_str(&format!(
      "{},{:.4},{:.1},{:.1},{:.1},{:.1}\n",
      csv_field(&row.label),
      row.confidence,
      row.x1,
      row.y1,
      row.x2,
      row.y2
    ));
  }
  out
}

pub fn to_json(rows: &[DetectionRow]) -> Result<String, TableError> {
  Ok(serde_json::to_string_pretty(rows)?)
}

/// 对齐的纯文本表格，用于日志输出
pub fn to_text(rows: &[DetectionRow]) -> String {
  let label_width = rows
    .iter()
    .map(|r| r.label.chars().count())
    .chain(std::iter::once(TABLE_HEADER[0].len()))
    .max()
    .unwrap_or(0);

  let mut out = format!(
    "{:<lw$}  {:>10}  {:>7}  {:>7}  {:>7}  {:>7}\n",
    TABLE_HEADER[0],
    TABLE_HEADER[1],
    TABLE_HEADER[2],
    TABLE_HEADER[3],
    TABLE_HEADER[4],
    TABLE_HEADER[5],
    lw = label_width
  );
  for row in rows {
    out.push_str(&format!(
      "{:<lw$}  {:>10.4}  {:>7.1}  {:>7.1}  {:>7.1}  {:>7.1}\n",
      row.label,
      row.confidence,
      row.x1,
      row.y1,
      row.x2,
      row.y2,
      lw = label_width
    ));
  }
  out
}

/// 按扩展名写出表格：`.json` 写 JSON，其余写 CSV
pub fn write_table(path: &Path, rows: &[DetectionRow]) -> Result<(), TableError> {
  let is_json = path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case("json"));
  let content = if is_json { to_json(rows)? } else { to_csv(rows) };

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, content)?;
  info!("检测表格已保存: {} ({} 行)", path.display(), rows.len());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Vec<DetectionRow> {
    rows(&[
      DetectItem::new(0, "person", 0.91, [1.0, 2.0, 30.0, 40.0]),
      DetectItem::new(60, "dining, table", 0.5, [0.0, 0.0, 10.0, 10.0]),
    ])
  }

  #[test]
  fn csv_has_header_and_escapes_labels() {
    let csv = to_csv(&sample());
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "label,confidence,x1,y1,x2,y2");
    assert_eq!(lines[1], "person,0.9100,1.0,2.0,30.0,40.0");
    assert_eq!(lines[2], "\"dining, table\",0.5000,0.0,0.0,10.0,10.0");
  }

  #[test]
  fn json_rows_have_named_columns() {
    let json = to_json(&sample()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value[0]["label"], "person");
    assert_eq!(value[1]["x2"], 10.0);
  }

  #[test]
  fn writes_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let json_path = dir.path().join("out/rows.json");
    let csv_path = dir.path().join("rows.csv");
    write_table(&json_path, &sample()).unwrap();
    write_table(&csv_path, &sample()).unwrap();
    assert!(std::fs::read_to_string(json_path).unwrap().starts_with('['));
    assert!(std::fs::read_to_string(csv_path).unwrap().starts_with("label,"));
  }

  #[test]
  fn text_table_lists_every_row() {
    let text = to_text(&sample());
    assert_eq!(text.lines().count(), 3);
    assert!(text.lines().nth(1).unwrap().starts_with("person"));
  }
}
