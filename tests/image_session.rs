// 该文件是 Kanjian （看见） 项目的一部分。
// tests/image_session.rs - 图片会话测试
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

#![cfg(all(feature = "read_image_file", feature = "save_image_file"))]

mod common;

use std::path::Path;

use common::StubModel;
use image::{Rgb, RgbImage};
use kanjian::{
  media::{UploadError, UploadPolicy},
  model::{DetectItem, LabelFilter},
  session::{Session, SessionConfig, SessionError},
};
use url::Url;

fn url(scheme: &str, path: &Path) -> Url {
  Url::parse(&format!("{}://{}", scheme, path.display())).unwrap()
}

fn write_png(path: &Path, width: u32, height: u32) {
  let mut image = RgbImage::new(width, height);
  // 加入噪声，使文件不至于过小
  for (x, y, pixel) in image.enumerate_pixels_mut() {
    *pixel = Rgb([(x * 7 + y * 13) as u8, (x * y) as u8, (x ^ y) as u8]);
  }
  image.save(path).unwrap();
}

fn street() -> StubModel {
  StubModel::with_items(vec![
    DetectItem::new(0, "person", 0.62, [4.0, 4.0, 20.0, 40.0]),
    DetectItem::new(2, "car", 0.91, [24.0, 10.0, 60.0, 30.0]),
    DetectItem::new(0, "person", 0.84, [40.0, 5.0, 55.0, 44.0]),
  ])
}

#[test]
fn annotates_and_saves_image() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("street.png");
  let output = dir.path().join("out/hasil_deteksi.png");
  write_png(&input, 64, 48);

  let session = Session::new(SessionConfig::default()).unwrap();
  let mut model = street();
  let report = session
    .run_image(&mut model, &url("image", &input), &url("image", &output))
    .unwrap();

  assert_eq!(model.calls, 1);
  assert_eq!(report.result.len(), 3);
  assert_eq!(report.selected.len(), 3);
  assert_eq!(report.selected[0].label, "car");
  assert_eq!((report.info.width, report.info.height), (64, 48));

  let saved = image::open(&output).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (64, 48));
}

#[test]
fn label_filter_limits_table_rows() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("street.jpg");
  let output = dir.path().join("out.png");
  RgbImage::from_pixel(64, 48, Rgb([200, 200, 200]))
    .save(&input)
    .unwrap();

  let session = Session::new(SessionConfig {
    filter: LabelFilter::only(["person"]),
    ..SessionConfig::default()
  })
  .unwrap();
  let report = session
    .run_image(street(), &url("image", &input), &url("image", &output))
    .unwrap();

  // 筛选不影响完整结果
  assert_eq!(report.result.len(), 3);
  let scores: Vec<f32> = report.selected.iter().map(|r| r.score).collect();
  assert_eq!(scores, vec![0.84, 0.62]);
  assert!(report.selected.iter().all(|r| r.label == "person"));
}

#[test]
fn absent_label_gives_empty_table() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("street.png");
  let output = dir.path().join("out.png");
  write_png(&input, 16, 16);

  let session = Session::new(SessionConfig {
    filter: LabelFilter::only(["giraffe"]),
    ..SessionConfig::default()
  })
  .unwrap();
  let report = session
    .run_image(street(), &url("image", &input), &url("image", &output))
    .unwrap();

  assert!(report.selected.is_empty());
  assert_eq!(report.result.len(), 3);
}

#[test]
fn oversized_upload_is_rejected_before_inference() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("big.png");
  let output = dir.path().join("out.png");
  write_png(&input, 64, 64);

  let session = Session::new(SessionConfig {
    upload: UploadPolicy {
      max_image_bytes: Some(64),
      ..UploadPolicy::default()
    },
    ..SessionConfig::default()
  })
  .unwrap();
  let mut model = street();
  let err = session
    .run_image(&mut model, &url("image", &input), &url("image", &output))
    .unwrap_err();

  assert!(matches!(
    err,
    SessionError::Upload(UploadError::Oversized { limit: 64, .. })
  ));
  assert_eq!(model.calls, 0);
  assert!(!output.exists());
}

#[test]
fn video_file_is_not_an_image() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("clip.mp4");
  std::fs::write(&input, b"not really a video").unwrap();

  let session = Session::new(SessionConfig::default()).unwrap();
  let mut model = street();
  let err = session
    .run_image(
      &mut model,
      &url("image", &input),
      &url("image", &dir.path().join("out.png")),
    )
    .unwrap_err();

  assert!(matches!(
    err,
    SessionError::Upload(UploadError::UnexpectedKind { .. })
  ));
  assert_eq!(model.calls, 0);
}

#[test]
fn corrupt_image_fails_without_output() {
  let dir = tempfile::tempdir().unwrap();
  let input = dir.path().join("broken.png");
  let output = dir.path().join("out.png");
  std::fs::write(&input, b"\x89PNG\r\n\x1a\n truncated").unwrap();

  let session = Session::new(SessionConfig::default()).unwrap();
  let mut model = street();
  let err = session
    .run_image(&mut model, &url("image", &input), &url("image", &output))
    .unwrap_err();

  assert!(matches!(err, SessionError::Input(_)));
  assert_eq!(model.calls, 0);
  assert!(!output.exists());
}
