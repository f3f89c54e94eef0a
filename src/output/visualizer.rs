// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/visualizer.rs - 检测结果可视化
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

use ab_glyph::{FontArc, InvalidFont, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::model::{DetectItem, DetectResult};

const FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");
const PALETTE_SIZE: usize = 80;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 可视化工具
#[derive(Clone)]
pub struct Visualizer {
  /// 字体
  font: FontArc,
  /// 字体大小
  font_scale: PxScale,
  /// 边界框颜色映射，按类别索引取色
  colors: Vec<Rgb<u8>>,
}

impl Visualizer {
  /// 创建一个使用内置字体的可视化工具
  pub fn new() -> Result<Self, InvalidFont> {
    let font = FontArc::try_from_slice(FONT_DATA)?;

    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        Self::hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Ok(Self {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    })
  }

  /// HSV 转 RGB
  fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
      (c, x, 0.0)
    } else if h < 120.0 {
      (x, c, 0.0)
    } else if h < 180.0 {
      (0.0, c, x)
    } else if h < 240.0 {
      (0.0, x, c)
    } else if h < 300.0 {
      (x, 0.0, c)
    } else {
      (c, 0.0, x)
    };

    Rgb([
      ((r + m) * 255.0) as u8,
      ((g + m) * 255.0) as u8,
      ((b + m) * 255.0) as u8,
    ])
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 返回绘制了检测结果的新图像，尺寸与输入一致
  pub fn render(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut canvas = image.clone();
    self.draw_detections(&mut canvas, result);
    canvas
  }

  /// 在图像上绘制检测结果
  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_item(image, item);
    }
  }

  fn draw_item(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let color = self.color_of(item.class_id);

    let x_min = (item.bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (item.bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (item.bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (item.bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 绘制标签：放在边框上方，空间不足时放在框内顶部
    let label = format!("{} {:.2}", item.label, item.score);
    let (text_w, text_h) = text_size(self.font_scale, &self.font, &label);
    let tag_w = (text_w + 2 * LABEL_PADDING).min((w - x_min) as u32);
    let tag_h = text_h + 2 * LABEL_PADDING;
    if tag_w == 0 || tag_h == 0 {
      return;
    }

    let tag_y = if y_min >= tag_h as i32 {
      y_min - tag_h as i32
    } else {
      y_min
    };

    draw_filled_rect_mut(image, Rect::at(x_min, tag_y).of_size(tag_w, tag_h), color);
    draw_text_mut(
      image,
      TEXT_COLOR,
      x_min + LABEL_PADDING as i32,
      tag_y + LABEL_PADDING as i32,
      self.font_scale,
      &self.font,
      &label,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn result_with(bbox: [f32; 4]) -> DetectResult {
    DetectResult::from(vec![DetectItem::new(3, "motorcycle", 0.77, bbox)])
  }

  #[test]
  fn render_keeps_dimensions_and_input() {
    let vis = Visualizer::new().unwrap();
    let image = RgbImage::from_pixel(120, 80, Rgb([0, 0, 0]));
    let out = vis.render(&image, &result_with([20.0, 30.0, 90.0, 70.0]));

    assert_eq!(out.dimensions(), image.dimensions());
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    // 边框左下角应为类别颜色
    assert_eq!(out.get_pixel(20, 70), &vis.color_of(3));
    // 框内中心不被覆盖
    assert_eq!(out.get_pixel(55, 55), &Rgb([0, 0, 0]));
  }

  #[test]
  fn empty_result_is_identity() {
    let vis = Visualizer::new().unwrap();
    let image = RgbImage::from_pixel(16, 16, Rgb([9, 9, 9]));
    assert_eq!(vis.render(&image, &DetectResult::default()), image);
  }

  #[test]
  fn out_of_bounds_boxes_do_not_panic() {
    let vis = Visualizer::new().unwrap();
    let image = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
    let _ = vis.render(&image, &result_with([-50.0, -50.0, 500.0, 500.0]));
    let _ = vis.render(&image, &result_with([8.0, 8.0, 8.5, 8.5]));
    let _ = vis.render(&image, &result_with([9.0, 0.0, 12.0, 3.0]));
  }

  #[test]
  fn colors_cycle_by_class() {
    let vis = Visualizer::new().unwrap();
    assert_eq!(vis.color_of(1), vis.color_of(81));
    assert_ne!(vis.color_of(0), vis.color_of(40));
  }
}
