//! # 合成模块
//!
//! ## 设计思路
//!
//! 合成器只做三件事：按放置方案缩放贴图、把贴图 alpha 混合到主体画布副本上、
//! 编码为 PNG。无副作用，输出尺寸恒等于主体原始尺寸。
//!
//! `imageops::overlay` 自带画布裁剪：`left` / `top` 为负或越界时，越界部分
//! 被直接丢弃，这正是放置计算器“不收敛落点”约定的另一半。

use std::io::Cursor;

use image::ImageFormat;

use super::pipeline;
use super::source::{ImageAsset, PlacementPlan, RenderedImage};
use super::{TryOnConfig, TryOnError};

/// 按放置方案把贴图合成到主体画布上，输出 PNG。
pub(crate) fn composite(
    subject: &ImageAsset,
    overlay: &ImageAsset,
    plan: &PlacementPlan,
    config: &TryOnConfig,
) -> Result<RenderedImage, TryOnError> {
    let resized = pipeline::resize_rgba(
        &overlay.pixels,
        plan.overlay_width,
        plan.overlay_height,
        config.resize_filter,
    )?;

    let mut canvas = subject.pixels.clone();
    image::imageops::overlay(&mut canvas, &resized, plan.left, plan.top);

    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| TryOnError::Compositing(format!("PNG 编码失败：{}", e)))?;

    Ok(RenderedImage {
        bytes: out.into_inner(),
        mime: "image/png",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn asset(pixels: RgbaImage) -> ImageAsset {
        ImageAsset {
            pixels,
            format: ImageFormat::Png,
        }
    }

    fn decode(rendered: &RenderedImage) -> RgbaImage {
        image::load_from_memory(&rendered.bytes)
            .expect("rendered output should decode")
            .to_rgba8()
    }

    #[test]
    fn output_dimensions_equal_subject_dimensions() {
        let subject = asset(RgbaImage::from_pixel(64, 48, Rgba([255, 255, 255, 255])));
        let overlay = asset(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let plan = PlacementPlan {
            overlay_width: 20,
            overlay_height: 20,
            left: 10,
            top: 10,
        };

        let rendered =
            composite(&subject, &overlay, &plan, &TryOnConfig::default()).expect("composite failed");
        let output = decode(&rendered);

        assert_eq!(rendered.mime, "image/png");
        assert_eq!(output.dimensions(), (64, 48));
    }

    #[test]
    fn opaque_overlay_replaces_subject_pixels() {
        let subject = asset(RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255])));
        let overlay = asset(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let plan = PlacementPlan {
            overlay_width: 10,
            overlay_height: 10,
            left: 15,
            top: 15,
        };

        let rendered =
            composite(&subject, &overlay, &plan, &TryOnConfig::default()).expect("composite failed");
        let output = decode(&rendered);

        assert_eq!(output.get_pixel(20, 20), &Rgba([255, 0, 0, 255]));
        assert_eq!(output.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn transparent_overlay_leaves_subject_untouched() {
        let subject = asset(RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 255])));
        let overlay = asset(RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 0])));
        let plan = PlacementPlan {
            overlay_width: 16,
            overlay_height: 16,
            left: 8,
            top: 8,
        };

        let rendered =
            composite(&subject, &overlay, &plan, &TryOnConfig::default()).expect("composite failed");
        let output = decode(&rendered);

        assert_eq!(output.get_pixel(16, 16), &Rgba([10, 20, 30, 255]));
        assert_eq!(output.get_pixel(2, 2), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn off_canvas_overlay_is_cropped_not_rejected() {
        let subject = asset(RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255])));
        let overlay = asset(RgbaImage::from_pixel(10, 10, Rgba([0, 0, 255, 255])));
        let plan = PlacementPlan {
            overlay_width: 10,
            overlay_height: 10,
            left: -5,
            top: -5,
        };

        let rendered =
            composite(&subject, &overlay, &plan, &TryOnConfig::default()).expect("composite failed");
        let output = decode(&rendered);

        // 画布尺寸不变；可见角落被贴图覆盖，远处像素保持原样
        assert_eq!(output.dimensions(), (20, 20));
        assert_eq!(output.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(output.get_pixel(4, 4), &Rgba([0, 0, 255, 255]));
        assert_eq!(output.get_pixel(10, 10), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn identical_inputs_render_identical_pixels() {
        let subject = asset(RgbaImage::from_fn(30, 30, |x, y| {
            Rgba([(x * 7 % 255) as u8, (y * 11 % 255) as u8, 128, 255])
        }));
        let overlay = asset(RgbaImage::from_pixel(12, 6, Rgba([200, 100, 50, 180])));
        let plan = PlacementPlan {
            overlay_width: 12,
            overlay_height: 6,
            left: 9,
            top: 12,
        };
        let config = TryOnConfig::default();

        let first = composite(&subject, &overlay, &plan, &config).expect("composite failed");
        let second = composite(&subject, &overlay, &plan, &config).expect("composite failed");

        // 像素级比较，避免依赖编码器的字节级确定性
        assert_eq!(decode(&first).as_raw(), decode(&second).as_raw());
    }
}
