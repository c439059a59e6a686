//! # 锚点定位模块
//!
//! ## 设计思路
//!
//! 视觉推理在这里是“建议性输入”而不是硬依赖：任何失败（网络、超时、
//! 响应不可解析）都静默回退到几何中心估计，请求永远不会因此失败。
//! 整个定位步骤被 `tokio::time::timeout` 限制在配置的硬超时内，外部服务
//! 挂死也不会拖垮请求。
//!
//! ## 实现思路
//!
//! 1. 将主体图降采样到 `vision_max_width` 以内并重编码为低质量 JPEG，
//!    只为压缩外部调用载荷，探测图不会返回给调用方。
//! 2. 通过 `VisionBackend` 发起补全调用，要求模型返回降采样坐标系下的
//!    `{x, y, width?}` JSON。
//! 3. 成功时按 `原图宽 / 降采样宽` 比例换算回原始分辨率；失败时回退
//!    `(subjectWidth/2, subjectHeight/2)` 并记录告警。

use std::io::Cursor;
use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;

use super::pipeline;
use super::source::{AnchorPoint, ImageAsset};
use super::vision::{CompletionRequest, VisionBackend, parse_anchor_response};
use super::{TryOnConfig, TryOnError};

/// 发送给外部模型的降采样探测图。
struct VisionProbe {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

/// 定位结果：锚点坐标 + 模型可选给出的贴图宽度建议。
///
/// 两者都已换算回原始分辨率坐标系。
pub(crate) struct LocatedAnchor {
    pub point: AnchorPoint,
    pub suggested_width: Option<f64>,
}

/// 锚点定位器：在线视觉估计 + 确定性几何回退的组合。
pub struct AnchorLocator<B> {
    backend: B,
}

impl<B: VisionBackend> AnchorLocator<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// 定位贴图锚点。永远成功：视觉链路任何一步失败都回退几何中心。
    pub(crate) async fn locate(&self, subject: &ImageAsset, config: &TryOnConfig) -> LocatedAnchor {
        let ceiling = Duration::from_millis(config.vision_timeout_ms);

        match tokio::time::timeout(ceiling, self.locate_via_vision(subject, config)).await {
            Ok(Ok(located)) => {
                log::info!(
                    "🎯 视觉锚点估计成功 - x={:.1} y={:.1} width={:?}",
                    located.point.x,
                    located.point.y,
                    located.suggested_width
                );
                located
            }
            Ok(Err(err)) => {
                log::warn!("⚠️ 视觉锚点估计失败，回退几何中心：{}", err);
                Self::fallback(subject)
            }
            Err(_) => {
                log::warn!(
                    "⚠️ 视觉锚点估计超过 {}ms 上限，回退几何中心",
                    config.vision_timeout_ms
                );
                Self::fallback(subject)
            }
        }
    }

    fn fallback(subject: &ImageAsset) -> LocatedAnchor {
        LocatedAnchor {
            point: AnchorPoint::center_of(subject.width(), subject.height()),
            suggested_width: None,
        }
    }

    async fn locate_via_vision(
        &self,
        subject: &ImageAsset,
        config: &TryOnConfig,
    ) -> Result<LocatedAnchor, TryOnError> {
        let probe = build_probe(subject, config)?;
        let prompt = anchor_prompt(probe.width, probe.height);

        let text = self
            .backend
            .complete(CompletionRequest {
                model: &config.vision_model,
                prompt: &prompt,
                image_jpeg: Some(&probe.jpeg),
            })
            .await?;

        let estimate = parse_anchor_response(&text)?;

        // 探测图坐标 → 原始分辨率坐标
        let ratio = f64::from(subject.width()) / f64::from(probe.width);
        Ok(LocatedAnchor {
            point: AnchorPoint {
                x: estimate.x * ratio,
                y: estimate.y * ratio,
            },
            suggested_width: estimate.width.map(|w| w * ratio),
        })
    }
}

/// 构建降采样探测图：限制宽度、重编码低质量 JPEG。
fn build_probe(subject: &ImageAsset, config: &TryOnConfig) -> Result<VisionProbe, TryOnError> {
    let (width, height) = (subject.width(), subject.height());

    let (probe_width, probe_height) = if width > config.vision_max_width {
        let scale = f64::from(config.vision_max_width) / f64::from(width);
        let probe_height = ((f64::from(height) * scale).round() as u32).max(1);
        (config.vision_max_width, probe_height)
    } else {
        (width, height)
    };

    let pixels = pipeline::resize_rgba(&subject.pixels, probe_width, probe_height, config.resize_filter)?;

    // JPEG 不支持透明通道，统一转 RGB 后编码
    let rgb = image::DynamicImage::ImageRgba8(pixels).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, config.vision_jpeg_quality);

    image::DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(|e| TryOnError::Compositing(format!("探测图 JPEG 编码失败：{}", e)))?;

    Ok(VisionProbe {
        jpeg: out.into_inner(),
        width: probe_width,
        height: probe_height,
    })
}

fn anchor_prompt(probe_width: u32, probe_height: u32) -> String {
    format!(
        "You are a precise visual locator for a pet store's virtual try-on feature. \
         The attached photo shows a pet and is {probe_width}x{probe_height} pixels. \
         Find the single point on the animal where a garment or accessory should be centered \
         (typically the neck/chest area). \
         Respond with ONLY a JSON object like {{\"x\": <number>, \"y\": <number>, \"width\": <number>}} \
         in pixel coordinates of this image. \
         Do NOT wrap it in markdown blocks and do NOT add any explanation."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::time::Instant;

    fn subject_asset(width: u32, height: u32) -> ImageAsset {
        ImageAsset {
            pixels: RgbaImage::from_pixel(width, height, Rgba([120, 90, 60, 255])),
            format: ImageFormat::Png,
        }
    }

    struct FixedBackend(&'static str);

    impl VisionBackend for FixedBackend {
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, TryOnError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingBackend;

    impl VisionBackend for FailingBackend {
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, TryOnError> {
            Err(TryOnError::Network("connection refused".to_string()))
        }
    }

    struct SlowBackend;

    impl VisionBackend for SlowBackend {
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, TryOnError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(r#"{"x": 1, "y": 1}"#.to_string())
        }
    }

    #[tokio::test]
    async fn vision_coordinates_are_rescaled_to_original_resolution() {
        // 主体 1000px 宽，探测图降采样到 500px → 比例 2x
        let mut config = TryOnConfig::default();
        config.vision_max_width = 500;

        let locator = AnchorLocator::new(FixedBackend(r#"{"x": 100, "y": 50, "width": 80}"#));
        let located = locator.locate(&subject_asset(1000, 800), &config).await;

        assert_eq!(located.point.x, 200.0);
        assert_eq!(located.point.y, 100.0);
        assert_eq!(located.suggested_width, Some(160.0));
    }

    #[tokio::test]
    async fn small_subject_is_not_upscaled_and_keeps_ratio_one() {
        let config = TryOnConfig::default();

        let locator = AnchorLocator::new(FixedBackend(r#"{"x": 10, "y": 20}"#));
        let located = locator.locate(&subject_asset(100, 80), &config).await;

        assert_eq!(located.point.x, 10.0);
        assert_eq!(located.point.y, 20.0);
        assert_eq!(located.suggested_width, None);
    }

    #[tokio::test]
    async fn backend_failure_falls_back_to_geometric_center() {
        let config = TryOnConfig::default();

        let locator = AnchorLocator::new(FailingBackend);
        let located = locator.locate(&subject_asset(640, 480), &config).await;

        assert_eq!(located.point, AnchorPoint::center_of(640, 480));
        assert_eq!(located.suggested_width, None);
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_geometric_center() {
        let config = TryOnConfig::default();

        let locator = AnchorLocator::new(FixedBackend("the collar goes on the neck"));
        let located = locator.locate(&subject_asset(640, 480), &config).await;

        assert_eq!(located.point.x, 320.0);
        assert_eq!(located.point.y, 240.0);
    }

    #[tokio::test]
    async fn hung_backend_is_cut_off_at_the_timeout_ceiling() {
        let mut config = TryOnConfig::default();
        config.vision_timeout_ms = 200;

        let locator = AnchorLocator::new(SlowBackend);
        let start = Instant::now();
        let located = locator.locate(&subject_asset(640, 480), &config).await;
        let elapsed = start.elapsed();

        assert_eq!(located.point, AnchorPoint::center_of(640, 480));
        assert!(elapsed < Duration::from_secs(5), "timeout ceiling was not enforced");
    }

    #[test]
    fn probe_never_exceeds_configured_width() {
        let mut config = TryOnConfig::default();
        config.vision_max_width = 256;

        let probe = build_probe(&subject_asset(2048, 1024), &config).expect("probe build failed");

        assert_eq!(probe.width, 256);
        assert_eq!(probe.height, 128);
        assert!(!probe.jpeg.is_empty());

        // 探测图必须是合法 JPEG
        let decoded = image::load_from_memory(&probe.jpeg).expect("probe should decode");
        assert_eq!(decoded.width(), 256);
    }

    #[test]
    fn probe_keeps_small_subjects_at_native_size() {
        let config = TryOnConfig::default();

        let probe = build_probe(&subject_asset(200, 150), &config).expect("probe build failed");

        assert_eq!(probe.width, 200);
        assert_eq!(probe.height, 150);
    }
}
