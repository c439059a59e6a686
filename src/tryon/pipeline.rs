//! # 解码与变换流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先做签名与尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 魔数校验（必须是图片签名）
//! 2. 读取 header 尺寸并按像素上限快速拒绝
//! 3. 完整解码并二次校验
//! 4. 转换 RGBA，校验字节长度一致性
//!
//! 解码失败的归类由调用方通过 `DecodeRole` 指定：贴图解码失败属于客户端
//! 错误（`MalformedOverlay`），主体图解码失败属于服务端错误
//! （`SubjectUndecodable`，阶段归因在解码）。

use fast_image_resize as fr;
use image::{GenericImageView, ImageBuffer, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;

use super::source::ImageAsset;
use super::{TryOnConfig, TryOnError};

/// 解码对象在流水线中的角色，决定失败时的错误归类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodeRole {
    Subject,
    Overlay,
}

impl DecodeRole {
    fn label(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Overlay => "overlay",
        }
    }

    fn decode_error(self, message: String) -> TryOnError {
        match self {
            Self::Subject => TryOnError::SubjectUndecodable(message),
            Self::Overlay => TryOnError::MalformedOverlay(message),
        }
    }
}

/// 将原始字节解码为流水线使用的 RGBA 资产。
pub(crate) fn decode_image(
    bytes: &[u8],
    config: &TryOnConfig,
    role: DecodeRole,
) -> Result<ImageAsset, TryOnError> {
    validate_image_signature(bytes, role)?;

    let format = image::guess_format(bytes)
        .map_err(|e| role.decode_error(format!("不支持的图片格式（{}）：{}", role.label(), e)))?;

    let (header_width, header_height) = inspect_dimensions_from_memory(bytes, role)?;
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let decoded = image::load_from_memory(bytes)
        .map_err(|e| role.decode_error(format!("图片解码失败（{}）：{}", role.label(), e)))?;

    let (width, height) = decoded.dimensions();
    validate_pixel_limits(config, width, height)?;
    validate_decoded_memory_limits(config, width, height)?;

    if width == 0 || height == 0 {
        return Err(role.decode_error(format!("图片尺寸无效（{}）：{}x{}", role.label(), width, height)));
    }

    let pixels = decoded.to_rgba8();

    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| TryOnError::ResourceLimit("图片尺寸导致内存溢出风险".to_string()))?;

    if pixels.as_raw().len() != expected_len {
        return Err(role.decode_error(format!("解码后像素数据长度异常（{}）", role.label())));
    }

    log::debug!(
        "🖼️ 图片解码成功 - role={} format={:?} size={}x{}",
        role.label(),
        format,
        width,
        height
    );

    Ok(ImageAsset { pixels, format })
}

/// 通过文件签名（magic bytes）校验输入是否为图片。
fn validate_image_signature(bytes: &[u8], role: DecodeRole) -> Result<(), TryOnError> {
    if bytes.is_empty() {
        return Err(role.decode_error(format!("图片内容为空（{}）", role.label())));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| role.decode_error(format!("无法识别图片类型（{}）", role.label())))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(role.decode_error(format!(
            "文件签名不是图片类型（{}）：{}",
            role.label(),
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 仅通过内存中的图片头信息读取宽高，用于完整解码前的限制检查。
fn inspect_dimensions_from_memory(bytes: &[u8], role: DecodeRole) -> Result<(u32, u32), TryOnError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| role.decode_error(format!("无法识别图片格式（{}）：{}", role.label(), e)))?;

    reader
        .into_dimensions()
        .map_err(|e| role.decode_error(format!("无法读取图片尺寸（{}）：{}", role.label(), e)))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &TryOnConfig, width: u32, height: u32) -> Result<(), TryOnError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| TryOnError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(TryOnError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(
    config: &TryOnConfig,
    width: u32,
    height: u32,
) -> Result<(), TryOnError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| TryOnError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(TryOnError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}

/// 将 RGBA 图像缩放到目标尺寸。
///
/// 优先使用 fast_image_resize；失败时回退 `image::imageops::resize`。
pub(crate) fn resize_rgba(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: image::imageops::FilterType,
) -> Result<RgbaImage, TryOnError> {
    if target_width == 0 || target_height == 0 {
        return Err(TryOnError::Compositing(format!(
            "缩放目标尺寸无效：{}x{}",
            target_width, target_height
        )));
    }

    if image.width() == target_width && image.height() == target_height {
        return Ok(image.clone());
    }

    match resize_with_fast_image_resize(image, target_width, target_height, filter) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::imageops::resize：{}", err);
            Ok(image::imageops::resize(image, target_width, target_height, filter))
        }
    }
}

fn resize_with_fast_image_resize(
    image: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: image::imageops::FilterType,
) -> Result<RgbaImage, TryOnError> {
    let (src_width, src_height) = image.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        image.as_raw().clone(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| TryOnError::Compositing(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options =
        fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| TryOnError::Compositing(format!("fast_image_resize 执行失败：{}", e)))?;

    ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| TryOnError::Compositing("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: image::imageops::FilterType) -> fr::FilterType {
    match filter {
        image::imageops::FilterType::Nearest => fr::FilterType::Box,
        image::imageops::FilterType::Triangle => fr::FilterType::Bilinear,
        image::imageops::FilterType::CatmullRom => fr::FilterType::CatmullRom,
        image::imageops::FilterType::Gaussian => fr::FilterType::Mitchell,
        image::imageops::FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn decode_valid_png_reports_dimensions() {
        let config = TryOnConfig::default();
        let asset = decode_image(&png_bytes(64, 48), &config, DecodeRole::Subject)
            .expect("decode should succeed");

        assert_eq!(asset.width(), 64);
        assert_eq!(asset.height(), 48);
        assert_eq!(asset.format, ImageFormat::Png);
    }

    #[test]
    fn decode_rejects_non_image_payload() {
        let config = TryOnConfig::default();

        let subject = decode_image(b"<html>not an image</html>", &config, DecodeRole::Subject);
        match subject {
            Err(err @ TryOnError::SubjectUndecodable(_)) => {
                // 主体图解码失败是服务端错误，但阶段归因在解码
                assert_eq!(err.stage(), "decode");
                assert_eq!(err.status(), 500);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let overlay = decode_image(b"<html>not an image</html>", &config, DecodeRole::Overlay);
        assert!(matches!(overlay, Err(TryOnError::MalformedOverlay(_))));
    }

    #[test]
    fn decode_rejects_empty_payload() {
        let config = TryOnConfig::default();

        assert!(matches!(
            decode_image(b"", &config, DecodeRole::Overlay),
            Err(TryOnError::MalformedOverlay(_))
        ));
    }

    #[test]
    fn decode_rejects_too_many_pixels() {
        let mut config = TryOnConfig::default();
        config.max_decoded_pixels = 1_000;

        let result = decode_image(&png_bytes(100, 100), &config, DecodeRole::Subject);

        assert!(matches!(result, Err(TryOnError::ResourceLimit(_))));
    }

    #[test]
    fn resize_preserves_requested_dimensions() {
        let source = RgbaImage::from_pixel(100, 60, Rgba([10, 20, 30, 255]));

        let resized = resize_rgba(&source, 50, 30, image::imageops::FilterType::Triangle)
            .expect("resize should succeed");

        assert_eq!(resized.dimensions(), (50, 30));
        assert_eq!(resized.get_pixel(25, 15), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn resize_rejects_zero_target() {
        let source = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255]));

        assert!(matches!(
            resize_rgba(&source, 0, 5, image::imageops::FilterType::Triangle),
            Err(TryOnError::Compositing(_))
        ));
    }

    #[test]
    fn resize_same_size_is_identity() {
        let source = RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 4]));

        let resized = resize_rgba(&source, 8, 8, image::imageops::FilterType::Triangle)
            .expect("resize should succeed");

        assert_eq!(resized.as_raw(), source.as_raw());
    }
}
