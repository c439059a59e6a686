//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `UploadedPart` 表示 multipart 请求中的一个上传分片
//! - `ImageAsset` 表示已解码的 RGBA 图像（解码后只读，按阶段移交所有权）
//! - `AnchorPoint` / `PlacementPlan` 表示几何推导结果（派生后不再修改）
//! - `RenderedImage` 表示最终合成产物

use image::{ImageFormat, RgbaImage};

/// multipart 请求中的一个上传分片。
#[derive(Debug, Clone)]
pub struct UploadedPart {
    /// 表单字段名。
    pub field: String,
    /// 客户端提供的文件名（可缺省）。
    pub filename: Option<String>,
    /// 客户端声明的内容类型（仅作诊断参考，实际以魔数校验为准）。
    pub content_type: Option<String>,
    /// 原始字节。
    pub bytes: Vec<u8>,
}

/// 解码阶段输出：RGBA 像素数据与元信息。
///
/// 解码完成后只读，所有权在流水线各阶段之间转移，不做并发共享。
#[derive(Debug)]
pub struct ImageAsset {
    /// RGBA8 像素缓冲。
    pub pixels: RgbaImage,
    /// 解码时识别到的原始编码格式。
    pub format: ImageFormat,
}

impl ImageAsset {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// 主体图原始分辨率坐标系下的锚点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoint {
    pub x: f64,
    pub y: f64,
}

impl AnchorPoint {
    /// 几何中心估计：视觉推理不可用时的确定性回退。
    pub fn center_of(width: u32, height: u32) -> Self {
        Self {
            x: f64::from(width) / 2.0,
            y: f64::from(height) / 2.0,
        }
    }
}

/// 贴图缩放与落点方案。
///
/// 由放置计算器一次性派生，之后不再修改。
/// `left` / `top` 允许为负或超出画布，越界部分由合成器裁剪。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPlan {
    /// 贴图缩放后的宽度（像素，≥ 1）。
    pub overlay_width: u32,
    /// 贴图缩放后的高度（像素，≥ 1）。
    pub overlay_height: u32,
    /// 贴图左上角在主体画布上的横坐标。
    pub left: i64,
    /// 贴图左上角在主体画布上的纵坐标。
    pub top: i64,
}

/// 合成阶段输出：编码完成的最终图像。
#[derive(Debug)]
pub struct RenderedImage {
    /// 编码后的图像字节。
    pub bytes: Vec<u8>,
    /// MIME 类型（当前固定为 PNG）。
    pub mime: &'static str,
}
