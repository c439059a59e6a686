//! # 放置计算模块
//!
//! ## 设计思路
//!
//! 纯函数、无 I/O、无状态：给定主体尺寸、锚点与贴图原始尺寸，推导贴图的
//! 目标缩放尺寸与左上角落点。相同输入永远得到相同输出。
//!
//! 几何约定（与合成器配套）：
//! - 锚点越界时收敛（clamp）到主体边界内，不拒绝请求。
//! - `left` / `top` 不做画布边界收敛，允许为负；越界部分由合成器裁剪。
//! - 目标尺寸受 `max_decoded_pixels` 约束：非有限或超限的宽度提示
//!   拒绝为资源限制错误，而不是交给缩放器分配内存。
//!
//! ## 实现思路
//!
//! ```text
//! target_w = width_hint > 0 ? width_hint : subject_w * overlay_fraction
//! target_h = overlay_natural_h * (target_w / overlay_natural_w)   // 保持宽高比
//! left     = round(anchor.x - target_w / 2)
//! top      = round(anchor.y - target_h / 2)
//! ```
//!
//! 尺寸校验全部在 f64 域完成后才收窄到 `u32`，避免整型转换回绕。

use super::source::{AnchorPoint, PlacementPlan};
use super::{TryOnConfig, TryOnError};

/// 推导贴图放置方案。
///
/// `width_hint` 为非正数、NaN 或缺省时，按 `overlay_fraction` 占主体宽度计算；
/// 无穷大或导致目标像素超过 `max_decoded_pixels` 的提示拒绝为资源限制。
/// 贴图原始宽高任一为零属于输入不合法，直接报错而非静默兜底。
pub fn plan_placement(
    subject_width: u32,
    subject_height: u32,
    anchor: AnchorPoint,
    overlay_natural_width: u32,
    overlay_natural_height: u32,
    width_hint: Option<f64>,
    config: &TryOnConfig,
) -> Result<PlacementPlan, TryOnError> {
    if overlay_natural_width == 0 || overlay_natural_height == 0 {
        return Err(TryOnError::MalformedOverlay(format!(
            "贴图原始尺寸无效：{}x{}",
            overlay_natural_width, overlay_natural_height
        )));
    }
    if subject_width == 0 || subject_height == 0 {
        return Err(TryOnError::Compositing(format!(
            "主体画布尺寸无效：{}x{}",
            subject_width, subject_height
        )));
    }

    let anchor = clamp_anchor(anchor, subject_width, subject_height);

    let target_width_raw = match width_hint {
        // NaN 与非正数都落到默认占比
        Some(hint) if hint > 0.0 => hint,
        _ => f64::from(subject_width) * config.overlay_fraction,
    };

    // 先在 f64 域完成全部上限校验，之后的 u32 收窄才是安全的
    let max_pixels = config.max_decoded_pixels as f64;
    if !target_width_raw.is_finite() || target_width_raw > max_pixels {
        return Err(TryOnError::ResourceLimit(format!(
            "贴图目标宽度过大：{}（像素预算：{}）",
            target_width_raw, config.max_decoded_pixels
        )));
    }

    let overlay_width_raw = target_width_raw.round().max(1.0);
    let overlay_height_raw = (f64::from(overlay_natural_height) * overlay_width_raw
        / f64::from(overlay_natural_width))
    .round()
    .max(1.0);

    if overlay_height_raw > max_pixels || overlay_width_raw * overlay_height_raw > max_pixels {
        return Err(TryOnError::ResourceLimit(format!(
            "贴图目标尺寸过大：{}x{}（像素预算：{}）",
            overlay_width_raw, overlay_height_raw, config.max_decoded_pixels
        )));
    }

    let overlay_width = overlay_width_raw as u32;
    let overlay_height = overlay_height_raw as u32;

    let left = (anchor.x - f64::from(overlay_width) / 2.0).round() as i64;
    let top = (anchor.y - f64::from(overlay_height) / 2.0).round() as i64;

    Ok(PlacementPlan {
        overlay_width,
        overlay_height,
        left,
        top,
    })
}

/// 将锚点收敛到主体坐标范围 `[0, w] x [0, h]` 内。
fn clamp_anchor(anchor: AnchorPoint, subject_width: u32, subject_height: u32) -> AnchorPoint {
    AnchorPoint {
        x: anchor.x.clamp(0.0, f64::from(subject_width)),
        y: anchor.y.clamp(0.0, f64::from(subject_height)),
    }
}
