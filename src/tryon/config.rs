//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `TryOnConfig`，保证运行时行为可观测、可调整、可测试。
//! 覆盖上传限制、解码限制、视觉探测、贴图缩放策略与服务端口五类参数。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置。
//! - `from_env` 读取部署环境变量（`GROQ_API_KEY` / `PORT` / `TRYON_*`）。
//! - `validate` 对关键参数做范围校验，拒绝明显不合理的取值。

use image::imageops::FilterType;

use super::TryOnError;

/// 视觉推理服务的默认接入点（OpenAI 兼容协议）。
pub const DEFAULT_VISION_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// 默认视觉模型标识。
pub const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// 未提供宽度提示时，贴图目标宽度占主体宽度的比例。
pub const DEFAULT_OVERLAY_FRACTION: f64 = 0.45;

/// 试穿流水线配置。
///
/// 字段覆盖上传、解码、视觉探测与合成四个阶段。
#[derive(Debug, Clone)]
pub struct TryOnConfig {
    /// 单个上传文件允许的最大体积（字节）。
    pub max_upload_bytes: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 发送给视觉模型前，主体图降采样的最大宽度。
    pub vision_max_width: u32,
    /// 降采样探测图的 JPEG 质量（1~100）。
    pub vision_jpeg_quality: u8,
    /// 视觉推理调用的硬性超时上限（毫秒）。
    pub vision_timeout_ms: u64,
    /// 建立连接（TCP/TLS）超时时间（秒）。
    pub vision_connect_timeout_secs: u64,
    /// 视觉服务 Base URL（OpenAI 兼容）。
    pub vision_base_url: String,
    /// 视觉模型标识。
    pub vision_model: String,
    /// 视觉服务 API Key（为空时仅能走几何回退）。
    pub vision_api_key: String,
    /// 未提供宽度提示时的贴图宽度占比（0 ~ 1）。
    pub overlay_fraction: f64,
    /// 贴图缩放滤镜策略。
    pub resize_filter: FilterType,
    /// HTTP 服务监听端口。
    pub port: u16,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 25 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            vision_max_width: 512,
            vision_jpeg_quality: 70,
            vision_timeout_ms: 8_000,
            vision_connect_timeout_secs: 8,
            vision_base_url: DEFAULT_VISION_BASE_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            vision_api_key: String::new(),
            overlay_fraction: DEFAULT_OVERLAY_FRACTION,
            resize_filter: FilterType::Triangle,
            port: 3000,
        }
    }
}

impl TryOnConfig {
    /// 从部署环境变量构建配置。
    ///
    /// 未设置的变量保持默认值；解析失败的数值变量记录告警后忽略。
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            config.vision_api_key = key;
        }
        if let Ok(url) = std::env::var("TRYON_VISION_BASE_URL") {
            if !url.trim().is_empty() {
                config.vision_base_url = url;
            }
        }
        if let Ok(model) = std::env::var("TRYON_VISION_MODEL") {
            if !model.trim().is_empty() {
                config.vision_model = model;
            }
        }

        Self::apply_env_number("PORT", |v| config.port = v);
        Self::apply_env_number("TRYON_VISION_TIMEOUT_MS", |v| config.vision_timeout_ms = v);
        Self::apply_env_number("TRYON_VISION_MAX_WIDTH", |v| config.vision_max_width = v);
        Self::apply_env_number("TRYON_MAX_UPLOAD_BYTES", |v| config.max_upload_bytes = v);

        config
    }

    fn apply_env_number<T: std::str::FromStr>(name: &str, apply: impl FnOnce(T)) {
        match std::env::var(name) {
            Ok(raw) => match raw.trim().parse::<T>() {
                Ok(value) => apply(value),
                Err(_) => log::warn!("⚠️ 环境变量 {} 解析失败，保持默认值（原始值：{}）", name, raw),
            },
            Err(_) => {}
        }
    }

    /// 范围校验：拒绝明显不合理的取值组合。
    pub fn validate(&self) -> Result<(), TryOnError> {
        if self.max_upload_bytes < 64 * 1024 {
            return Err(TryOnError::InvalidConfig("max_upload_bytes 不能小于 64KB".to_string()));
        }
        if self.max_decoded_pixels < 10_000 {
            return Err(TryOnError::InvalidConfig("max_decoded_pixels 不能小于 10000".to_string()));
        }
        if !(64..=2048).contains(&self.vision_max_width) {
            return Err(TryOnError::InvalidConfig("vision_max_width 必须在 64~2048 之间".to_string()));
        }
        if !(1..=100).contains(&self.vision_jpeg_quality) {
            return Err(TryOnError::InvalidConfig("vision_jpeg_quality 必须在 1~100 之间".to_string()));
        }
        if !(200..=120_000).contains(&self.vision_timeout_ms) {
            return Err(TryOnError::InvalidConfig("vision_timeout_ms 必须在 200~120000 毫秒之间".to_string()));
        }
        if !(1..=120).contains(&self.vision_connect_timeout_secs) {
            return Err(TryOnError::InvalidConfig("vision_connect_timeout_secs 必须在 1~120 秒之间".to_string()));
        }
        if !(self.overlay_fraction > 0.0 && self.overlay_fraction <= 1.0) {
            return Err(TryOnError::InvalidConfig("overlay_fraction 必须在 (0, 1] 区间".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        TryOnConfig::default().validate().expect("default config should be valid");
    }

    #[test]
    fn validation_rejects_zero_overlay_fraction() {
        let mut config = TryOnConfig::default();
        config.overlay_fraction = 0.0;

        assert!(matches!(config.validate(), Err(TryOnError::InvalidConfig(_))));
    }

    #[test]
    fn validation_rejects_out_of_range_vision_timeout() {
        let mut config = TryOnConfig::default();
        config.vision_timeout_ms = 10;
        assert!(matches!(config.validate(), Err(TryOnError::InvalidConfig(_))));

        config.vision_timeout_ms = 500_000;
        assert!(matches!(config.validate(), Err(TryOnError::InvalidConfig(_))));
    }

    #[test]
    fn validation_rejects_tiny_vision_width() {
        let mut config = TryOnConfig::default();
        config.vision_max_width = 16;

        assert!(matches!(config.validate(), Err(TryOnError::InvalidConfig(_))));
    }
}
