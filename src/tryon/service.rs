//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! 使用 `TryOnService` 作为 HTTP 层注入的共享状态，替代全局单例函数。
//! 好处：
//! 1. 生命周期清晰（由 `main.rs` 统一管理）
//! 2. 测试可创建独立实例，减少共享状态副作用
//! 3. 视觉后端以泛型注入，测试可替换为确定性桩实现
//!
//! ## 实现思路
//!
//! 对外仅暴露少量稳定 API：
//! - `try_on`：执行完整试穿链路
//! - `update_vision_settings`：运行时调整视觉参数
//! - `config_snapshot`：读取当前配置快照

use std::sync::Arc;

use super::handler::{TryOnHandler, TryOnRequest};
use super::source::RenderedImage;
use super::vision::VisionBackend;
use super::{TryOnConfig, TryOnError};

/// 试穿服务共享状态。
///
/// `Clone` 后共享同一编排器实例，可安全地在多个请求线程间传递。
pub struct TryOnService<B> {
    handler: Arc<TryOnHandler<B>>,
}

impl<B> Clone for TryOnService<B> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<B: VisionBackend> TryOnService<B> {
    /// 创建服务实例（配置在此处一次性校验）。
    pub fn new(config: TryOnConfig, backend: B) -> Result<Self, TryOnError> {
        Ok(Self {
            handler: Arc::new(TryOnHandler::new(config, backend)?),
        })
    }

    /// 执行一次完整的试穿请求。
    pub async fn try_on(&self, request: TryOnRequest) -> Result<RenderedImage, TryOnError> {
        self.handler.process(request).await
    }

    /// 运行时调整视觉探测参数（先校验后生效）。
    pub fn update_vision_settings(&self, timeout_ms: u64, max_width: u32) -> Result<(), TryOnError> {
        self.handler.update_vision_settings(timeout_ms, max_width)
    }

    /// 当前配置快照。
    pub fn config_snapshot(&self) -> Result<TryOnConfig, TryOnError> {
        self.handler.config_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tryon::source::UploadedPart;
    use crate::tryon::vision::CompletionRequest;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    struct CenterBackend;

    impl VisionBackend for CenterBackend {
        async fn complete(&self, _request: CompletionRequest<'_>) -> Result<String, TryOnError> {
            Ok(r#"{"x": 30, "y": 20}"#.to_string())
        }
    }

    fn png_part(field: &str, width: u32, height: u32) -> UploadedPart {
        let img = ImageBuffer::from_pixel(width, height, Rgba([128u8, 128, 128, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");

        UploadedPart {
            field: field.to_string(),
            filename: None,
            content_type: Some("image/png".to_string()),
            bytes: cursor.into_inner(),
        }
    }

    #[tokio::test]
    async fn cloned_service_shares_runtime_config() {
        let service =
            TryOnService::new(TryOnConfig::default(), CenterBackend).expect("service init failed");
        let clone = service.clone();

        service
            .update_vision_settings(4_000, 320)
            .expect("vision settings update failed");

        let snapshot = clone.config_snapshot().expect("config snapshot failed");
        assert_eq!(snapshot.vision_timeout_ms, 4_000);
        assert_eq!(snapshot.vision_max_width, 320);
    }

    #[tokio::test]
    async fn try_on_delegates_to_handler() {
        // 会落盘临时文件，与其他断言资产计数的用例串行
        let _guard = crate::tryon::temp::test_support::leak_guard();
        let service =
            TryOnService::new(TryOnConfig::default(), CenterBackend).expect("service init failed");

        let rendered = service
            .try_on(TryOnRequest {
                subject: Some(png_part("subject", 60, 40)),
                overlay: Some(png_part("overlay", 10, 10)),
                overlay_width_hint: None,
            })
            .await
            .expect("try-on should succeed");

        let output = image::load_from_memory(&rendered.bytes).expect("output should decode");
        assert_eq!((output.width(), output.height()), (60, 40));
    }
}
