//! # 试穿流水线模块（tryon）
//!
//! ## 设计思路
//!
//! 该模块将“上传校验 → 临时落盘 → 解码限制 → 锚点定位 → 位置计算 → 叠加合成”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：承载可注入状态（`TryOnService`）
//! - `handler`：编排整条处理流水线与请求状态机
//! - `temp`：临时产物生命周期（RAII + 幂等释放）
//! - `pipeline`：负责解码、像素限制、缩放
//! - `vision`：OpenAI 兼容视觉推理协议与响应解析
//! - `anchor`：锚点定位（含几何中心静默回退）
//! - `placement`：贴图尺寸与位置的纯计算
//! - `compositor`：像素叠加与 PNG 编码
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 实现思路
//!
//! 对外仅暴露必要类型，内部细节保持 `mod` 私有。
//! HTTP 层通过 `TryOnService` 注入状态，视觉后端以 `VisionBackend` 泛型注入，
//! 测试可替换为确定性桩实现。
//!
//! ## 新同事快速上手
//!
//! 可以按下面顺序理解调用链：
//!
//! ```text
//! HTTP POST /try-on
//!    ↓
//! server（multipart 解析 + 参数适配）
//!    ↓
//! service.rs（共享状态、服务入口）
//!    ↓
//! handler.rs（统一编排 + 阶段耗时日志）
//!    ├─ temp.rs（上传落盘 + 作用域释放）
//!    ├─ pipeline.rs（解码 + 像素限制）
//!    ├─ anchor.rs（视觉定位，失败回退中心）
//!    │     └─ vision.rs（Chat Completions 调用 + JSON 提取）
//!    ├─ placement.rs（缩放比例 + 居中坐标）
//!    └─ compositor.rs（alpha 叠加 + PNG 编码）
//!    ↓
//! 返回 PNG 或 TryOnError
//! ```
//!
//! ## 分层职责建议
//!
//! - 上传字段/接口变更优先改 `server` 与 `handler.rs` 入参
//! - 配置与策略变更优先改 `config.rs`
//! - 业务流程顺序变更优先改 `handler.rs`
//! - 单阶段行为优化分别改 `pipeline/anchor/placement/compositor`
//! - 视觉服务协议变更优先改 `vision.rs`

mod anchor;
mod compositor;
mod config;
mod error;
mod handler;
mod pipeline;
mod placement;
mod service;
mod source;
mod temp;
mod vision;

pub use config::{
    DEFAULT_OVERLAY_FRACTION, DEFAULT_VISION_BASE_URL, DEFAULT_VISION_MODEL, TryOnConfig,
};
pub use error::TryOnError;
pub use handler::TryOnRequest;
pub use service::TryOnService;
pub use source::{AnchorPoint, RenderedImage, UploadedPart};
pub use temp::active_artifact_count;
pub use vision::{CompletionRequest, GroqVisionBackend, VisionBackend};
