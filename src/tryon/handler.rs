//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `TryOnHandler` 只负责流程编排与配置管理，不直接与 HTTP 绑定。
//! 单请求状态机固定为：
//!
//! ```text
//! Validating → LocatingAnchor → Compositing → Done | Failed
//! ```
//!
//! - `Validating`：缺少上传在创建任何临时产物之前拒绝。
//! - `LocatingAnchor`：自身不会让请求失败（见 anchor 模块的回退约定）。
//! - 进入任何终止状态之前，本请求获取的全部临时产物先被释放，再产生响应。
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<TryOnConfig>>` 支持运行时调整。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 记录 `validate/spool/decode/anchor/compose/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::anchor::AnchorLocator;
use super::pipeline::{self, DecodeRole};
use super::source::{RenderedImage, UploadedPart};
use super::temp::TempScope;
use super::vision::VisionBackend;
use super::{TryOnConfig, TryOnError, compositor, placement};

/// 一次试穿请求的输入集合。
///
/// `subject` / `overlay` 为 `None` 表示对应 multipart 字段缺失。
pub struct TryOnRequest {
    pub subject: Option<UploadedPart>,
    pub overlay: Option<UploadedPart>,
    /// 可选的贴图目标宽度提示（非正数视为缺省）。
    pub overlay_width_hint: Option<f64>,
}

/// 各阶段耗时，汇总到单行日志。
#[derive(Default)]
struct StageTimings {
    validate: Duration,
    spool: Duration,
    decode: Duration,
    anchor: Duration,
    compose: Duration,
}

/// 试穿流水线编排器。
///
/// 封装配置状态与锚点定位器，编排各子模块实现完整流程。
pub struct TryOnHandler<B> {
    config: Arc<RwLock<TryOnConfig>>,
    locator: AnchorLocator<B>,
}

impl<B: VisionBackend> TryOnHandler<B> {
    /// 根据初始配置与注入的视觉后端创建编排器。
    pub fn new(config: TryOnConfig, backend: B) -> Result<Self, TryOnError> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            locator: AnchorLocator::new(backend),
        })
    }

    /// 获取配置快照，保证单次请求链路使用一致参数。
    pub(super) fn config_snapshot(&self) -> Result<TryOnConfig, TryOnError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| TryOnError::InvalidConfig("配置读取锁已中毒".to_string()))
    }

    /// 更新可运行时调整的视觉参数（先校验后生效）。
    pub(super) fn update_vision_settings(
        &self,
        timeout_ms: u64,
        max_width: u32,
    ) -> Result<(), TryOnError> {
        let mut candidate = self.config_snapshot()?;
        candidate.vision_timeout_ms = timeout_ms;
        candidate.vision_max_width = max_width;
        candidate.validate()?;

        let mut config = self
            .config
            .write()
            .map_err(|_| TryOnError::InvalidConfig("配置写入锁已中毒".to_string()))?;
        config.vision_timeout_ms = timeout_ms;
        config.vision_max_width = max_width;

        log::info!("⚙️ 已更新视觉参数 - timeout_ms={} max_width={}", timeout_ms, max_width);
        Ok(())
    }

    /// 处理主入口：校验上传 → 落盘 → 解码 → 定位 → 合成。
    ///
    /// 无论成功失败，本请求的全部临时产物都在返回之前释放。
    pub async fn process(&self, request: TryOnRequest) -> Result<RenderedImage, TryOnError> {
        let config = self.config_snapshot()?;
        let total_start = Instant::now();
        let mut timings = StageTimings::default();

        // Validating：此处失败时尚未创建任何临时产物
        let validate_start = Instant::now();
        let (subject_part, overlay_part) = Self::validate_uploads(request.subject, request.overlay, &config)?;
        timings.validate = validate_start.elapsed();

        let mut scope = TempScope::new();
        let result = self
            .run_pipeline(
                &mut scope,
                &config,
                &subject_part,
                &overlay_part,
                request.overlay_width_hint,
                &mut timings,
            )
            .await;

        // 清理先于响应：这是不变量而不是优化
        scope.release_all();

        let total = total_start.elapsed();
        match &result {
            Ok(rendered) => log::info!(
                "✅ 试穿合成完成 - validate={}ms spool={}ms decode={}ms anchor={}ms compose={}ms total={}ms output={}KB",
                timings.validate.as_millis(),
                timings.spool.as_millis(),
                timings.decode.as_millis(),
                timings.anchor.as_millis(),
                timings.compose.as_millis(),
                total.as_millis(),
                rendered.bytes.len() / 1024
            ),
            Err(err) => log::warn!(
                "⚠️ 试穿请求失败 - code={} stage={} total={}ms: {}",
                err.code(),
                err.stage(),
                total.as_millis(),
                err
            ),
        }

        result
    }

    /// 上传存在性与体积校验。
    fn validate_uploads(
        subject: Option<UploadedPart>,
        overlay: Option<UploadedPart>,
        config: &TryOnConfig,
    ) -> Result<(UploadedPart, UploadedPart), TryOnError> {
        let subject =
            subject.ok_or_else(|| TryOnError::MissingInput("subject（主体照片）".to_string()))?;
        let overlay =
            overlay.ok_or_else(|| TryOnError::MissingInput("overlay（贴图）".to_string()))?;

        for part in [&subject, &overlay] {
            if part.bytes.is_empty() {
                return Err(TryOnError::MissingInput(format!("{} 字段内容为空", part.field)));
            }
            if part.bytes.len() as u64 > config.max_upload_bytes {
                return Err(TryOnError::ResourceLimit(format!(
                    "{} 上传体积过大：{:.2} MB（限制：{:.2} MB）",
                    part.field,
                    part.bytes.len() as f64 / 1024.0 / 1024.0,
                    config.max_upload_bytes as f64 / 1024.0 / 1024.0
                )));
            }
        }

        Ok((subject, overlay))
    }

    async fn run_pipeline(
        &self,
        scope: &mut TempScope,
        config: &TryOnConfig,
        subject_part: &UploadedPart,
        overlay_part: &UploadedPart,
        width_hint: Option<f64>,
        timings: &mut StageTimings,
    ) -> Result<RenderedImage, TryOnError> {
        let spool_start = Instant::now();
        let subject_handle = scope.spool("subject", &subject_part.bytes)?;
        let overlay_handle = scope.spool("overlay", &overlay_part.bytes)?;
        timings.spool = spool_start.elapsed();

        let decode_start = Instant::now();
        let subject = pipeline::decode_image(&scope.read(subject_handle)?, config, DecodeRole::Subject)?;
        let overlay = pipeline::decode_image(&scope.read(overlay_handle)?, config, DecodeRole::Overlay)?;
        timings.decode = decode_start.elapsed();

        // LocatingAnchor：永不失败，最坏情况回退几何中心
        let anchor_start = Instant::now();
        let located = self.locator.locate(&subject, config).await;
        timings.anchor = anchor_start.elapsed();

        // 调用方提示优先，其次采纳模型给出的宽度建议
        let effective_hint = width_hint
            .filter(|hint| *hint > 0.0)
            .or(located.suggested_width);

        let compose_start = Instant::now();
        let plan = placement::plan_placement(
            subject.width(),
            subject.height(),
            located.point,
            overlay.width(),
            overlay.height(),
            effective_hint,
            config,
        )?;
        let rendered = compositor::composite(&subject, &overlay, &plan, config)?;
        timings.compose = compose_start.elapsed();

        Ok(rendered)
    }
}
