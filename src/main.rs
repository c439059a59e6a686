//! # 宠物服饰虚拟试穿服务 — 应用入口
//!
//! 本文件仅负责配置加载、运行时初始化与服务启动。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use pet_tryon::server::AppServer;
use pet_tryon::tryon::{GroqVisionBackend, TryOnConfig, TryOnError, TryOnService};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        log::error!("服务启动失败: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), TryOnError> {
    let config = TryOnConfig::from_env();
    config.validate()?;

    if config.vision_api_key.is_empty() {
        log::warn!("⚠️ 未设置 GROQ_API_KEY，锚点定位将始终回退到几何中心");
    }
    log::info!(
        "⚙️ 配置加载完成 - model={} timeout_ms={} max_upload={}MB",
        config.vision_model,
        config.vision_timeout_ms,
        config.max_upload_bytes / 1024 / 1024
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| TryOnError::InvalidConfig(format!("无法创建异步运行时：{e}")))?;

    let backend = GroqVisionBackend::new(&config)?;
    let port = config.port;
    let service = TryOnService::new(config, backend)?;

    AppServer::bind(service, runtime.handle().clone(), port)?.run();
    Ok(())
}
