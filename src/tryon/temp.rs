//! # 临时资源管理模块
//!
//! ## 设计思路
//!
//! 每个请求的上传文件落盘为独立命名临时文件，生命周期与请求严格绑定：
//! 创建 → 单阶段读取 → 请求结束前无条件释放。
//! 释放建模为“作用域持有 + RAII 兜底”，而不是在每个返回点重复删除调用：
//! - `release` 显式幂等释放（成功路径在响应前调用）
//! - `Drop` 兜底（异常路径、调用方断连、panic）
//!
//! ## 实现思路
//!
//! - `tempfile::NamedTempFile` 保证路径唯一，天然避免跨请求别名。
//! - 进程级活跃计数器用于测试侧泄漏断言，不参与运行时错误上报。

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::NamedTempFile;

use super::TryOnError;

static ACTIVE_ARTIFACTS: AtomicUsize = AtomicUsize::new(0);

/// 当前进程内未释放的临时产物数量。
///
/// 仅供测试做泄漏守卫断言；任何请求结束后该值应回落到请求前水平。
pub fn active_artifact_count() -> usize {
    ACTIVE_ARTIFACTS.load(Ordering::SeqCst)
}

/// 一个已落盘的上传产物。
///
/// `release` 幂等：调用零次或多次均安全，首次调用后文件即被删除。
pub struct TempArtifact {
    label: &'static str,
    file: Option<NamedTempFile>,
}

impl TempArtifact {
    /// 将上传字节写入新的命名临时文件。
    pub(crate) fn spool(label: &'static str, bytes: &[u8]) -> Result<Self, TryOnError> {
        let mut file = NamedTempFile::new()
            .map_err(|e| TryOnError::FileSystem(format!("无法创建临时文件（{}）：{}", label, e)))?;

        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| TryOnError::FileSystem(format!("无法写入临时文件（{}）：{}", label, e)))?;

        ACTIVE_ARTIFACTS.fetch_add(1, Ordering::SeqCst);
        log::debug!("📄 临时产物已落盘 - label={} path={:?} bytes={}", label, file.path(), bytes.len());

        Ok(Self {
            label,
            file: Some(file),
        })
    }

    /// 读回全部字节。已释放的产物返回文件错误。
    pub fn read(&self) -> Result<Vec<u8>, TryOnError> {
        let file = self.file.as_ref().ok_or_else(|| {
            TryOnError::FileSystem(format!("临时产物已释放，无法读取（{}）", self.label))
        })?;

        std::fs::read(file.path())
            .map_err(|e| TryOnError::FileSystem(format!("无法读取临时文件（{}）：{}", self.label, e)))
    }

    /// 幂等释放：首次调用删除文件并递减活跃计数，之后调用为空操作。
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            ACTIVE_ARTIFACTS.fetch_sub(1, Ordering::SeqCst);
            if let Err(err) = file.close() {
                log::warn!("⚠️ 临时产物删除失败 - label={}: {}", self.label, err);
            }
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release();
    }
}

/// 单请求作用域：持有该请求获取的全部临时产物。
///
/// 编排器在进入终止状态前调用 `release_all`；`Drop` 覆盖所有遗漏路径。
#[derive(Default)]
pub struct TempScope {
    artifacts: Vec<TempArtifact>,
}

impl TempScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// 落盘一个上传分片，返回作用域内句柄下标。
    pub fn spool(&mut self, label: &'static str, bytes: &[u8]) -> Result<usize, TryOnError> {
        let artifact = TempArtifact::spool(label, bytes)?;
        self.artifacts.push(artifact);
        Ok(self.artifacts.len() - 1)
    }

    /// 读回指定产物的字节。
    pub fn read(&self, handle: usize) -> Result<Vec<u8>, TryOnError> {
        self.artifacts
            .get(handle)
            .ok_or_else(|| TryOnError::FileSystem(format!("临时产物句柄无效：{}", handle)))?
            .read()
    }

    /// 释放作用域内全部产物（幂等）。
    pub fn release_all(&mut self) {
        for artifact in &mut self.artifacts {
            artifact.release();
        }
    }
}

impl Drop for TempScope {
    fn drop(&mut self) {
        self.release_all();
    }
}
