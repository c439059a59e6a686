//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载试穿流水线中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 分类约定：
//! - 客户端错误（400/413）：缺少上传、贴图不合法、资源超限
//! - 服务端错误（500）：合成阶段失败、临时文件读写失败
//! - 视觉推理错误（`Network` / `Timeout` / `InvalidResponse`）永远不对外暴露，
//!   由锚点定位器内部吸收并回退到几何中心估计。

/// 试穿流水线统一错误类型。
///
/// 该类型会在 HTTP 层被转换为结构化错误响应体（`code` / `stage` / `message`）。
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    #[error("缺少必需的上传字段：{0}")]
    MissingInput(String),

    #[error("贴图不合法：{0}")]
    MalformedOverlay(String),

    #[error("网络错误：{0}")]
    Network(String),

    #[error("超时错误：{0}")]
    Timeout(String),

    #[error("视觉响应不可用：{0}")]
    InvalidResponse(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 主体图解码失败。对外与合成失败共用错误码（均为服务端 500），
    /// 但阶段标注为解码，保证日志里的阶段归因准确。
    #[error("主体图不可用：{0}")]
    SubjectUndecodable(String),

    #[error("合成失败：{0}")]
    Compositing(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("配置错误：{0}")]
    InvalidConfig(String),
}

impl TryOnError {
    /// 机器可读错误码，供前端与日志聚合检索。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "E_MISSING_INPUT",
            Self::MalformedOverlay(_) => "E_MALFORMED_OVERLAY",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::InvalidResponse(_) => "E_INVALID_RESPONSE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::SubjectUndecodable(_) => "E_COMPOSITING",
            Self::Compositing(_) => "E_COMPOSITING",
            Self::FileSystem(_) => "E_FILESYSTEM",
            Self::InvalidConfig(_) => "E_INVALID_CONFIG",
        }
    }

    /// 发生错误的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "validate",
            Self::MalformedOverlay(_) => "decode",
            Self::Network(_) | Self::Timeout(_) | Self::InvalidResponse(_) => "anchor",
            Self::ResourceLimit(_) => "decode",
            Self::SubjectUndecodable(_) => "decode",
            Self::Compositing(_) => "compose",
            Self::FileSystem(_) => "spool",
            Self::InvalidConfig(_) => "config",
        }
    }

    /// 对外 HTTP 状态码。
    ///
    /// 注意：视觉推理类错误按约定不应到达 HTTP 层；若意外到达按 500 处理。
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingInput(_) | Self::MalformedOverlay(_) => 400,
            Self::ResourceLimit(_) => 413,
            Self::Network(_)
            | Self::Timeout(_)
            | Self::InvalidResponse(_)
            | Self::SubjectUndecodable(_)
            | Self::Compositing(_)
            | Self::FileSystem(_)
            | Self::InvalidConfig(_) => 500,
        }
    }

    /// 是否属于客户端错误（校验阶段即可拒绝）。
    pub fn is_client_error(&self) -> bool {
        self.status() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(TryOnError::MissingInput("subject".into()).status(), 400);
        assert_eq!(TryOnError::MalformedOverlay("zero width".into()).status(), 400);
        assert_eq!(TryOnError::ResourceLimit("too big".into()).status(), 413);
        assert!(TryOnError::MissingInput("subject".into()).is_client_error());
    }

    #[test]
    fn internal_errors_map_to_500() {
        assert_eq!(TryOnError::Compositing("encode".into()).status(), 500);
        assert_eq!(TryOnError::FileSystem("spool".into()).status(), 500);
        assert!(!TryOnError::Compositing("encode".into()).is_client_error());
    }

    #[test]
    fn subject_decode_failure_reports_decode_stage() {
        let err = TryOnError::SubjectUndecodable("not an image".into());
        assert_eq!(err.stage(), "decode");
        assert_eq!(err.code(), "E_COMPOSITING");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn vision_errors_carry_anchor_stage() {
        assert_eq!(TryOnError::Timeout("8s".into()).stage(), "anchor");
        assert_eq!(TryOnError::Network("refused".into()).stage(), "anchor");
        assert_eq!(TryOnError::InvalidResponse("not json".into()).stage(), "anchor");
    }
}
