//! # 视觉推理客户端模块
//!
//! ## 设计思路
//!
//! 外部文本/视觉补全服务是一个“可注入能力边界”：给定提示词（可内嵌一张
//! 图片）与模型标识，返回一段文本或失败。流水线核心只依赖 `VisionBackend`
//! trait，测试时用本地 mock 替换，完全不需要真实网络。
//!
//! 具体协议（OpenAI 兼容 `chat/completions`、Bearer 认证、Groq 接入点）只存在
//! 于 `GroqVisionBackend` 这一个实现里，对流水线正确性无影响。
//!
//! ## 实现思路
//!
//! - 复用型 `reqwest::Client`，连接与整体超时在构建时固定。
//! - 图片以 `data:image/jpeg;base64,...` 形式内嵌到多模态消息。
//! - 响应文本允许被 markdown 代码栅栏或说明文字包裹，解析时提取首个
//!   JSON 对象子串后再交给 `serde_json`。

use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use std::time::Duration;

use super::{TryOnConfig, TryOnError};

/// 一次补全调用的输入。
pub struct CompletionRequest<'a> {
    /// 模型标识。
    pub model: &'a str,
    /// 文本提示词。
    pub prompt: &'a str,
    /// 可选的内嵌图片（JPEG 字节）。
    pub image_jpeg: Option<&'a [u8]>,
}

/// 文本/视觉补全能力边界。
///
/// 约定：实现方不做结果解析，只负责“拿到一段文本或失败”。
pub trait VisionBackend: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl std::future::Future<Output = Result<String, TryOnError>> + Send;
}

/// 视觉响应中期望的锚点字段。
#[derive(Debug, Deserialize)]
struct RawAnchorResponse {
    x: f64,
    y: f64,
    #[serde(default)]
    width: Option<f64>,
}

/// 解析后的锚点估计（降采样坐标系）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorEstimate {
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
}

/// 从模型输出文本中解析锚点 JSON。
///
/// 允许文本被 ```json 栅栏或说明性文字包裹；提取首个 `{` 到末个 `}` 之间的
/// 子串作为候选 JSON。字段缺失、非数值或非有限值一律视为响应不可用。
pub fn parse_anchor_response(text: &str) -> Result<AnchorEstimate, TryOnError> {
    let start = text
        .find('{')
        .ok_or_else(|| TryOnError::InvalidResponse("响应中不包含 JSON 对象".to_string()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| TryOnError::InvalidResponse("响应中 JSON 对象不完整".to_string()))?;

    if end < start {
        return Err(TryOnError::InvalidResponse("响应中 JSON 对象不完整".to_string()));
    }

    let raw: RawAnchorResponse = serde_json::from_str(&text[start..=end])
        .map_err(|e| TryOnError::InvalidResponse(format!("锚点 JSON 解析失败：{}", e)))?;

    if !raw.x.is_finite() || !raw.y.is_finite() {
        return Err(TryOnError::InvalidResponse(format!(
            "锚点坐标非有限值：x={} y={}",
            raw.x, raw.y
        )));
    }

    Ok(AnchorEstimate {
        x: raw.x,
        y: raw.y,
        width: raw.width.filter(|w| w.is_finite() && *w > 0.0),
    })
}

/// Groq（OpenAI 兼容协议）的在线实现。
pub struct GroqVisionBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GroqVisionBackend {
    /// 构建复用型客户端，超时参数来自配置。
    pub fn new(config: &TryOnConfig) -> Result<Self, TryOnError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.vision_timeout_ms))
            .connect_timeout(Duration::from_secs(config.vision_connect_timeout_secs))
            .build()
            .map_err(|e| TryOnError::Network(format!("无法创建 HTTP 客户端：{}", e)))?;

        Ok(Self {
            client,
            base_url: config.vision_base_url.trim_end_matches('/').to_string(),
            api_key: config.vision_api_key.clone(),
        })
    }

    /// 统一映射 reqwest 错误到业务错误。
    fn map_reqwest_error(e: reqwest::Error) -> TryOnError {
        if e.is_timeout() {
            TryOnError::Timeout(format!("视觉推理请求超时：{}", e))
        } else if e.is_connect() {
            TryOnError::Network(format!("无法连接视觉服务：{}", e))
        } else {
            TryOnError::Network(format!("视觉推理请求失败：{}", e))
        }
    }

    fn build_messages(request: &CompletionRequest<'_>) -> serde_json::Value {
        let mut content = vec![serde_json::json!({
            "type": "text",
            "text": request.prompt,
        })];

        if let Some(image) = request.image_jpeg {
            let encoded = general_purpose::STANDARD.encode(image);
            content.push(serde_json::json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:image/jpeg;base64,{}", encoded),
                },
            }));
        }

        serde_json::json!([{ "role": "user", "content": content }])
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl VisionBackend for GroqVisionBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, TryOnError> {
        if self.api_key.is_empty() {
            return Err(TryOnError::Network("未配置视觉服务 API Key".to_string()));
        }

        let body = serde_json::json!({
            "model": request.model,
            "messages": Self::build_messages(&request),
            "temperature": 0,
            "max_tokens": 128,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TryOnError::Network(format!(
                "视觉服务返回 HTTP {}：{}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| TryOnError::InvalidResponse(format!("补全响应解析失败：{}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| TryOnError::InvalidResponse("补全响应不含任何候选".to_string()))
    }
}
