//! 文本生成后端抽象
//!
//! 后端只被当作"输入提示词、输出文本"的黑盒；
//! 新的后端实现同一个 trait 即可，解析器不依赖具体后端。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// 发送给后端的一次生成请求
#[derive(Debug, Clone, Serialize)]
pub struct BackendRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// 后端返回的原始文本及实际使用的模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub text: String,
    pub model: String,
}

/// 文本生成后端
#[async_trait]
pub trait TextBackend: Send + Sync {
    /// 生成一次（非流式）
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError>;

    /// 列出后端已安装 / 可用的模型
    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// 后端名称（用于日志与元数据）
    fn backend_name(&self) -> &str;

    /// 当前绑定的模型
    fn model(&self) -> &str;

    /// 后端地址
    fn base_url(&self) -> &str;

    /// 返回绑定到另一个模型的新实例（显式重新配置，不修改自身）
    fn with_model(&self, model: &str) -> Box<dyn TextBackend>;
}

/// 把 reqwest 错误映射为失败分类
pub(crate) fn classify_reqwest_error(error: &reqwest::Error) -> crate::error::BackendFailure {
    use crate::error::BackendFailure;

    if error.is_timeout() {
        BackendFailure::Timeout
    } else if error.is_connect() {
        BackendFailure::ConnectionRefused
    } else if let Some(status) = error.status() {
        BackendFailure::from_status(status.as_u16(), "")
    } else if error.is_decode() {
        BackendFailure::InvalidResponse
    } else {
        BackendFailure::ConnectionRefused
    }
}
