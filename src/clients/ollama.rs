//! Ollama 后端
//!
//! 调用本地 Ollama 服务的 `/api/generate`（非流式）与 `/api/tags`。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::backend::{classify_reqwest_error, BackendRequest, BackendResponse, TextBackend};
use crate::error::{BackendError, BackendFailure};

const BACKEND_NAME: &str = "ollama";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateReply {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

/// Ollama 客户端
#[derive(Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// 创建新的 Ollama 客户端
    ///
    /// 请求总超时由 `ModelClient` 控制，这里只设置连接超时。
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    fn failed(&self, failure: BackendFailure, message: impl Into<String>) -> BackendError {
        BackendError::call_failed(BACKEND_NAME, failure, message)
    }
}

#[async_trait]
impl TextBackend for OllamaBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!("调用 Ollama: {} (模型: {})", url, self.model);

        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.failed(classify_reqwest_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(self.failed(
                BackendFailure::from_status(status.as_u16(), &error_text),
                format!("HTTP {}: {}", status, error_text),
            ));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| self.failed(BackendFailure::InvalidResponse, e.to_string()))?;

        if reply.response.trim().is_empty() {
            return Err(self.failed(BackendFailure::EmptyResponse, "response 字段为空"));
        }

        Ok(BackendResponse {
            text: reply.response,
            model: reply.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| self.failed(classify_reqwest_error(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(
                BackendFailure::from_status(status.as_u16(), ""),
                format!("HTTP {}", status),
            ));
        }

        let tags: TagsReply = response
            .json()
            .await
            .map_err(|e| self.failed(BackendFailure::InvalidResponse, e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn backend_name(&self) -> &str {
        BACKEND_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_model(&self, model: &str) -> Box<dyn TextBackend> {
        Box::new(Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        })
    }
}
