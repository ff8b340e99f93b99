//! OpenAI 兼容后端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 Chat Completions 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao, vLLM 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{classify_reqwest_error, BackendRequest, BackendResponse, TextBackend};
use crate::error::{BackendError, BackendFailure};

const BACKEND_NAME: &str = "openai";

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// OpenAI 兼容客户端
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    /// 创建新的客户端
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, BackendError> {
        let api_key = api_key.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&base_url);

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(openai_config),
            http,
            api_key,
            base_url,
            model: model.into(),
        })
    }

    fn failed(&self, failure: BackendFailure, message: impl Into<String>) -> BackendError {
        BackendError::call_failed(BACKEND_NAME, failure, message)
    }

    /// 把 async-openai 的错误映射为失败分类
    fn classify(&self, error: &OpenAIError) -> BackendFailure {
        match error {
            OpenAIError::Reqwest(e) => {
                if e.is_timeout() {
                    BackendFailure::Timeout
                } else if e.is_connect() {
                    BackendFailure::ConnectionRefused
                } else if let Some(status) = e.status() {
                    BackendFailure::from_status(status.as_u16(), "")
                } else {
                    BackendFailure::ConnectionRefused
                }
            }
            OpenAIError::ApiError(api) => {
                let message = api.message.to_lowercase();
                if message.contains("model") && (message.contains("not found") || message.contains("does not exist")) {
                    BackendFailure::ModelNotFound
                } else if message.contains("rate limit") {
                    BackendFailure::RateLimited
                } else if message.contains("api key") || message.contains("unauthorized") {
                    BackendFailure::Unauthorized
                } else {
                    BackendFailure::ServerError
                }
            }
            OpenAIError::InvalidArgument(_) => BackendFailure::BadRequest,
            _ => BackendFailure::InvalidResponse,
        }
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    async fn generate(&self, request: &BackendRequest) -> Result<BackendResponse, BackendError> {
        debug!("调用 LLM API，模型: {}", self.model);
        debug!("用户消息长度: {} 字符", request.prompt.chars().count());

        let mut messages = Vec::new();

        // 添加系统消息（如果提供）
        if let Some(sys_msg) = request.system.as_deref() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| self.failed(BackendFailure::BadRequest, e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()
            .map_err(|e| self.failed(BackendFailure::BadRequest, e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| self.failed(BackendFailure::BadRequest, e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.failed(self.classify(&e), e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| self.failed(BackendFailure::EmptyResponse, "LLM 返回内容为空"))?;

        Ok(BackendResponse {
            text: content,
            model: response.model,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(10))
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

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| self.failed(BackendFailure::InvalidResponse, e.to_string()))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
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
        let mut switched = self.clone();
        switched.model = model.to_string();
        Box::new(switched)
    }
}
