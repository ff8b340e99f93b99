//! 模型客户端 - 传输与容错层
//!
//! 在 [`TextBackend`] 之上提供：
//! - 单次请求超时（超时即放弃本次调用）
//! - 瞬时故障的有限次重试（指数退避，有上限）
//! - 不可重试的错误（请求非法、模型不存在）立即失败
//! - 返回实际提供服务的后端 / 模型，供元数据记录来源
//!
//! 客户端本身不可变；切换模型通过 [`ModelClient::with_model`] 得到新实例。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::backend::{BackendRequest, TextBackend};
use crate::config::Config;
use crate::error::{AppError, AppResult, BackendError, BackendFailure};
use crate::services::prompt_builder::PromptSpec;

/// 超时与重试参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub timeout_ms: u64,
    pub max_retries: u32,
}

/// 退避与采样参数（构造时确定）
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub defaults: GenerateOptions,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            defaults: GenerateOptions {
                timeout_ms: config.timeout_ms,
                max_retries: config.max_retries,
            },
            retry_backoff_ms: config.retry_backoff_ms,
            retry_backoff_max_ms: config.retry_backoff_max_ms,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let delay = self.retry_backoff_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.retry_backoff_max_ms))
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 后端原始响应
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub text: String,
    /// 实际提供服务的模型
    pub model: String,
    pub backend: String,
    /// 总尝试次数（含成功的一次）
    pub attempts: u32,
    pub elapsed_ms: u64,
}

/// 后端状态
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub backend: String,
    pub base_url: String,
    pub current_model: String,
    pub available: bool,
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 模型客户端
#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn TextBackend>,
    settings: ClientSettings,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn TextBackend>, settings: ClientSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// 使用默认超时与重试参数生成
    pub async fn generate(&self, prompt: &PromptSpec) -> AppResult<RawResponse> {
        self.generate_with(prompt, self.settings.defaults).await
    }

    /// 使用指定超时与重试参数生成
    ///
    /// 重试循环只处理分类为瞬时的失败；每次重试都是一次全新的、幂等的请求。
    pub async fn generate_with(
        &self,
        prompt: &PromptSpec,
        options: GenerateOptions,
    ) -> AppResult<RawResponse> {
        let request = BackendRequest {
            prompt: prompt.text.clone(),
            system: prompt.system.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let timeout = Duration::from_millis(options.timeout_ms);
        let max_attempts = options.max_retries.saturating_add(1);
        let started = Instant::now();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            debug!(
                "调用后端 {} (模型: {}), 第 {}/{} 次",
                self.backend_name(),
                self.model(),
                attempt,
                max_attempts
            );

            let error = match tokio::time::timeout(timeout, self.backend.generate(&request)).await
            {
                Ok(Ok(response)) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    info!(
                        "✓ 后端响应成功 (模型: {}, 尝试 {} 次, 耗时 {} ms)",
                        response.model, attempt, elapsed_ms
                    );
                    return Ok(RawResponse {
                        text: response.text,
                        model: response.model,
                        backend: self.backend_name().to_string(),
                        attempts: attempt,
                        elapsed_ms,
                    });
                }
                Ok(Err(error)) => error,
                Err(_) => BackendError::call_failed(
                    self.backend_name(),
                    BackendFailure::Timeout,
                    format!("{} ms 内未收到完整响应", options.timeout_ms),
                ),
            };

            let failure = error.failure();
            if !error.is_transient() {
                warn!("后端调用失败（不可重试）: {}", error);
                return Err(AppError::backend_unavailable(
                    self.backend_name(),
                    attempt,
                    failure,
                    error.to_string(),
                ));
            }
            if attempt >= max_attempts {
                warn!("后端调用失败，已尝试 {} 次: {}", attempt, error);
                return Err(AppError::backend_unavailable(
                    self.backend_name(),
                    attempt,
                    failure,
                    error.to_string(),
                ));
            }

            let delay = self.settings.backoff(attempt);
            warn!(
                "后端调用失败 ({}), {} ms 后重试 ({}/{})",
                failure,
                delay.as_millis(),
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// 列出后端可用的模型
    pub async fn list_models(&self) -> AppResult<Vec<String>> {
        Ok(self.backend.list_models().await?)
    }

    /// 查询后端状态（不会失败，错误记录在 `error` 字段中）
    pub async fn status(&self) -> BackendStatus {
        let (available, models, error) = match self.backend.list_models().await {
            Ok(models) => (true, models, None),
            Err(e) => (false, Vec::new(), Some(e.to_string())),
        };
        BackendStatus {
            backend: self.backend_name().to_string(),
            base_url: self.backend.base_url().to_string(),
            current_model: self.model().to_string(),
            available,
            models,
            error,
        }
    }

    /// 返回绑定到指定模型的新客户端
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            backend: Arc::from(self.backend.with_model(model)),
            settings: self.settings.clone(),
        }
    }

    /// 如果优先模型之一已安装，返回绑定到该模型的新客户端；否则返回当前配置的副本
    pub async fn select_preferred(&self, preferred: &[String]) -> Self {
        let installed = match self.backend.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!("无法获取模型列表，保持当前模型 {}: {}", self.model(), e);
                return self.clone();
            }
        };

        match preferred
            .iter()
            .find(|wanted| installed.iter().any(|m| m == *wanted))
        {
            Some(model) if model != self.model() => {
                info!("🔁 切换到优先模型: {} -> {}", self.model(), model);
                self.with_model(model)
            }
            _ => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::backend::BackendResponse;
    use crate::models::QuestionType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 前 `failures` 次返回指定错误，之后成功
    struct FlakyBackend {
        failures: u32,
        failure: BackendFailure,
        delay: Duration,
        calls: AtomicU32,
        model: String,
    }

    impl FlakyBackend {
        fn new(failures: u32, failure: BackendFailure) -> Self {
            Self {
                failures,
                failure,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
                model: "mock-7b".to_string(),
            }
        }
    }

    #[async_trait]
    impl TextBackend for FlakyBackend {
        async fn generate(
            &self,
            _request: &BackendRequest,
        ) -> Result<BackendResponse, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call <= self.failures {
                return Err(BackendError::call_failed("mock", self.failure, "scripted"));
            }
            Ok(BackendResponse {
                text: "1. ok".to_string(),
                model: self.model.clone(),
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["mock-7b".to_string(), "deepseek-r1:7b".to_string()])
        }

        fn backend_name(&self) -> &str {
            "mock"
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn base_url(&self) -> &str {
            "http://mock"
        }

        fn with_model(&self, model: &str) -> Box<dyn TextBackend> {
            Box::new(FlakyBackend {
                failures: self.failures,
                failure: self.failure,
                delay: self.delay,
                calls: AtomicU32::new(0),
                model: model.to_string(),
            })
        }
    }

    fn fast_settings(max_retries: u32, timeout_ms: u64) -> ClientSettings {
        ClientSettings {
            defaults: GenerateOptions {
                timeout_ms,
                max_retries,
            },
            retry_backoff_ms: 1,
            retry_backoff_max_ms: 4,
            temperature: 0.7,
            max_tokens: 256,
        }
    }

    fn prompt() -> PromptSpec {
        PromptSpec {
            text: "generate".to_string(),
            system: None,
            expected_format_hint: String::new(),
            question_type: QuestionType::FillBlank,
            count: 1,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = Arc::new(FlakyBackend::new(2, BackendFailure::ServerError));
        let client = ModelClient::new(backend.clone(), fast_settings(2, 1_000));

        let raw = client.generate(&prompt()).await.unwrap();
        assert_eq!(raw.attempts, 3);
        assert_eq!(raw.model, "mock-7b");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let backend = Arc::new(FlakyBackend::new(10, BackendFailure::ConnectionRefused));
        let client = ModelClient::new(backend.clone(), fast_settings(2, 1_000));

        let err = client.generate(&prompt()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendUnavailable);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let backend = Arc::new(FlakyBackend::new(10, BackendFailure::ModelNotFound));
        let client = ModelClient::new(backend.clone(), fast_settings(5, 1_000));

        let err = client.generate(&prompt()).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BackendUnavailable);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let mut flaky = FlakyBackend::new(0, BackendFailure::ServerError);
        flaky.delay = Duration::from_millis(200);
        let backend = Arc::new(flaky);
        let client = ModelClient::new(backend.clone(), fast_settings(1, 20));

        let err = client.generate(&prompt()).await.unwrap_err();
        match err {
            AppError::Backend(BackendError::Unavailable {
                attempts,
                last_failure,
                ..
            }) => {
                assert_eq!(attempts, 2);
                assert_eq!(last_failure, BackendFailure::Timeout);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let settings = ClientSettings {
            retry_backoff_ms: 1_000,
            retry_backoff_max_ms: 5_000,
            ..ClientSettings::default()
        };
        assert_eq!(settings.backoff(1), Duration::from_millis(1_000));
        assert_eq!(settings.backoff(2), Duration::from_millis(2_000));
        assert_eq!(settings.backoff(3), Duration::from_millis(4_000));
        assert_eq!(settings.backoff(4), Duration::from_millis(5_000));
        assert_eq!(settings.backoff(40), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_select_preferred_and_status() {
        let backend = Arc::new(FlakyBackend::new(0, BackendFailure::ServerError));
        let client = ModelClient::new(backend, fast_settings(0, 1_000));

        let switched = client
            .select_preferred(&["llama2:7b".to_string(), "deepseek-r1:7b".to_string()])
            .await;
        assert_eq!(switched.model(), "deepseek-r1:7b");
        assert_eq!(client.model(), "mock-7b");

        let status = switched.status().await;
        assert!(status.available);
        assert_eq!(status.current_model, "deepseek-r1:7b");
        assert_eq!(status.models.len(), 2);
    }
}
