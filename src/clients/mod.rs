pub mod backend;
pub mod model_client;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

pub use backend::{BackendRequest, BackendResponse, TextBackend};
pub use model_client::{BackendStatus, ClientSettings, GenerateOptions, ModelClient, RawResponse};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::{BackendKind, Config};
use crate::error::{AppError, AppResult};

/// 根据配置创建文本生成后端
pub fn build_backend(config: &Config) -> AppResult<Arc<dyn TextBackend>> {
    let backend: Arc<dyn TextBackend> = match config.backend {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(&config.base_url, &config.model_name)?),
        BackendKind::OpenAi => {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| AppError::invalid_config("api_key", "OpenAI 兼容后端需要 API 密钥"))?;
            Arc::new(OpenAiBackend::new(api_key, &config.base_url, &config.model_name)?)
        }
    };
    Ok(backend)
}

impl ModelClient {
    /// 根据配置创建模型客户端
    pub fn from_config(config: &Config) -> AppResult<Self> {
        Ok(Self::new(build_backend(config)?, ClientSettings::from_config(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backend_follows_config() {
        let client = ModelClient::from_config(&Config::default()).unwrap();
        assert_eq!(client.backend_name(), "ollama");
        assert_eq!(client.model(), "qwen2.5:7b");

        let config = Config {
            backend: BackendKind::OpenAi,
            base_url: "https://api.example.com/v1".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Config::default()
        };
        assert_eq!(build_backend(&config).unwrap().backend_name(), "openai");

        let missing_key = Config {
            backend: BackendKind::OpenAi,
            ..Config::default()
        };
        assert!(build_backend(&missing_key).is_err());
    }
}
