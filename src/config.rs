use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ConfigError};

/// 文本生成后端类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 本地 Ollama 服务（/api/generate）
    Ollama,
    /// 兼容 OpenAI Chat Completions 的服务
    OpenAi,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::OpenAi => "openai",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "openai" | "open-ai" | "openai-compatible" => Ok(BackendKind::OpenAi),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// 程序配置
///
/// 只在启动时（或显式重新配置时）构造，请求处理期间只读。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 后端配置 ---
    pub backend: BackendKind,
    pub base_url: String,
    pub model_name: String,
    /// OpenAI 兼容服务的密钥，Ollama 不需要
    pub api_key: Option<String>,
    /// 优先选用的模型（按顺序），启动时若已安装则切换
    pub preferred_models: Vec<String>,

    // --- 超时与重试 ---
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,

    // --- 采样参数 ---
    pub temperature: f32,
    pub max_tokens: u32,

    // --- 流水线参数 ---
    /// 概念提取保留的关键词数量（K）
    pub max_concepts: usize,
    /// 嵌入提示词的概念数量（N）
    pub prompt_concepts: usize,
    /// 嵌入提示词的材料最大字符数
    pub max_content_chars: usize,
    /// 低于该质量分的题目会被过滤
    pub min_quality: f64,

    // --- 批处理 ---
    /// 同时处理的请求数量
    pub max_concurrent_requests: usize,
    /// 请求 TOML 文件目录
    pub request_folder: String,
    /// 结果 JSON 输出目录
    pub output_folder: String,
    /// 丢弃题块 / 评分失败的记录文件
    pub warn_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Ollama,
            base_url: "http://127.0.0.1:11434".to_string(),
            model_name: "qwen2.5:7b".to_string(),
            api_key: None,
            preferred_models: vec!["deepseek-r1:7b".to_string()],
            timeout_ms: 90_000,
            max_retries: 2,
            retry_backoff_ms: 1_000,
            retry_backoff_max_ms: 8_000,
            temperature: 0.7,
            max_tokens: 2048,
            max_concepts: 10,
            prompt_concepts: 5,
            max_content_chars: 3000,
            min_quality: 0.25,
            max_concurrent_requests: 4,
            request_folder: "requests".to_string(),
            output_folder: "output".to_string(),
            warn_file: "warn.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量加载（未设置的项使用默认值）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件加载，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 分层加载：配置文件（可选）→ 环境变量覆盖 → 校验
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(mut self) -> AppResult<Self> {
        if let Some(value) = env_var("QUIZ_BACKEND") {
            self.backend = value.parse().map_err(AppError::Config)?;
        }
        if let Some(value) = env_var("QUIZ_BASE_URL") {
            self.base_url = value;
        }
        if let Some(value) = env_var("QUIZ_MODEL") {
            self.model_name = value;
        }
        if let Some(value) = env_var("QUIZ_API_KEY") {
            self.api_key = Some(value);
        }
        if let Some(value) = env_var("QUIZ_PREFERRED_MODELS") {
            self.preferred_models = value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        parse_env("QUIZ_TIMEOUT_MS", &mut self.timeout_ms)?;
        parse_env("QUIZ_MAX_RETRIES", &mut self.max_retries)?;
        parse_env("QUIZ_RETRY_BACKOFF_MS", &mut self.retry_backoff_ms)?;
        parse_env("QUIZ_RETRY_BACKOFF_MAX_MS", &mut self.retry_backoff_max_ms)?;
        parse_env("QUIZ_TEMPERATURE", &mut self.temperature)?;
        parse_env("QUIZ_MAX_TOKENS", &mut self.max_tokens)?;
        parse_env("QUIZ_MAX_CONCEPTS", &mut self.max_concepts)?;
        parse_env("QUIZ_PROMPT_CONCEPTS", &mut self.prompt_concepts)?;
        parse_env("QUIZ_MAX_CONTENT_CHARS", &mut self.max_content_chars)?;
        parse_env("QUIZ_MIN_QUALITY", &mut self.min_quality)?;
        parse_env("QUIZ_MAX_CONCURRENT", &mut self.max_concurrent_requests)?;
        if let Some(value) = env_var("QUIZ_REQUEST_FOLDER") {
            self.request_folder = value;
        }
        if let Some(value) = env_var("QUIZ_OUTPUT_FOLDER") {
            self.output_folder = value;
        }
        if let Some(value) = env_var("QUIZ_WARN_FILE") {
            self.warn_file = value;
        }
        parse_env("VERBOSE_LOGGING", &mut self.verbose_logging)?;
        Ok(self)
    }

    /// 校验配置取值
    pub fn validate(&self) -> AppResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::invalid_config("base_url", "不能为空"));
        }
        if self.model_name.trim().is_empty() {
            return Err(AppError::invalid_config("model_name", "不能为空"));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::invalid_config("timeout_ms", "必须大于 0"));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_ms {
            return Err(AppError::invalid_config(
                "retry_backoff_max_ms",
                "不能小于 retry_backoff_ms",
            ));
        }
        if self.max_content_chars == 0 {
            return Err(AppError::invalid_config("max_content_chars", "必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.min_quality) {
            return Err(AppError::invalid_config("min_quality", "必须在 [0, 1] 之间"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(AppError::invalid_config(
                "max_concurrent_requests",
                "必须大于 0",
            ));
        }
        if self.backend == BackendKind::OpenAi && self.api_key.is_none() {
            return Err(AppError::invalid_config(
                "api_key",
                "OpenAI 兼容后端需要 API 密钥",
            ));
        }
        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(name: &str, target: &mut T) -> AppResult<()> {
    if let Some(value) = env_var(name) {
        *target = value.trim().parse().map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: name.to_string(),
                value: value.clone(),
                expected_type: std::any::type_name::<T>().to_string(),
            })
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!("openai".parse::<BackendKind>().unwrap(), BackendKind::OpenAi);
        assert!("gpt".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_from_toml_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
model_name = "deepseek-r1:7b"
timeout_ms = 30000
max_retries = 1
"#
        )
        .unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.model_name, "deepseek-r1:7b");
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.max_concepts, 10);
        assert_eq!(config.backend, BackendKind::Ollama);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Config {
            timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            min_quality: 1.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            backend: BackendKind::OpenAi,
            api_key: None,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
