use serde::Serialize;
use thiserror::Error;

/// 应用程序错误类型
///
/// 流水线对外只暴露这一种错误，具体原因由各子错误描述，
/// 机器可读的分类通过 [`AppError::kind`] 获取。
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求校验错误
    #[error("请求错误: {0}")]
    Request(#[from] RequestError),
    /// 后端（文本生成服务）错误
    #[error("后端错误: {0}")]
    Backend(#[from] BackendError),
    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 机器可读的错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    BackendUnavailable,
    BackendTimeout,
    ParseFailure,
    Config,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::BackendTimeout => "backend_timeout",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求校验错误
#[derive(Debug, Error)]
pub enum RequestError {
    /// 学习材料内容为空
    #[error("学习材料内容不能为空")]
    EmptyContent,
    /// 题目数量非法
    #[error("题目数量必须大于 0 (收到: {count})")]
    InvalidCount { count: usize },
    /// 评分请求缺少题目
    #[error("评分请求的题目不能为空")]
    EmptyQuestion,
}

/// 单次后端调用失败的原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFailure {
    /// 连接被拒绝 / 无法建立连接
    ConnectionRefused,
    /// 单次请求超时
    Timeout,
    /// 后端 5xx
    ServerError,
    /// 请求频率限制
    RateLimited,
    /// 后端不认识该模型
    ModelNotFound,
    /// 请求本身不合法（4xx）
    BadRequest,
    /// 认证失败
    Unauthorized,
    /// 响应无法解码
    InvalidResponse,
    /// 后端返回空内容
    EmptyResponse,
}

impl BackendFailure {
    /// 是否属于可重试的瞬时故障
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            BackendFailure::ConnectionRefused
                | BackendFailure::Timeout
                | BackendFailure::ServerError
                | BackendFailure::RateLimited
                | BackendFailure::EmptyResponse
        )
    }

    /// 根据 HTTP 状态码分类
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => BackendFailure::Unauthorized,
            404 => BackendFailure::ModelNotFound,
            429 => BackendFailure::RateLimited,
            400..=499 if body.to_lowercase().contains("model") && body.contains("not found") => {
                BackendFailure::ModelNotFound
            }
            400..=499 => BackendFailure::BadRequest,
            _ => BackendFailure::ServerError,
        }
    }
}

impl std::fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            BackendFailure::ConnectionRefused => "连接失败",
            BackendFailure::Timeout => "请求超时",
            BackendFailure::ServerError => "服务端错误",
            BackendFailure::RateLimited => "请求频率限制",
            BackendFailure::ModelNotFound => "模型不存在",
            BackendFailure::BadRequest => "请求不合法",
            BackendFailure::Unauthorized => "认证失败",
            BackendFailure::InvalidResponse => "响应无法解析",
            BackendFailure::EmptyResponse => "返回内容为空",
        };
        f.write_str(text)
    }
}

/// 后端调用错误
#[derive(Debug, Error)]
pub enum BackendError {
    /// 单次调用失败
    #[error("{backend} 调用失败 ({failure}): {message}")]
    CallFailed {
        backend: String,
        failure: BackendFailure,
        message: String,
    },
    /// 重试耗尽或遇到不可重试的错误
    #[error("{backend} 不可用 (尝试 {attempts} 次, 最后一次: {last_failure}): {message}")]
    Unavailable {
        backend: String,
        attempts: u32,
        last_failure: BackendFailure,
        message: String,
    },
    /// HTTP 客户端构建失败
    #[error("无法创建 HTTP 客户端: {0}")]
    ClientBuild(String),
}

impl BackendError {
    pub fn call_failed(
        backend: impl Into<String>,
        failure: BackendFailure,
        message: impl Into<String>,
    ) -> Self {
        BackendError::CallFailed {
            backend: backend.into(),
            failure,
            message: message.into(),
        }
    }

    /// 本次失败的分类（客户端构建失败视为不可重试的请求错误）
    pub fn failure(&self) -> BackendFailure {
        match self {
            BackendError::CallFailed { failure, .. } => *failure,
            BackendError::Unavailable { last_failure, .. } => *last_failure,
            BackendError::ClientBuild(_) => BackendFailure::BadRequest,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::CallFailed { failure, .. } => failure.is_transient(),
            _ => false,
        }
    }
}

/// 解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 评分响应中找不到合法分数
    #[error("无法从评分响应中解析分数 (响应: {response})")]
    ScoreNotFound { response: String },
    /// 评分响应为空
    #[error("评分响应为空")]
    EmptyGradingResponse,
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置项取值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },
    /// 未知的后端类型
    #[error("未知的后端类型: {0}")]
    UnknownBackend(String),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 机器可读的错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Request(_) => ErrorKind::InvalidRequest,
            AppError::Backend(e) if e.failure() == BackendFailure::Timeout => {
                ErrorKind::BackendTimeout
            }
            AppError::Backend(_) => ErrorKind::BackendUnavailable,
            AppError::Parse(_) => ErrorKind::ParseFailure,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    /// 创建后端不可用错误
    pub fn backend_unavailable(
        backend: impl Into<String>,
        attempts: u32,
        last_failure: BackendFailure,
        message: impl Into<String>,
    ) -> Self {
        AppError::Backend(BackendError::Unavailable {
            backend: backend.into(),
            attempts,
            last_failure,
            message: message.into(),
        })
    }

    /// 创建分数解析失败错误
    pub fn score_not_found(response: impl Into<String>) -> Self {
        AppError::Parse(ParseError::ScoreNotFound {
            response: response.into(),
        })
    }

    /// 创建配置取值错误
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err: AppError = RequestError::InvalidCount { count: 0 }.into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err: AppError =
            BackendError::call_failed("ollama", BackendFailure::Timeout, "deadline").into();
        assert_eq!(err.kind(), ErrorKind::BackendTimeout);

        let err = AppError::backend_unavailable("ollama", 3, BackendFailure::Timeout, "gave up");
        assert_eq!(err.kind(), ErrorKind::BackendTimeout);

        let err =
            AppError::backend_unavailable("ollama", 3, BackendFailure::ConnectionRefused, "gave up");
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);

        let err = AppError::score_not_found("no digits here");
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
        assert_eq!(err.kind().as_str(), "parse_failure");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(BackendFailure::from_status(503, ""), BackendFailure::ServerError);
        assert_eq!(BackendFailure::from_status(429, ""), BackendFailure::RateLimited);
        assert_eq!(
            BackendFailure::from_status(400, "model 'x' not found, try pulling it first"),
            BackendFailure::ModelNotFound
        );
        assert_eq!(BackendFailure::from_status(400, "bad json"), BackendFailure::BadRequest);
        assert!(BackendFailure::ServerError.is_transient());
        assert!(!BackendFailure::ModelNotFound.is_transient());
        assert!(!BackendFailure::BadRequest.is_transient());
    }
}
