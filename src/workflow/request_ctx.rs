//! 请求处理上下文
//!
//! 封装"我正在处理哪个文件的第几个请求"这一信息

use std::fmt::Display;

/// 请求种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Generate,
    Grade,
}

impl RequestKind {
    pub fn name_zh(self) -> &'static str {
        match self {
            RequestKind::Generate => "生成",
            RequestKind::Grade => "评分",
        }
    }
}

/// 请求处理上下文
#[derive(Debug, Clone)]
pub struct RequestCtx {
    /// 请求文件名称
    pub file_name: String,

    /// 文件索引（仅用于日志显示）
    pub file_index: usize,

    /// 请求在文件中的索引（从1开始）
    pub request_index: usize,

    pub kind: RequestKind,
}

impl RequestCtx {
    /// 创建新的请求上下文
    pub fn new(
        file_name: impl Into<String>,
        file_index: usize,
        request_index: usize,
        kind: RequestKind,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            file_index,
            request_index,
            kind,
        }
    }

    /// 写入 warn.txt 时使用的标签
    pub fn label(&self) -> String {
        format!(
            "{} | {}#{}",
            self.file_name,
            self.kind.name_zh(),
            self.request_index
        )
    }
}

impl Display for RequestCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[文件 {} {}#{}]",
            self.file_index,
            self.kind.name_zh(),
            self.request_index
        )
    }
}
