use serde::{Deserialize, Serialize};

use super::question::Question;

/// 从材料中提取出的概念（按词频排序的关键词）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub term: String,
    pub frequency: usize,
    /// 相对权重：词频 / 本次提取的最高词频
    pub weight: f64,
}

/// 被解析器丢弃的题块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedBlock {
    /// 题块在响应中的序号（从 1 开始）
    pub index: usize,
    pub reason: DropReason,
    /// 题块开头的预览文本
    pub preview: String,
}

/// 题块被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 题干为空
    EmptyStem,
    /// 选择题选项少于 2 个
    TooFewOptions,
    /// 选项重复（文本或字母标号）
    DuplicateOptions,
    /// 缺少答案
    MissingAnswer,
    /// 答案无法对应到任何选项
    UnresolvedAnswer,
    /// 题块与请求题型不符
    TypeMismatch,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DropReason::EmptyStem => "题干为空",
            DropReason::TooFewOptions => "选项少于 2 个",
            DropReason::DuplicateOptions => "选项重复",
            DropReason::MissingAnswer => "缺少答案",
            DropReason::UnresolvedAnswer => "答案无法对应到选项",
            DropReason::TypeMismatch => "题型不符",
        };
        f.write_str(text)
    }
}

/// 生成结果的元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub model_used: String,
    pub generation_time_ms: u64,
    pub average_quality: f64,
    pub fallback_count: usize,
    pub requested_count: usize,
    /// 后端响应中成功解析出的题目数（过滤与裁剪之前）
    pub parsed_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_blocks: Vec<DroppedBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_error: Option<String>,
}

/// 生成结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub questions: Vec<Question>,
    pub metadata: GenerationMetadata,
}

/// 问答题评分结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EssayScore {
    /// 0-100
    pub score: u8,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
}
