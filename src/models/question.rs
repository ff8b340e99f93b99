use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RequestError;

/// 请求的题型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    FillBlank,
    Essay,
    /// 混合题型，由解析器逐块推断
    Mixed,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple-choice",
            QuestionType::FillBlank => "fill-blank",
            QuestionType::Essay => "essay",
            QuestionType::Mixed => "mixed",
        }
    }

    /// 中文名称（用于日志与中文模板）
    pub fn name_zh(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "选择题",
            QuestionType::FillBlank => "填空题",
            QuestionType::Essay => "问答题",
            QuestionType::Mixed => "混合题型",
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "multiple-choice" | "choice" | "mc" => Ok(QuestionType::MultipleChoice),
            "fill-blank" | "fill-in-blank" | "blank" => Ok(QuestionType::FillBlank),
            "essay" | "short-answer" => Ok(QuestionType::Essay),
            "mixed" => Ok(QuestionType::Mixed),
            other => Err(format!("未知题型: {}", other)),
        }
    }
}

/// 难度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// 数字难度等级（1=简单, 2=中等, 3=困难）
    pub fn from_level(level: u64) -> Option<Self> {
        match level {
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "简单" | "1" => Ok(Difficulty::Easy),
            "medium" | "中等" | "2" => Ok(Difficulty::Medium),
            "hard" | "困难" | "3" => Ok(Difficulty::Hard),
            other => Err(format!("未知难度: {}", other)),
        }
    }
}

// 难度既可以是字符串也可以是 1-3 的整数
impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};
        use std::fmt;

        struct DifficultyVisitor;

        impl<'de> Visitor<'de> for DifficultyVisitor {
            type Value = Difficulty;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("easy/medium/hard or a level between 1 and 3")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse().map_err(E::custom)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Difficulty::from_level(value)
                    .ok_or_else(|| E::custom(format!("难度等级超出范围: {}", value)))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("难度等级超出范围: {}", value)));
                }
                self.visit_u64(value as u64)
            }
        }

        deserializer.deserialize_any(DifficultyVisitor)
    }
}

/// 题目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    /// 由后端生成并解析得到
    Backend,
    /// 由模板兜底生成
    Fallback,
}

/// 题型相关字段
///
/// 只有在匹配到具体题型之后才能访问各自的字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuestionKind {
    #[serde(rename_all = "camelCase")]
    MultipleChoice {
        options: Vec<String>,
        correct_index: usize,
    },
    FillBlank { answer: String },
    #[serde(rename_all = "camelCase")]
    Essay { sample_answer: String },
}

/// 选择题最少 / 最多选项数
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;

impl QuestionKind {
    /// 构造选择题，校验选项数量、去重与正确答案下标
    pub fn multiple_choice(options: Vec<String>, correct_index: usize) -> Option<Self> {
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return None;
        }
        if correct_index >= options.len() {
            return None;
        }
        if has_duplicates(&options) {
            return None;
        }
        Some(QuestionKind::MultipleChoice {
            options,
            correct_index,
        })
    }

    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::FillBlank { .. } => QuestionType::FillBlank,
            QuestionKind::Essay { .. } => QuestionType::Essay,
        }
    }
}

fn has_duplicates(options: &[String]) -> bool {
    options.iter().enumerate().any(|(i, a)| {
        options[i + 1..]
            .iter()
            .any(|b| a.trim().eq_ignore_ascii_case(b.trim()))
    })
}

/// 题目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_concept: Option<String>,
    pub quality_score: f64,
    pub source: QuestionSource,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        kind: QuestionKind,
        source: QuestionSource,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            explanation: None,
            source_concept: None,
            quality_score: 0.0,
            source,
            kind,
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        let explanation = explanation.into();
        self.explanation = if explanation.trim().is_empty() {
            None
        } else {
            Some(explanation)
        };
        self
    }

    pub fn with_source_concept(mut self, term: impl Into<String>) -> Self {
        self.source_concept = Some(term.into());
        self
    }

    pub fn question_type(&self) -> QuestionType {
        self.kind.question_type()
    }
}

/// 生成请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub content: String,
    #[serde(alias = "question_type")]
    pub question_type: QuestionType,
    pub count: usize,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl GenerationRequest {
    pub fn new(
        content: impl Into<String>,
        question_type: QuestionType,
        count: usize,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            content: content.into(),
            question_type,
            count,
            difficulty,
        }
    }

    /// 校验请求：内容非空、数量至少为 1
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.content.trim().is_empty() {
            return Err(RequestError::EmptyContent);
        }
        if self.count == 0 {
            return Err(RequestError::InvalidCount { count: self.count });
        }
        Ok(())
    }
}

/// 问答题评分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRequest {
    pub question: String,
    #[serde(alias = "student_answer")]
    pub student_answer: String,
    #[serde(default, alias = "reference_answer")]
    pub reference_answer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_choice_invariants() {
        let opts = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert!(QuestionKind::multiple_choice(opts(&["A", "B"]), 1).is_some());
        assert!(QuestionKind::multiple_choice(opts(&["A", "B"]), 2).is_none());
        assert!(QuestionKind::multiple_choice(opts(&["A"]), 0).is_none());
        assert!(QuestionKind::multiple_choice(opts(&["same", "Same "]), 0).is_none());
        assert!(
            QuestionKind::multiple_choice(opts(&["1", "2", "3", "4", "5", "6", "7"]), 0).is_none()
        );
    }

    #[test]
    fn test_request_validation() {
        let ok = GenerationRequest::new("text", QuestionType::Essay, 1, Difficulty::Easy);
        assert!(ok.validate().is_ok());

        let empty = GenerationRequest::new("   ", QuestionType::Essay, 1, Difficulty::Easy);
        assert!(matches!(empty.validate(), Err(RequestError::EmptyContent)));

        let zero = GenerationRequest::new("text", QuestionType::Essay, 0, Difficulty::Easy);
        assert!(matches!(
            zero.validate(),
            Err(RequestError::InvalidCount { count: 0 })
        ));
    }

    #[test]
    fn test_question_serializes_with_type_tag() {
        let question = Question::new(
            "ai-1",
            "____ absorbs light.",
            QuestionKind::FillBlank {
                answer: "Chlorophyll".to_string(),
            },
            QuestionSource::Backend,
        );
        let json = serde_json::to_value(&question).unwrap();
        assert_eq!(json["type"], "fill-blank");
        assert_eq!(json["answer"], "Chlorophyll");
        assert_eq!(json["source"], "backend");

        let back: Question = serde_json::from_value(json).unwrap();
        assert_eq!(back, question);
    }

    #[test]
    fn test_difficulty_accepts_levels() {
        #[derive(Deserialize)]
        struct Wrapper {
            difficulty: Difficulty,
        }
        let w: Wrapper = serde_json::from_str(r#"{"difficulty": 2}"#).unwrap();
        assert_eq!(w.difficulty, Difficulty::Medium);
        let w: Wrapper = serde_json::from_str(r#"{"difficulty": "hard"}"#).unwrap();
        assert_eq!(w.difficulty, Difficulty::Hard);
        assert!(serde_json::from_str::<Wrapper>(r#"{"difficulty": 7}"#).is_err());
    }
}
