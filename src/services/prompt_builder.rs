//! 提示词构建服务 - 业务能力层
//!
//! 只负责"把材料 + 概念拼成发给后端的提示词"能力。
//! 输出中附带期望的返回格式，解析器按同样的格式读取。

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::models::{Concept, Difficulty, GenerationRequest, QuestionType};
use crate::utils::text::truncate_chars;

const SYSTEM_PROMPT: &str = "You are an experienced teacher who writes clear, accurate assessment \
questions from learning material. Follow the requested output format exactly and do not add \
commentary before or after the questions.";

/// 构建好的提示词
#[derive(Debug, Clone, Serialize)]
pub struct PromptSpec {
    pub text: String,
    pub system: Option<String>,
    /// 期望的返回格式（也嵌入在 `text` 中）
    pub expected_format_hint: String,
    pub question_type: QuestionType,
    pub count: usize,
}

/// 提示词构建器
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    prompt_concepts: usize,
    max_content_chars: usize,
}

impl PromptBuilder {
    pub fn new(prompt_concepts: usize, max_content_chars: usize) -> Self {
        Self {
            prompt_concepts,
            max_content_chars,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.prompt_concepts, config.max_content_chars)
    }

    /// 构建生成题目的提示词
    ///
    /// 只截断材料内容，概念列表不截断（数量由 `prompt_concepts` 控制）。
    pub fn build(&self, request: &GenerationRequest, concepts: &[Concept]) -> PromptSpec {
        let (content, truncated) = truncate_chars(request.content.trim(), self.max_content_chars);
        if truncated {
            debug!(
                "材料超过 {} 字符，已截断后放入提示词",
                self.max_content_chars
            );
        }

        let terms: Vec<&str> = concepts
            .iter()
            .take(self.prompt_concepts)
            .map(|c| c.term.as_str())
            .collect();
        let concept_line = if terms.is_empty() {
            "(none identified)".to_string()
        } else {
            terms.join(", ")
        };

        let format_hint = format_hint(request.question_type);
        let text = format!(
            "Write exactly {count} {kind} based on the learning material below.\n\
             Difficulty: {difficulty} - {difficulty_note}\n\
             Key concepts to cover: {concepts}\n\
             {type_note}\n\
             Write the questions in the same language as the material.\n\n\
             Material:\n\"\"\"\n{content}\n\"\"\"\n\n\
             Number every question (1., 2., ...) and use exactly this format:\n\n\
             {format_hint}",
            count = request.count,
            kind = kind_phrase(request.question_type, request.count),
            difficulty = request.difficulty.as_str(),
            difficulty_note = difficulty_note(request.difficulty),
            concepts = concept_line,
            type_note = type_note(request.question_type),
            content = content,
            format_hint = format_hint,
        );

        PromptSpec {
            text,
            system: Some(SYSTEM_PROMPT.to_string()),
            expected_format_hint: format_hint.to_string(),
            question_type: request.question_type,
            count: request.count,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn kind_phrase(question_type: QuestionType, count: usize) -> &'static str {
    let plural = count != 1;
    match (question_type, plural) {
        (QuestionType::MultipleChoice, false) => "multiple-choice question",
        (QuestionType::MultipleChoice, true) => "multiple-choice questions",
        (QuestionType::FillBlank, false) => "fill-in-the-blank question",
        (QuestionType::FillBlank, true) => "fill-in-the-blank questions",
        (QuestionType::Essay, false) => "short essay question",
        (QuestionType::Essay, true) => "short essay questions",
        (QuestionType::Mixed, false) => "question",
        (QuestionType::Mixed, true) => "questions of mixed types",
    }
}

fn difficulty_note(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "test recall of facts stated directly in the material.",
        Difficulty::Medium => "test understanding of how the concepts relate to each other.",
        Difficulty::Hard => "test application and analysis beyond the literal wording.",
    }
}

fn type_note(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => {
            "Give 4 options labelled A-D with exactly one correct option and no duplicate options."
        }
        QuestionType::FillBlank => "Mark the blank with ____ and give the missing word or phrase as the answer.",
        QuestionType::Essay => "Each question must be answerable in a short paragraph.",
        QuestionType::Mixed => {
            "Mix multiple-choice, fill-in-the-blank and short essay questions, using the matching format for each."
        }
    }
}

/// 各题型期望的返回格式
pub fn format_hint(question_type: QuestionType) -> &'static str {
    match question_type {
        QuestionType::MultipleChoice => MULTIPLE_CHOICE_FORMAT,
        QuestionType::FillBlank => FILL_BLANK_FORMAT,
        QuestionType::Essay => ESSAY_FORMAT,
        QuestionType::Mixed => MIXED_FORMAT,
    }
}

const MULTIPLE_CHOICE_FORMAT: &str = "1. <question text>
A. <option>
B. <option>
C. <option>
D. <option>
Answer: <letter>
Explanation: <why the answer is correct>";

const FILL_BLANK_FORMAT: &str = "1. <sentence with ____ in place of the missing term>
Answer: <missing term>
Explanation: <short explanation>";

const ESSAY_FORMAT: &str = "1. <open question>
Reference answer: <model answer in a few sentences>";

const MIXED_FORMAT: &str = "1. <multiple-choice question>
A. <option>
B. <option>
C. <option>
D. <option>
Answer: <letter>
Explanation: <short explanation>

2. <sentence with ____ in place of the missing term>
Answer: <missing term>
Explanation: <short explanation>

3. <open question>
Reference answer: <model answer>";

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(term: &str) -> Concept {
        Concept {
            term: term.to_string(),
            frequency: 1,
            weight: 1.0,
        }
    }

    #[test]
    fn test_build_embeds_request_and_concepts() {
        let request = GenerationRequest::new(
            "Chlorophyll absorbs light.",
            QuestionType::FillBlank,
            3,
            Difficulty::Easy,
        );
        let spec = PromptBuilder::new(2, 3000).build(
            &request,
            &[concept("chlorophyll"), concept("light"), concept("absorbs")],
        );

        assert!(spec.text.contains("exactly 3 fill-in-the-blank questions"));
        assert!(spec.text.contains("Key concepts to cover: chlorophyll, light\n"));
        assert!(!spec.text.contains("absorbs,"));
        assert!(spec.text.contains("Chlorophyll absorbs light."));
        assert!(spec.text.contains(FILL_BLANK_FORMAT));
        assert_eq!(spec.expected_format_hint, FILL_BLANK_FORMAT);
        assert_eq!(spec.count, 3);
        assert!(spec.system.is_some());
    }

    #[test]
    fn test_content_is_truncated_not_concepts() {
        let long = "光".repeat(50);
        let request = GenerationRequest::new(long, QuestionType::Essay, 1, Difficulty::Hard);
        let spec = PromptBuilder::new(5, 10).build(&request, &[concept("光合作用")]);

        assert!(spec.text.contains(&format!("\"\"\"\n{}\n\"\"\"", "光".repeat(10))));
        assert!(!spec.text.contains(&"光".repeat(11)));
        assert!(spec.text.contains("光合作用"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let request =
            GenerationRequest::new("text body", QuestionType::Mixed, 4, Difficulty::Medium);
        let builder = PromptBuilder::default();
        let a = builder.build(&request, &[concept("text")]);
        let b = builder.build(&request, &[concept("text")]);
        assert_eq!(a.text, b.text);
    }
}
