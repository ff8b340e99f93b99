//! 模板兜底服务 - 业务能力层
//!
//! 后端不可用或合格题目不足时，用提取出的概念按模板补题。
//! 不调用后端，不会失败；没有概念时返回空列表。

use regex::{NoExpand, RegexBuilder};
use tracing::debug;

use crate::models::{
    Concept, GenerationRequest, Question, QuestionKind, QuestionSource, QuestionType,
};
use crate::utils::text::contains_cjk;

const BLANK: &str = "____";
const MAX_DISTRACTORS: usize = 3;

/// 模板兜底生成器
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

/// 概念在材料中的出处
struct SourceSentence {
    sentence: String,
    /// 挖空后的句子
    blanked: String,
    /// 句子中实际出现的写法（保留原大小写）
    matched: String,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// 生成 `shortfall` 道模板题，概念不够时循环使用
    pub fn generate(
        &self,
        concepts: &[Concept],
        request: &GenerationRequest,
        shortfall: usize,
    ) -> Vec<Question> {
        if concepts.is_empty() || shortfall == 0 {
            return Vec::new();
        }

        let sentences = split_sentences(&request.content);
        let questions: Vec<Question> = (0..shortfall)
            .map(|i| {
                let concept = &concepts[i % concepts.len()];
                let source = find_source(&sentences, &concept.term);
                let question_type = template_type(request.question_type, i, concepts.len());
                let id = format!("fallback-{}", i + 1);

                let question = match question_type {
                    QuestionType::MultipleChoice => {
                        multiple_choice(id, concept, concepts, source.as_ref(), i)
                    }
                    QuestionType::Essay => essay(id, concept, source.as_ref()),
                    QuestionType::FillBlank | QuestionType::Mixed => {
                        fill_blank(id, concept, source.as_ref())
                    }
                };

                match source {
                    Some(source) => question.with_explanation(source_note(&concept.term, &source.sentence)),
                    None => question,
                }
            })
            .collect();

        debug!("模板兜底生成 {} 道题", questions.len());
        questions
    }
}

/// 第 `ordinal` 道模板题使用的题型
///
/// 混合题型按 选择 → 填空 → 问答 轮换；概念少于 2 个时选择题退化为填空题。
fn template_type(requested: QuestionType, ordinal: usize, concept_count: usize) -> QuestionType {
    let wanted = match requested {
        QuestionType::Mixed => match ordinal % 3 {
            0 => QuestionType::MultipleChoice,
            1 => QuestionType::FillBlank,
            _ => QuestionType::Essay,
        },
        other => other,
    };
    if wanted == QuestionType::MultipleChoice && concept_count < 2 {
        QuestionType::FillBlank
    } else {
        wanted
    }
}

fn fill_blank(id: String, concept: &Concept, source: Option<&SourceSentence>) -> Question {
    let (prompt, answer) = match source {
        Some(source) => (source.blanked.clone(), source.matched.clone()),
        None => (generic_blank_prompt(&concept.term), concept.term.clone()),
    };
    Question::new(id, prompt, QuestionKind::FillBlank { answer }, QuestionSource::Fallback)
        .with_source_concept(&concept.term)
}

fn multiple_choice(
    id: String,
    concept: &Concept,
    concepts: &[Concept],
    source: Option<&SourceSentence>,
    ordinal: usize,
) -> Question {
    let correct = source
        .map(|s| s.matched.clone())
        .unwrap_or_else(|| concept.term.clone());

    let mut options: Vec<String> = concepts
        .iter()
        .filter(|c| !c.term.eq_ignore_ascii_case(&concept.term))
        .map(|c| c.term.clone())
        .take(MAX_DISTRACTORS)
        .collect();
    let correct_index = ordinal % (options.len() + 1);
    options.insert(correct_index, correct);

    let prompt = match source {
        Some(source) => source.blanked.clone(),
        None => generic_choice_prompt(&concept.term),
    };

    match QuestionKind::multiple_choice(options, correct_index) {
        Some(kind) => Question::new(id, prompt, kind, QuestionSource::Fallback)
            .with_source_concept(&concept.term),
        None => fill_blank(id, concept, source),
    }
}

fn essay(id: String, concept: &Concept, source: Option<&SourceSentence>) -> Question {
    let sample_answer = source
        .map(|s| s.sentence.clone())
        .unwrap_or_else(|| generic_essay_answer(&concept.term));
    Question::new(
        id,
        essay_prompt(&concept.term),
        QuestionKind::Essay { sample_answer },
        QuestionSource::Fallback,
    )
    .with_source_concept(&concept.term)
}

// ========== 模板文本 ==========

fn generic_blank_prompt(term: &str) -> String {
    if contains_cjk(term) {
        format!("{} 是本材料中的一个重要概念。", BLANK)
    } else {
        format!("{} is a key concept in this material.", BLANK)
    }
}

fn generic_choice_prompt(term: &str) -> String {
    if contains_cjk(term) {
        "下列哪一项是本材料重点讨论的概念？".to_string()
    } else {
        "Which of the following is a concept discussed in this material?".to_string()
    }
}

fn essay_prompt(term: &str) -> String {
    if contains_cjk(term) {
        format!("请解释“{}”这一概念，并说明它在材料中的作用。", term)
    } else {
        format!(
            "Explain the concept \"{}\" and describe its role in this material.",
            term
        )
    }
}

fn generic_essay_answer(term: &str) -> String {
    if contains_cjk(term) {
        format!("“{}”是材料中的一个重要概念。", term)
    } else {
        format!("\"{}\" is one of the key concepts of this material.", term)
    }
}

fn source_note(term: &str, sentence: &str) -> String {
    if contains_cjk(term) {
        format!("出自材料原文：{}", sentence)
    } else {
        format!("From the material: {}", sentence)
    }
}

// ========== 出处查找 ==========

fn split_sentences(content: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in content.chars() {
        if c == '\n' || c == '\r' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '。' | '！' | '？' | ';' | '；') {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);
    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.trim();
    if !sentence.is_empty() {
        sentences.push(sentence.to_string());
    }
    current.clear();
}

/// 找到第一个提到该概念的句子，并把概念挖空
fn find_source(sentences: &[String], term: &str) -> Option<SourceSentence> {
    // 英文概念按整词匹配，避免 "is" 命中 "photosynthesis"
    let escaped = regex::escape(term);
    let pattern = if contains_cjk(term) {
        escaped
    } else {
        format!(r"\b{}\b", escaped)
    };
    let pattern = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;

    sentences.iter().find_map(|sentence| {
        let matched = pattern.find(sentence)?.as_str().to_string();
        let blanked = pattern.replace_all(sentence, NoExpand(BLANK)).into_owned();
        Some(SourceSentence {
            sentence: sentence.clone(),
            blanked,
            matched,
        })
    })
}
