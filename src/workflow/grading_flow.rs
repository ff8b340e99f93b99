//! 问答题评分流程 - 流程层
//!
//! 流程顺序：
//! 1. 校验（题目为空直接失败；学生未作答直接 0 分，不调用后端）
//! 2. 构建评分提示词 → 调用后端（失败直接返回错误，不兜底）
//! 3. 从响应中读取分数、评语、建议

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::clients::ModelClient;
use crate::error::{AppError, AppResult, ParseError, RequestError};
use crate::models::{EssayScore, QuestionType};
use crate::services::PromptSpec;
use crate::utils::text::{contains_cjk, strip_reasoning};
use crate::utils::truncate_text;

const GRADING_SYSTEM_PROMPT: &str = "You are a fair and careful teacher grading a student's short \
essay answer. Grade against the reference answer when one is given. Reply only in the requested format.";

const GRADING_FORMAT: &str = "Score: <integer from 0 to 100>
Feedback: <one or two sentences on what the answer did well and what it missed>
Suggestions: <optional concrete advice for improvement>";

/// 分数：标记词之后的第一个整数（允许 "85/100" 与 "Score (out of 100): 85"）
static SCORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:score|得分|分数|评分)(?:\s*[(（][^)）\n]{0,20}[)）])?[^\d\n(（]{0,20}?(\d{1,3})(?:\s*/\s*100)?(?:\D|$)",
    )
    .expect("valid score regex")
});

static SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:[-*]\s+)?(?:\*\*)?\s*(score|得分|分数|评分|feedback|反馈|评语|suggestions?|改进建议|建议)(?:\s*[(（][^)）\n]{0,20}[)）])?\s*(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(.*)$",
    )
    .expect("valid section regex")
});

/// 分数行开头的分数本身，之后的文字归入评语
static SCORE_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\*\*)?\s*\d{1,3}(?:\s*/\s*100)?(?:\*\*)?[\s\-:：,，;；.。]*")
        .expect("valid score lead regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GradingSection {
    Other,
    Score,
    Feedback,
    Suggestions,
}

fn section_of(label: &str) -> GradingSection {
    match label.to_lowercase().as_str() {
        "score" | "得分" | "分数" | "评分" => GradingSection::Score,
        "feedback" | "反馈" | "评语" => GradingSection::Feedback,
        _ => GradingSection::Suggestions,
    }
}

/// 问答题评分器
#[derive(Clone)]
pub struct EssayGrader {
    client: ModelClient,
}

impl EssayGrader {
    pub fn new(client: ModelClient) -> Self {
        Self { client }
    }

    /// 给学生的作答评分
    pub async fn grade(
        &self,
        question: &str,
        student_answer: &str,
        reference_answer: &str,
    ) -> AppResult<EssayScore> {
        if question.trim().is_empty() {
            return Err(RequestError::EmptyQuestion.into());
        }

        if student_answer.trim().is_empty() {
            info!("学生未作答，直接记 0 分");
            let feedback = if contains_cjk(question) {
                "未作答。"
            } else {
                "No answer was provided."
            };
            return Ok(EssayScore {
                score: 0,
                feedback: feedback.to_string(),
                suggestions: None,
            });
        }

        let prompt = build_grading_prompt(question, student_answer, reference_answer);
        let raw = self.client.generate(&prompt).await?;
        let score = parse_grading(&raw.text)?;

        info!("✓ 评分完成: {} 分 (模型: {})", score.score, raw.model);
        Ok(score)
    }
}

fn build_grading_prompt(question: &str, student_answer: &str, reference_answer: &str) -> PromptSpec {
    let reference = if reference_answer.trim().is_empty() {
        "(none provided - judge against the question itself)"
    } else {
        reference_answer.trim()
    };

    let text = format!(
        "Grade the student's answer to the question below on a scale of 0 to 100.\n\
         Write the feedback in the same language as the question.\n\n\
         Question:\n{}\n\n\
         Reference answer:\n{}\n\n\
         Student answer:\n{}\n\n\
         Reply in exactly this format:\n{}",
        question.trim(),
        reference,
        student_answer.trim(),
        GRADING_FORMAT
    );

    PromptSpec {
        text,
        system: Some(GRADING_SYSTEM_PROMPT.to_string()),
        expected_format_hint: GRADING_FORMAT.to_string(),
        question_type: QuestionType::Essay,
        count: 1,
    }
}

/// 解析评分响应
pub fn parse_grading(raw: &str) -> AppResult<EssayScore> {
    let text = strip_reasoning(raw);
    if text.is_empty() {
        return Err(ParseError::EmptyGradingResponse.into());
    }

    let score = SCORE
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
        .find(|score| *score <= 100)
        .ok_or_else(|| AppError::score_not_found(truncate_text(&text, 200)))?;

    let mut section = GradingSection::Other;
    let mut other: Vec<String> = Vec::new();
    let mut feedback = Vec::new();
    let mut suggestions = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(caps) = SECTION.captures(trimmed) {
            section = section_of(caps.get(1).map_or("", |m| m.as_str()));
            let value = caps.get(2).map_or("", |m| m.as_str()).trim();
            match section {
                GradingSection::Feedback if !value.is_empty() => feedback.push(value),
                GradingSection::Suggestions if !value.is_empty() => suggestions.push(value),
                GradingSection::Score => {
                    let tail = SCORE_LEAD.replace(value, "");
                    if !tail.trim().is_empty() {
                        other.push(tail.trim().to_string());
                    }
                }
                _ => {}
            }
            continue;
        }
        match section {
            GradingSection::Feedback => feedback.push(trimmed),
            GradingSection::Suggestions => suggestions.push(trimmed),
            // 分数行之后、下一个标记之前的内容当作评语的一部分
            GradingSection::Other | GradingSection::Score => other.push(trimmed.to_string()),
        }
    }

    let feedback = if feedback.is_empty() {
        debug!("评分响应没有明确的评语段落，使用剩余文本");
        other.join("\n")
    } else {
        feedback.join("\n")
    };
    let suggestions = Some(suggestions.join("\n")).filter(|s| !s.is_empty());

    Ok(EssayScore {
        score,
        feedback,
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{BackendRequest, BackendResponse, ClientSettings, TextBackend};
    use crate::error::{BackendError, BackendFailure, ErrorKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct GradingBackend {
        reply: Result<String, BackendFailure>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextBackend for GradingBackend {
        async fn generate(
            &self,
            request: &BackendRequest,
        ) -> Result<BackendResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(request.prompt.contains("Student answer:"));
            match &self.reply {
                Ok(text) => Ok(BackendResponse {
                    text: text.clone(),
                    model: "grader".to_string(),
                }),
                Err(failure) => Err(BackendError::call_failed("grader", *failure, "scripted")),
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        fn backend_name(&self) -> &str {
            "grader"
        }

        fn model(&self) -> &str {
            "grader"
        }

        fn base_url(&self) -> &str {
            "http://grader"
        }

        fn with_model(&self, _model: &str) -> Box<dyn TextBackend> {
            Box::new(GradingBackend {
                reply: self.reply.clone(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn grader(reply: Result<&str, BackendFailure>) -> (EssayGrader, Arc<GradingBackend>) {
        let backend = Arc::new(GradingBackend {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let mut settings = ClientSettings::default();
        settings.defaults.max_retries = 0;
        (
            EssayGrader::new(ModelClient::new(backend.clone(), settings)),
            backend,
        )
    }

    #[tokio::test]
    async fn test_grade_reads_score_and_feedback() {
        let (grader, _) = grader(Ok("Score: 85\nFeedback: Clear explanation but missing examples."));
        let score = grader
            .grade("Explain photosynthesis.", "Plants make sugar from light.", "")
            .await
            .unwrap();
        assert_eq!(score.score, 85);
        assert_eq!(score.feedback, "Clear explanation but missing examples.");
        assert_eq!(score.suggestions, None);
    }

    #[tokio::test]
    async fn test_unparsable_score_is_parse_failure() {
        let (grader, _) = grader(Ok("Great effort overall, keep going!"));
        let err = grader
            .grade("Explain photosynthesis.", "Plants make sugar.", "ref")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces() {
        let (grader, _) = grader(Err(BackendFailure::ModelNotFound));
        let err = grader
            .grade("Explain photosynthesis.", "Plants make sugar.", "ref")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_blank_answer_scores_zero_without_backend() {
        let (grader, backend) = grader(Ok("Score: 100"));
        let score = tokio_test::block_on(grader.grade("解释光合作用。", "   ", "")).unwrap();
        assert_eq!(score.score, 0);
        assert_eq!(score.feedback, "未作答。");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);

        let err = tokio_test::block_on(grader.grade(" ", "answer", "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_parse_grading_variants() {
        let parsed = parse_grading(
            "<think>grading...</think>\n**得分**：78/100\n评语：回答基本正确。\n建议：补充光反应的细节。",
        )
        .unwrap();
        assert_eq!(parsed.score, 78);
        assert_eq!(parsed.feedback, "回答基本正确。");
        assert_eq!(parsed.suggestions.as_deref(), Some("补充光反应的细节。"));

        let parsed = parse_grading("Score: 250\nScore: 64\nNice work.").unwrap();
        assert_eq!(parsed.score, 64);
        assert_eq!(parsed.feedback, "Nice work.");

        let parsed = parse_grading("Score (out of 100): 85\nFeedback: ok").unwrap();
        assert_eq!(parsed.score, 85);
        assert_eq!(parsed.feedback, "ok");

        let parsed = parse_grading("Score: 85/100\nFeedback: ok").unwrap();
        assert_eq!(parsed.score, 85);

        let err = parse_grading("Score: 1000\nFeedback: ok").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);

        let parsed = parse_grading("Score: 85 - clear but thin").unwrap();
        assert_eq!(parsed.score, 85);
        assert_eq!(parsed.feedback, "clear but thin");

        assert!(parse_grading("   ").is_err());
    }
}
