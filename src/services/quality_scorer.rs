//! 质量评分服务 - 业务能力层
//!
//! 四个等权指标，得分 = 满足的指标数 / 4：
//! - 题干长度超过 10 个字符
//! - 解析至少 20 个字符
//! - 答案格式正确
//! - 关联了来源概念

use crate::config::Config;
use crate::models::{Question, QuestionKind};

const MIN_PROMPT_CHARS: usize = 10;
const MIN_EXPLANATION_CHARS: usize = 20;
const INDICATOR_COUNT: f64 = 4.0;

/// 质量评分器
#[derive(Debug, Clone, Copy)]
pub struct QualityScorer {
    min_quality: f64,
}

impl QualityScorer {
    pub fn new(min_quality: f64) -> Self {
        Self { min_quality }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_quality)
    }

    pub fn min_quality(&self) -> f64 {
        self.min_quality
    }

    /// 计算质量分（0.0 ~ 1.0）
    pub fn score(&self, question: &Question) -> f64 {
        let indicators = [
            question.prompt.trim().chars().count() > MIN_PROMPT_CHARS,
            question
                .explanation
                .as_deref()
                .is_some_and(|e| e.trim().chars().count() >= MIN_EXPLANATION_CHARS),
            has_well_formed_answer(&question.kind),
            question
                .source_concept
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty()),
        ];
        let satisfied = indicators.iter().filter(|ok| **ok).count();
        satisfied as f64 / INDICATOR_COUNT
    }

    /// 计算并写入 `quality_score`
    pub fn apply(&self, question: &mut Question) -> f64 {
        let score = self.score(question);
        question.quality_score = score;
        score
    }

    /// 是否达到最低质量要求
    pub fn is_acceptable(&self, question: &Question) -> bool {
        question.quality_score >= self.min_quality
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

fn has_well_formed_answer(kind: &QuestionKind) -> bool {
    match kind {
        QuestionKind::MultipleChoice {
            options,
            correct_index,
        } => options.len() >= 2 && *correct_index < options.len(),
        QuestionKind::FillBlank { answer } => !answer.trim().is_empty(),
        QuestionKind::Essay { sample_answer } => !sample_answer.trim().is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuestionSource;

    fn bare(prompt: &str, kind: QuestionKind) -> Question {
        Question::new("ai-1", prompt, kind, QuestionSource::Backend)
    }

    #[test]
    fn test_each_indicator_adds_a_quarter() {
        let scorer = QualityScorer::default();
        let empty_essay = QuestionKind::Essay {
            sample_answer: String::new(),
        };

        let q = bare("short", empty_essay.clone());
        assert_eq!(scorer.score(&q), 0.0);

        let q = bare("a prompt longer than ten chars", empty_essay);
        assert_eq!(scorer.score(&q), 0.25);

        let q = q.with_explanation("an explanation of at least twenty chars");
        assert_eq!(scorer.score(&q), 0.5);

        let q = Question {
            kind: QuestionKind::Essay {
                sample_answer: "reference".to_string(),
            },
            ..q
        };
        assert_eq!(scorer.score(&q), 0.75);

        let q = q.with_source_concept("photosynthesis");
        assert_eq!(scorer.score(&q), 1.0);
    }

    #[test]
    fn test_score_is_monotonic() {
        let scorer = QualityScorer::default();
        let base = bare(
            "____ absorbs light energy.",
            QuestionKind::FillBlank {
                answer: "Chlorophyll".to_string(),
            },
        );
        let richer = base
            .clone()
            .with_explanation("Chlorophyll is the green pigment in chloroplasts.");
        let richest = richer.clone().with_source_concept("chlorophyll");

        assert!(scorer.score(&base) <= scorer.score(&richer));
        assert!(scorer.score(&richer) <= scorer.score(&richest));
    }

    #[test]
    fn test_apply_and_threshold() {
        let scorer = QualityScorer::new(0.5);
        let mut q = bare(
            "Which pigment absorbs light?",
            QuestionKind::MultipleChoice {
                options: vec!["Chlorophyll".to_string(), "Keratin".to_string()],
                correct_index: 0,
            },
        );
        assert_eq!(scorer.apply(&mut q), 0.5);
        assert_eq!(q.quality_score, 0.5);
        assert!(scorer.is_acceptable(&q));

        let mut weak = bare(
            "tiny",
            QuestionKind::FillBlank {
                answer: String::new(),
            },
        );
        scorer.apply(&mut weak);
        assert!(!scorer.is_acceptable(&weak));
    }
}
