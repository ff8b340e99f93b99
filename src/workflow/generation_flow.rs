//! 题目生成流程 - 流程层
//!
//! 核心职责：定义"一个生成请求"的完整处理流程
//!
//! 流程顺序：
//! 1. 校验请求（非法请求在调用后端之前就失败）
//! 2. 提取概念 → 构建提示词 → 调用后端
//! 3. 解析响应 → 关联概念 → 评分 → 过滤低质量题目 → 裁剪多余题目
//! 4. 模板兜底补足数量（后端失败时全部由模板生成）
//! 5. 汇总元数据

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::clients::ModelClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{
    Concept, GenerationMetadata, GenerationRequest, GenerationResult, Question, QuestionKind,
};
use crate::services::{
    contains_term, ConceptExtractor, FallbackGenerator, ParseOutcome, PromptBuilder,
    QualityScorer, ResponseParser,
};

/// 后端失败、全部由模板生成时记录的模型名称
pub const TEMPLATE_FALLBACK_MODEL: &str = "template-fallback";

/// 题目生成流程
///
/// - 编排完整的生成流程
/// - 决定何时兜底
/// - 除模型客户端外不持有任何资源，可在多个任务间共享
#[derive(Clone)]
pub struct GenerationOrchestrator {
    client: ModelClient,
    extractor: ConceptExtractor,
    builder: PromptBuilder,
    parser: ResponseParser,
    scorer: QualityScorer,
    fallback: FallbackGenerator,
}

impl GenerationOrchestrator {
    /// 创建新的生成流程
    pub fn new(client: ModelClient, config: &Config) -> Self {
        Self {
            client,
            extractor: ConceptExtractor::from_config(config),
            builder: PromptBuilder::from_config(config),
            parser: ResponseParser::new(),
            scorer: QualityScorer::from_config(config),
            fallback: FallbackGenerator::new(),
        }
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    /// 执行一次生成
    ///
    /// 只有请求非法时返回错误；后端失败会退化为模板兜底。
    pub async fn run(&self, request: &GenerationRequest) -> AppResult<GenerationResult> {
        let started = Instant::now();
        request.validate()?;

        let concepts = self.extractor.extract(&request.content);
        info!(
            "🧠 提取到 {} 个概念，开始生成 {} 道{}",
            concepts.len(),
            request.count,
            request.question_type.name_zh()
        );

        let prompt = self.builder.build(request, &concepts);

        let (outcome, model_used, backend_error) = match self.client.generate(&prompt).await {
            Ok(raw) => {
                let outcome =
                    self.parser
                        .parse_detailed(&raw.text, request.question_type, request.count);
                info!(
                    "✓ 解析出 {} 道题，丢弃 {} 个题块",
                    outcome.questions.len(),
                    outcome.dropped.len()
                );
                (outcome, raw.model, None)
            }
            Err(e) => {
                warn!("⚠️ 后端调用失败，全部使用模板兜底: {}", e);
                (
                    ParseOutcome::default(),
                    TEMPLATE_FALLBACK_MODEL.to_string(),
                    Some(e.to_string()),
                )
            }
        };

        let ParseOutcome {
            questions: parsed,
            dropped,
        } = outcome;
        let parsed_count = parsed.len();

        let mut questions: Vec<Question> = parsed
            .into_iter()
            .map(|q| {
                let mut q = link_concept(q, &concepts);
                self.scorer.apply(&mut q);
                q
            })
            .filter(|q| {
                let keep = self.scorer.is_acceptable(q);
                if !keep {
                    debug!("过滤低质量题目 {} (质量分 {:.2})", q.id, q.quality_score);
                }
                keep
            })
            .collect();

        questions = keep_best(questions, request.count);

        let shortfall = request.count - questions.len();
        let mut fallback = self.fallback.generate(&concepts, request, shortfall);
        for q in fallback.iter_mut() {
            self.scorer.apply(q);
        }
        let fallback_count = fallback.len();
        if fallback_count > 0 {
            info!("🧩 模板兜底补充 {} 道题", fallback_count);
        }
        if fallback_count < shortfall {
            warn!(
                "⚠️ 材料中没有可用概念，只能返回 {}/{} 道题",
                questions.len() + fallback_count,
                request.count
            );
        }
        questions.extend(fallback);

        let average_quality = if questions.is_empty() {
            0.0
        } else {
            questions.iter().map(|q| q.quality_score).sum::<f64>() / questions.len() as f64
        };

        let metadata = GenerationMetadata {
            model_used,
            generation_time_ms: started.elapsed().as_millis() as u64,
            average_quality,
            fallback_count,
            requested_count: request.count,
            parsed_count,
            dropped_blocks: dropped,
            backend_error,
        };

        Ok(GenerationResult {
            questions,
            metadata,
        })
    }
}

/// 按排名顺序找到题目提到的第一个概念
fn link_concept(question: Question, concepts: &[Concept]) -> Question {
    if question.source_concept.is_some() {
        return question;
    }
    let text = searchable_text(&question);
    match concepts.iter().find(|c| contains_term(&text, c)) {
        Some(concept) => question.with_source_concept(&concept.term),
        None => question,
    }
}

fn searchable_text(question: &Question) -> String {
    let answer = match &question.kind {
        QuestionKind::MultipleChoice {
            options,
            correct_index,
        } => options.get(*correct_index).cloned().unwrap_or_default(),
        QuestionKind::FillBlank { answer } => answer.clone(),
        QuestionKind::Essay { sample_answer } => sample_answer.clone(),
    };
    format!("{}\n{}", question.prompt, answer)
}

/// 超出数量时保留质量分最高的题目，保持原有顺序
fn keep_best(questions: Vec<Question>, count: usize) -> Vec<Question> {
    if questions.len() <= count {
        return questions;
    }

    let mut ranked: Vec<usize> = (0..questions.len()).collect();
    // sort_by 是稳定排序，同分时靠前的优先
    ranked.sort_by(|&a, &b| {
        questions[b]
            .quality_score
            .partial_cmp(&questions[a].quality_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(count);
    ranked.sort_unstable();

    let mut keep = vec![false; questions.len()];
    for i in ranked {
        keep[i] = true;
    }
    questions
        .into_iter()
        .zip(keep)
        .filter_map(|(q, k)| k.then_some(q))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{BackendRequest, BackendResponse, ClientSettings, GenerateOptions, TextBackend};
    use crate::error::{BackendError, BackendFailure, ErrorKind};
    use crate::models::{Difficulty, QuestionSource, QuestionType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const CONTENT: &str = "Photosynthesis converts light energy into chemical energy. \
        Chlorophyll absorbs light. Chlorophyll is green.";

    /// 固定返回一段文本；`reply` 为 None 时模拟连接失败
    struct CannedBackend {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextBackend for CannedBackend {
        async fn generate(
            &self,
            _request: &BackendRequest,
        ) -> Result<BackendResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(text) => Ok(BackendResponse {
                    text: text.clone(),
                    model: "canned-7b".to_string(),
                }),
                None => Err(BackendError::call_failed(
                    "canned",
                    BackendFailure::ConnectionRefused,
                    "connection refused",
                )),
            }
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["canned-7b".to_string()])
        }

        fn backend_name(&self) -> &str {
            "canned"
        }

        fn model(&self) -> &str {
            "canned-7b"
        }

        fn base_url(&self) -> &str {
            "http://canned"
        }

        fn with_model(&self, _model: &str) -> Box<dyn TextBackend> {
            Box::new(CannedBackend {
                reply: self.reply.clone(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    fn orchestrator(reply: Option<&str>) -> (GenerationOrchestrator, Arc<CannedBackend>) {
        let backend = Arc::new(CannedBackend {
            reply: reply.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let settings = ClientSettings {
            defaults: GenerateOptions {
                timeout_ms: 1_000,
                max_retries: 1,
            },
            retry_backoff_ms: 1,
            retry_backoff_max_ms: 2,
            ..ClientSettings::default()
        };
        let client = ModelClient::new(backend.clone(), settings);
        (
            GenerationOrchestrator::new(client, &Config::default()),
            backend,
        )
    }

    #[tokio::test]
    async fn test_backend_questions_are_linked_and_scored() {
        let (flow, _) = orchestrator(Some("1. ____ absorbs light.\nAnswer: Chlorophyll"));
        let request = GenerationRequest::new(CONTENT, QuestionType::FillBlank, 1, Difficulty::Easy);

        let result = flow.run(&request).await.unwrap();
        assert_eq!(result.questions.len(), 1);
        let q = &result.questions[0];
        assert_eq!(q.source, QuestionSource::Backend);
        assert_eq!(q.source_concept.as_deref(), Some("light"));
        // 题干 > 10 字符 + 答案 + 概念
        assert_eq!(q.quality_score, 0.75);
        assert_eq!(result.metadata.model_used, "canned-7b");
        assert_eq!(result.metadata.fallback_count, 0);
        assert_eq!(result.metadata.average_quality, 0.75);
    }

    #[tokio::test]
    async fn test_shortfall_is_filled_from_templates() {
        let (flow, _) = orchestrator(Some(
            "1. ____ absorbs light.\nAnswer: Chlorophyll\n\n2. ____ is green.\n",
        ));
        let request = GenerationRequest::new(CONTENT, QuestionType::FillBlank, 3, Difficulty::Medium);

        let result = flow.run(&request).await.unwrap();
        assert_eq!(result.questions.len(), 3);
        assert_eq!(result.metadata.fallback_count, 2);
        assert_eq!(result.metadata.parsed_count, 1);
        assert_eq!(result.metadata.dropped_blocks.len(), 1);

        let mut ids: Vec<&str> = result.questions.iter().map(|q| q.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_uses_templates_only() {
        let (flow, backend) = orchestrator(None);
        let request = GenerationRequest::new(CONTENT, QuestionType::Mixed, 4, Difficulty::Hard);

        let result = flow.run(&request).await.unwrap();
        assert_eq!(result.questions.len(), 4);
        assert_eq!(result.metadata.fallback_count, 4);
        assert_eq!(result.metadata.model_used, TEMPLATE_FALLBACK_MODEL);
        assert!(result.metadata.backend_error.is_some());
        assert!(result
            .questions
            .iter()
            .all(|q| q.source == QuestionSource::Fallback));
        // 1 次 + 1 次重试
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_excess_questions_are_trimmed_by_quality() {
        let raw = "1. What?\nAnswer: x\n\n\
                   2. ____ absorbs light in the leaf.\nAnswer: Chlorophyll\n\
                   Explanation: Chlorophyll is the main pigment of photosynthesis.\n\n\
                   3. ____ converts light energy.\nAnswer: Photosynthesis";
        let (flow, _) = orchestrator(Some(raw));
        let request = GenerationRequest::new(CONTENT, QuestionType::FillBlank, 2, Difficulty::Easy);

        let result = flow.run(&request).await.unwrap();
        let ids: Vec<&str> = result.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["ai-2", "ai-3"]);
        assert_eq!(result.metadata.fallback_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_never_calls_backend() {
        let (flow, backend) = orchestrator(Some("1. Q\nAnswer: A"));

        let zero = GenerationRequest::new(CONTENT, QuestionType::Essay, 0, Difficulty::Easy);
        let err = flow.run(&zero).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let empty = GenerationRequest::new("  ", QuestionType::Essay, 2, Difficulty::Easy);
        let err = flow.run(&empty).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_keep_best_preserves_order() {
        let make = |id: &str, score: f64| {
            let mut q = Question::new(
                id,
                "prompt",
                QuestionKind::FillBlank {
                    answer: "a".to_string(),
                },
                QuestionSource::Backend,
            );
            q.quality_score = score;
            q
        };
        let kept = keep_best(
            vec![make("a", 0.5), make("b", 1.0), make("c", 0.5), make("d", 0.75)],
            2,
        );
        let ids: Vec<&str> = kept.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }
}
