//! 单个请求文件处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理单个请求文件中的所有请求，是文件级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **遍历请求**：依次处理 `[[generate]]` 与 `[[grade]]`
//! 2. **流程调度**：委托 `GenerationOrchestrator` / `EssayGrader`
//! 3. **警告记录**：丢弃的题块、模板兜底、评分失败写入 warn.txt
//! 4. **结果输出**：每个文件写出一个 JSON 结果文件
//! 5. **统计输出**：记录成功/失败/兜底数量

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::{AppError, ErrorKind};
use crate::models::{EssayScore, GenerationRequest, GenerationResult, RequestFile};
use crate::services::WarnWriter;
use crate::utils::logging;
use crate::workflow::{EssayGrader, GenerationOrchestrator, RequestCtx, RequestKind};

/// 请求处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub success: usize,
    pub failed: usize,
    /// 模板兜底生成的题目数
    pub fallback_questions: usize,
}

impl FileStats {
    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

/// 错误信息（写入结果文件）
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&AppError> for ErrorReport {
    fn from(error: &AppError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationEntry {
    pub index: usize,
    pub request: GenerationRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradingEntry {
    pub index: usize,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<EssayScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// 一个请求文件的处理结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub processed_at: String,
    pub generations: Vec<GenerationEntry>,
    pub gradings: Vec<GradingEntry>,
}

/// 处理单个请求文件并写出结果
///
/// # 参数
/// - `generator`: 生成流程
/// - `grader`: 评分流程
/// - `warn_writer`: 警告写入
/// - `file`: 请求文件
/// - `file_index`: 文件索引（用于日志）
/// - `output_folder`: 结果输出目录
///
/// # 返回
/// 返回本文件的统计信息与结果文件路径
pub async fn process_file(
    generator: &GenerationOrchestrator,
    grader: &EssayGrader,
    warn_writer: &WarnWriter,
    file: RequestFile,
    file_index: usize,
    output_folder: &str,
) -> Result<(FileStats, PathBuf)> {
    let name = file.output_stem();
    log_file_start(file_index, &name, file.generate.len(), file.grade.len());

    let mut stats = FileStats::default();
    let mut report = FileReport {
        name: name.clone(),
        source_file: file.file_path.clone(),
        processed_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        generations: Vec::with_capacity(file.generate.len()),
        gradings: Vec::with_capacity(file.grade.len()),
    };

    // ========== 生成请求 ==========
    for (index, request) in file.generate.into_iter().enumerate() {
        let ctx = RequestCtx::new(&name, file_index, index + 1, RequestKind::Generate);
        info!("{} 📝 生成 {} 道{}", ctx, request.count, request.question_type.name_zh());

        let entry = match generator.run(&request).await {
            Ok(result) => {
                stats.success += 1;
                stats.fallback_questions += result.metadata.fallback_count;
                record_generation_warnings(warn_writer, &ctx, &result).await;
                info!(
                    "{} ✓ 完成: {} 道题 (兜底 {}), 平均质量 {:.2}, 耗时 {} ms",
                    ctx,
                    result.questions.len(),
                    result.metadata.fallback_count,
                    result.metadata.average_quality,
                    result.metadata.generation_time_ms
                );
                GenerationEntry {
                    index: index + 1,
                    request,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                stats.failed += 1;
                error!("{} ❌ 生成失败: {}", ctx, e);
                GenerationEntry {
                    index: index + 1,
                    request,
                    result: None,
                    error: Some(ErrorReport::from(&e)),
                }
            }
        };
        report.generations.push(entry);
    }

    // ========== 评分请求 ==========
    for (index, request) in file.grade.into_iter().enumerate() {
        let ctx = RequestCtx::new(&name, file_index, index + 1, RequestKind::Grade);
        info!("{} 🖊️ 评分: {}", ctx, logging::truncate_text(&request.question, 40));

        let entry = match grader
            .grade(
                &request.question,
                &request.student_answer,
                &request.reference_answer,
            )
            .await
        {
            Ok(score) => {
                stats.success += 1;
                GradingEntry {
                    index: index + 1,
                    question: request.question,
                    score: Some(score),
                    error: None,
                }
            }
            Err(e) => {
                stats.failed += 1;
                error!("{} ❌ 评分失败: {}", ctx, e);
                if let Err(write_err) = warn_writer
                    .write_grading_failure(&ctx.label(), &request.question, &e.to_string())
                    .await
                {
                    warn!("{} ⚠️ 写入 warn.txt 失败: {}", ctx, write_err);
                }
                GradingEntry {
                    index: index + 1,
                    question: request.question,
                    score: None,
                    error: Some(ErrorReport::from(&e)),
                }
            }
        };
        report.gradings.push(entry);
    }

    let output_path = write_report(&report, output_folder).await?;
    logging::log_file_complete(&name, stats.success, stats.total());

    Ok((stats, output_path))
}

/// 记录丢弃的题块与后端失败
async fn record_generation_warnings(
    warn_writer: &WarnWriter,
    ctx: &RequestCtx,
    result: &GenerationResult,
) {
    let label = ctx.label();
    if let Err(e) = warn_writer
        .write_dropped(&label, &result.metadata.dropped_blocks)
        .await
    {
        warn!("{} ⚠️ 写入 warn.txt 失败: {}", ctx, e);
    }
    if let Some(backend_error) = &result.metadata.backend_error {
        if let Err(e) = warn_writer.write_backend_fallback(&label, backend_error).await {
            warn!("{} ⚠️ 写入 warn.txt 失败: {}", ctx, e);
        }
    }
}

/// 写出 JSON 结果文件
async fn write_report(report: &FileReport, output_folder: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_folder)
        .await
        .with_context(|| format!("无法创建输出目录: {}", output_folder))?;

    let path = Path::new(output_folder).join(format!("{}.json", report.name));
    let json = serde_json::to_string_pretty(report).context("无法序列化结果")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("无法写入结果文件: {}", path.display()))?;

    info!("💾 结果已写入: {}", path.display());
    Ok(path)
}

// ========== 日志辅助函数 ==========

fn log_file_start(file_index: usize, name: &str, generate: usize, grade: usize) {
    info!("[文件 {}] 开始处理", file_index);
    info!("[文件 {}] 名称: {}", file_index, name);
    info!(
        "[文件 {}] 生成请求 {} 个, 评分请求 {} 个",
        file_index, generate, grade
    );
}
