//! # Quiz Forge
//!
//! 把学习材料转换为测验题目的 Rust 流水线：
//! 驱动文本生成后端出题，把自由文本解析为结构化题目，评估质量，
//! 不足时用模板补题，并对问答题作答进行评分。
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 持有后端连接，只暴露"输入提示词、输出文本"能力
//! - `TextBackend` - Ollama / OpenAI 兼容后端
//! - `ModelClient` - 超时、重试、状态查询、模型切换
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务都是纯函数式的单一能力
//! - `ConceptExtractor` - 概念提取
//! - `PromptBuilder` - 提示词构建
//! - `ResponseParser` - 响应解析
//! - `QualityScorer` - 质量评分
//! - `FallbackGenerator` - 模板兜底
//! - `WarnWriter` - 写 warn.txt 能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个请求"的完整处理流程
//! - `GenerationOrchestrator` - 生成流程（概念 → 提示词 → 后端 → 解析 → 评分 → 兜底）
//! - `EssayGrader` - 问答题评分流程
//! - `RequestCtx` - 上下文封装（文件 + 请求序号）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理资源和并发
//! - `orchestrator/file_processor` - 单个请求文件处理器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{BackendStatus, ModelClient, TextBackend};
pub use config::{BackendKind, Config};
pub use error::{AppError, AppResult, ErrorKind};
pub use models::{
    Concept, Difficulty, EssayScore, GenerationRequest, GenerationResult, Question, QuestionKind,
    QuestionType,
};
pub use orchestrator::App;
pub use workflow::{EssayGrader, GenerationOrchestrator};
