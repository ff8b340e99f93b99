//! 批量请求处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量请求文件的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：初始化警告文件、创建模型客户端、检查后端状态、选择优先模型
//! 2. **批量加载**：扫描并加载所有待处理的请求文件（`Vec<RequestFile>`）
//! 3. **并发控制**：使用 Semaphore 限制同时处理的文件数量
//! 4. **全局统计**：汇总所有文件的处理结果
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个请求的细节
//! - **资源所有者**：唯一持有模型客户端的模块
//! - **向下委托**：委托 file_processor 处理单个文件

use crate::clients::ModelClient;
use crate::config::Config;
use crate::models::RequestFile;
use crate::orchestrator::file_processor::{self, FileStats};
use crate::services::WarnWriter;
use crate::utils::logging;
use crate::workflow::{EssayGrader, GenerationOrchestrator};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    generator: GenerationOrchestrator,
    grader: EssayGrader,
    warn_writer: Arc<WarnWriter>,
}

/// 批处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub files: usize,
    pub success: usize,
    pub failed: usize,
    pub fallback_questions: usize,
}

impl BatchStats {
    fn add(&mut self, file: &FileStats) {
        self.success += file.success;
        self.failed += file.failed;
        self.fallback_questions += file.fallback_questions;
    }

    pub fn total(&self) -> usize {
        self.success + self.failed
    }
}

impl App {
    /// 初始化应用
    ///
    /// 后端不可用时不会失败：生成请求会退化为模板兜底。
    pub async fn initialize(config: Config) -> Result<Self> {
        let client = ModelClient::from_config(&config)?;

        let status = client.status().await;
        let client = if status.available {
            info!(
                "✓ 后端 {} 可用 ({}), 已安装 {} 个模型",
                status.backend,
                status.base_url,
                status.models.len()
            );
            client.select_preferred(&config.preferred_models).await
        } else {
            warn!(
                "⚠️ 后端 {} 不可用 ({}): {}",
                status.backend,
                status.base_url,
                status.error.as_deref().unwrap_or("未知错误")
            );
            warn!("⚠️ 生成请求将使用模板兜底，评分请求会失败");
            client
        };

        Self::with_client(config, client)
    }

    /// 使用指定的模型客户端创建应用
    pub fn with_client(config: Config, client: ModelClient) -> Result<Self> {
        // 初始化警告文件
        logging::init_log_file(&config.warn_file)?;
        logging::log_startup(
            client.backend_name(),
            client.model(),
            config.max_concurrent_requests,
        );

        Ok(Self {
            generator: GenerationOrchestrator::new(client.clone(), &config),
            grader: EssayGrader::new(client),
            warn_writer: Arc::new(WarnWriter::with_path(config.warn_file.clone())),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generator(&self) -> &GenerationOrchestrator {
        &self.generator
    }

    pub fn grader(&self) -> &EssayGrader {
        &self.grader
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<BatchStats> {
        // 加载所有待处理的请求文件
        let files = self.load_files().await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(BatchStats::default());
        }

        let total_requests: usize = files.iter().map(RequestFile::total_requests).sum();
        logging::log_files_loaded(files.len(), total_requests);

        let stats = self.process_all_files(files).await?;

        logging::print_final_stats(
            stats.success,
            stats.failed,
            stats.fallback_questions,
            stats.total(),
            &self.config.output_folder,
        );

        Ok(stats)
    }

    /// 加载请求文件
    async fn load_files(&self) -> Result<Vec<RequestFile>> {
        info!("\n📁 正在扫描待处理的请求文件...");
        crate::models::load_all_request_files(&self.config.request_folder).await
    }

    /// 并发处理所有文件
    async fn process_all_files(&self, files: Vec<RequestFile>) -> Result<BatchStats> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_requests));
        let mut stats = BatchStats {
            files: files.len(),
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(files.len());
        for (idx, file) in files.into_iter().enumerate() {
            let file_index = idx + 1;
            let semaphore = semaphore.clone();
            let generator = self.generator.clone();
            let grader = self.grader.clone();
            let warn_writer = self.warn_writer.clone();
            let output_folder = self.config.output_folder.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                file_processor::process_file(
                    &generator,
                    &grader,
                    &warn_writer,
                    file,
                    file_index,
                    &output_folder,
                )
                .await
            }));
        }

        // 等待所有任务完成
        for (idx, joined) in futures::future::join_all(handles).await.into_iter().enumerate() {
            let file_index = idx + 1;
            match joined {
                Ok(Ok((file_stats, _))) => stats.add(&file_stats),
                Ok(Err(e)) => {
                    error!("[文件 {}] ❌ 处理过程中发生错误: {:#}", file_index, e);
                }
                Err(e) => {
                    error!("[文件 {}] 任务执行失败: {}", file_index, e);
                }
            }
        }

        Ok(stats)
    }
}
