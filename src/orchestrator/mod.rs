//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量请求处理器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载请求文件（Vec<RequestFile>）
//! - 控制并发数量（Semaphore）
//! - 持有模型客户端
//! - 输出全局统计信息
//!
//! ### `file_processor` - 单个请求文件处理器
//! - 遍历单个文件的生成 / 评分请求
//! - 委托 GenerationOrchestrator / EssayGrader
//! - 写出 JSON 结果与 warn.txt
//! - 输出单个文件的统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<RequestFile>)
//!     ↓
//! file_processor (处理一个文件里的请求)
//!     ↓
//! workflow::GenerationOrchestrator / EssayGrader (处理单个请求)
//!     ↓
//! services (能力层：概念 / 提示词 / 解析 / 评分 / 兜底 / warn)
//!     ↓
//! clients (基础设施：ModelClient → TextBackend)
//! ```

pub mod batch_processor;
pub mod file_processor;

// 重新导出主要类型
pub use batch_processor::{App, BatchStats};
pub use file_processor::{process_file, FileReport, FileStats};
