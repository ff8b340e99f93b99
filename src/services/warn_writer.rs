//! 警告写入服务 - 业务能力层
//!
//! 只负责"写 warn.txt"能力，不关心流程

use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use tracing::debug;

use crate::models::DroppedBlock;

/// 警告写入服务
///
/// 职责：
/// - 记录被解析器丢弃的题块
/// - 记录评分失败的作答
/// - 记录整体退化为模板兜底的请求
pub struct WarnWriter {
    warn_file_path: String,
}

impl WarnWriter {
    /// 创建新的警告写入服务
    pub fn new() -> Self {
        Self {
            warn_file_path: "warn.txt".to_string(),
        }
    }

    /// 使用自定义文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            warn_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.warn_file_path
    }

    /// 写入被丢弃的题块
    pub async fn write_dropped(&self, request_label: &str, dropped: &[DroppedBlock]) -> Result<()> {
        if dropped.is_empty() {
            return Ok(());
        }
        debug!("写入警告: {} | 丢弃题块 {} 个", request_label, dropped.len());

        let lines: String = dropped
            .iter()
            .map(|d| {
                format!(
                    "{} | 题块 {} | 原因: {} | 内容: {}\n",
                    request_label, d.index, d.reason, d.preview
                )
            })
            .collect();
        self.append(&lines)
    }

    /// 写入后端失败、已用模板兜底的请求
    pub async fn write_backend_fallback(&self, request_label: &str, error: &str) -> Result<()> {
        debug!("写入警告: {} | 后端失败", request_label);
        self.append(&format!(
            "{} | 后端不可用，已使用模板兜底 | 错误: {}\n",
            request_label, error
        ))
    }

    /// 写入评分失败的作答
    pub async fn write_grading_failure(
        &self,
        request_label: &str,
        question: &str,
        error: &str,
    ) -> Result<()> {
        debug!("写入警告: {} | 评分失败", request_label);
        self.append(&format!(
            "{} | 评分失败 | 题目: {} | 错误: {}\n",
            request_label, question, error
        ))
    }

    fn append(&self, text: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.warn_file_path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl Default for WarnWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DropReason;

    #[tokio::test]
    async fn test_appends_one_line_per_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warn.txt");
        let writer = WarnWriter::with_path(path.to_string_lossy().to_string());

        let dropped = vec![
            DroppedBlock {
                index: 2,
                reason: DropReason::MissingAnswer,
                preview: "____ absorbs light.".to_string(),
            },
            DroppedBlock {
                index: 4,
                reason: DropReason::TooFewOptions,
                preview: "Which one?".to_string(),
            },
        ];
        writer.write_dropped("bio#1", &dropped).await.unwrap();
        writer.write_dropped("bio#2", &[]).await.unwrap();
        writer
            .write_grading_failure("bio#3", "Explain ATP.", "解析错误")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("题块 2") && lines[0].contains("缺少答案"));
        assert!(lines[2].starts_with("bio#3 | 评分失败"));
    }
}
