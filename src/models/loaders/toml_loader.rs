use crate::models::question::{GenerationRequest, GradingRequest};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一个请求文件：若干生成请求与评分请求
///
/// ```toml
/// name = "photosynthesis"
///
/// [[generate]]
/// content = "Photosynthesis converts light energy into chemical energy."
/// question_type = "fill-blank"
/// count = 3
/// difficulty = 2
///
/// [[grade]]
/// question = "Explain photosynthesis."
/// student_answer = "Plants turn light into sugar."
/// reference_answer = "Light energy is converted into chemical energy..."
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub generate: Vec<GenerationRequest>,
    #[serde(default)]
    pub grade: Vec<GradingRequest>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl RequestFile {
    pub fn total_requests(&self) -> usize {
        self.generate.len() + self.grade.len()
    }

    /// 输出文件名（无名称时使用源文件名）
    pub fn output_stem(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.trim().to_string();
        }
        self.file_path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "result".to_string())
    }
}

/// 从 TOML 文件加载请求
pub async fn load_request_file(toml_file_path: &Path) -> Result<RequestFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut file: RequestFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    file.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(file)
}

/// 从文件夹中加载所有 TOML 请求文件（按文件名排序）
pub async fn load_all_request_files(folder_path: &str) -> Result<Vec<RequestFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_request_file(&path).await {
            Ok(file) => {
                tracing::info!(
                    "成功加载 {} 个生成请求, {} 个评分请求",
                    file.generate.len(),
                    file.grade.len()
                );
                files.push(file);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(files)
}
