//! 概念提取服务 - 业务能力层
//!
//! 只负责"从一段材料中找出高频关键词"能力：
//! 1. 非字母数字 / 非 CJK / 非空白字符替换为空格
//! 2. 按空白切分，丢弃长度不超过 1 的词
//! 3. 统一小写后计数
//! 4. 按词频降序排列（同频按首次出现顺序），取前 K 个
//!
//! 纯函数，不做任何 I/O。

use std::collections::HashMap;

use tracing::debug;

use crate::config::Config;
use crate::models::Concept;
use crate::utils::text::{contains_ignore_case, is_cjk};

/// 概念提取器
#[derive(Debug, Clone, Copy)]
pub struct ConceptExtractor {
    max_concepts: usize,
}

impl ConceptExtractor {
    pub fn new(max_concepts: usize) -> Self {
        Self { max_concepts }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_concepts)
    }

    pub fn max_concepts(&self) -> usize {
        self.max_concepts
    }

    /// 提取概念
    ///
    /// 空文本或只有空白 / 标点时返回空列表。
    pub fn extract(&self, text: &str) -> Vec<Concept> {
        let cleaned: String = text
            .chars()
            .map(|c| if is_kept(c) { c } else { ' ' })
            .collect();

        // term -> (频次, 首次出现位置)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, word) in cleaned
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .enumerate()
        {
            let entry = counts.entry(word.to_lowercase()).or_insert((0, position));
            entry.0 += 1;
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(term, (frequency, first))| (term, frequency, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(self.max_concepts);

        let max_frequency = ranked.first().map(|r| r.1).unwrap_or(1) as f64;
        let concepts: Vec<Concept> = ranked
            .into_iter()
            .map(|(term, frequency, _)| Concept {
                weight: frequency as f64 / max_frequency,
                term,
                frequency,
            })
            .collect();

        debug!("提取到 {} 个概念", concepts.len());
        concepts
    }
}

impl Default for ConceptExtractor {
    fn default() -> Self {
        Self::new(Config::default().max_concepts)
    }
}

fn is_kept(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_cjk(c) || c.is_whitespace()
}

/// 文本中是否提到了该概念（大小写不敏感）
pub fn contains_term(text: &str, concept: &Concept) -> bool {
    contains_ignore_case(text, &concept.term)
}
