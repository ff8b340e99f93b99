//! 文本处理辅助函数
//!
//! 解析器与评分器共用：去除推理片段、CJK 判断、按字符截断等。

use once_cell::sync::Lazy;
use regex::Regex;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid think-block regex"));
static THINK_UNCLOSED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*\z").expect("valid think-open regex"));

/// CJK 统一表意文字（与概念提取保留的范围一致）
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// 去除推理模型输出的 `<think>...</think>` 片段
///
/// 未闭合的 `<think>` 视为整段都是推理过程，只保留之前的内容；
/// 只有 `</think>` 没有开头标签时（部分服务会吃掉开头），只保留其后的内容。
pub fn strip_reasoning(raw: &str) -> String {
    let closed = THINK_BLOCK.replace_all(raw, "");
    let closed = match closed.rfind("</think>") {
        Some(pos) => &closed[pos + "</think>".len()..],
        None => &closed[..],
    };
    THINK_UNCLOSED.replace(closed, "").trim().to_string()
}

/// 按字符数截断（不追加省略号），返回是否发生截断
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// 大小写不敏感的包含判断
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning() {
        let raw = "<think>\nlet me plan the questions\n</think>\n1. What is ATP?";
        assert_eq!(strip_reasoning(raw), "1. What is ATP?");

        let unterminated = "1. Q?\nAnswer: x\n<think>half a thought";
        assert_eq!(strip_reasoning(unterminated), "1. Q?\nAnswer: x");

        assert_eq!(strip_reasoning("  plain  "), "plain");

        let headless = "planning...\n</think>\n\n1. Q?";
        assert_eq!(strip_reasoning(headless), "1. Q?");
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        let (head, cut) = truncate_chars("光合作用很重要", 4);
        assert_eq!(head, "光合作用");
        assert!(cut);

        let (head, cut) = truncate_chars("abc", 10);
        assert_eq!(head, "abc");
        assert!(!cut);
    }

    #[test]
    fn test_cjk_detection() {
        assert!(contains_cjk("叶绿素 chlorophyll"));
        assert!(!contains_cjk("chlorophyll"));
    }
}
