//! 响应解析服务 - 业务能力层
//!
//! 把后端返回的自由文本切成题块，再把每个题块读成结构化题目。
//! 单个题块格式有问题时丢弃该块并继续，整个解析过程不会失败。
//!
//! 题块以编号行开头（`1.` `2)` `3、` `第4题` `**5.**` `### 6.`），
//! 第一个编号行之前的内容视为前言并忽略；没有编号行时整段文本作为一个题块。
//! 答案 / 解析段落里的编号列表属于当前题块，不会被当成新题。

use once_cell::sync::Lazy;
use phf::phf_map;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{
    DropReason, DroppedBlock, Question, QuestionKind, QuestionSource, QuestionType,
};
use crate::utils::text::strip_reasoning;
use crate::utils::truncate_text;

/// 题块内的段落
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Stem,
    Options,
    Answer,
    Explanation,
    Reference,
}

/// 标记词（小写）到段落的映射
static MARKER_LABELS: phf::Map<&'static str, Section> = phf_map! {
    "answer" => Section::Answer,
    "correct answer" => Section::Answer,
    "答案" => Section::Answer,
    "正确答案" => Section::Answer,
    "explanation" => Section::Explanation,
    "analysis" => Section::Explanation,
    "解析" => Section::Explanation,
    "解释" => Section::Explanation,
    "reference answer" => Section::Reference,
    "sample answer" => Section::Reference,
    "model answer" => Section::Reference,
    "参考答案" => Section::Reference,
    "question" => Section::Stem,
    "题目" => Section::Stem,
};

// 交替顺序决定匹配优先级：长标记在前
const LABEL_PATTERN: &str = "reference answer|sample answer|model answer|correct answer|answer|\
参考答案|正确答案|答案|explanation|analysis|解析|解释|question|题目";

static HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:#{1,6}\s*)?(?:\*\*)?\s*(?:第\s*\d{1,3}\s*题\s*[.:：、]?|(?i:question|q)\s*\d{1,3}\s*[.:：)]|\d{1,3}\s*[.)、．])\s*(?:\*\*)?\s*(.*)$",
    )
    .expect("valid header regex")
});

static OPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[-*]\s+)?(?:\*\*)?(?:[(（]([A-Fa-f])[)）]|([A-F])\s*[.)、．:：])(?:\*\*)?\s*(\S.*)$",
    )
    .expect("valid option regex")
});

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:[-*]\s+)?(?:\*\*)?\s*(?:[【\[]\s*({labels})\s*[】\]]\s*[:：]?|({labels})\s*(?:\*\*)?\s*[:：])\s*(?:\*\*)?\s*(.*)$",
        labels = LABEL_PATTERN
    ))
    .expect("valid marker regex")
});

static ANSWER_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s(（\[【]*([A-Fa-f])(?:[\s.)）\]】、．:：,，]|$)").expect("valid letter regex")
});

static BLANK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_{2,}|（\s*）|\(\s*\)").expect("valid blank regex"));

/// 解析结果：成功的题目 + 被丢弃的题块
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseOutcome {
    pub questions: Vec<Question>,
    pub dropped: Vec<DroppedBlock>,
}

/// 响应解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析后端响应，返回所有合法题目（可能多于或少于 `expected_count`）
    pub fn parse(&self, raw: &str, expected_type: QuestionType, expected_count: usize) -> Vec<Question> {
        self.parse_detailed(raw, expected_type, expected_count).questions
    }

    /// 解析后端响应，同时返回被丢弃题块的原因
    pub fn parse_detailed(
        &self,
        raw: &str,
        expected_type: QuestionType,
        expected_count: usize,
    ) -> ParseOutcome {
        let text = strip_reasoning(raw);
        let blocks = split_blocks(&text);
        debug!("响应切分为 {} 个题块", blocks.len());

        let mut outcome = ParseOutcome::default();
        for (i, lines) in blocks.into_iter().enumerate() {
            let index = i + 1;
            let block = read_block(&lines);
            match build_question(&block, expected_type) {
                Ok((stem, kind, explanation)) => {
                    let id = format!("ai-{}", outcome.questions.len() + 1);
                    let mut question = Question::new(id, stem, kind, QuestionSource::Backend);
                    if let Some(explanation) = explanation {
                        question = question.with_explanation(explanation);
                    }
                    outcome.questions.push(question);
                }
                Err(reason) => {
                    let preview = truncate_text(&block.stem_text(), 40);
                    warn!("⚠️ 题块 {} 被丢弃: {} ({})", index, reason, preview);
                    outcome.dropped.push(DroppedBlock {
                        index,
                        reason,
                        preview,
                    });
                }
            }
        }

        if outcome.questions.len() != expected_count {
            debug!(
                "解析出 {} 道{}，期望 {} 道",
                outcome.questions.len(),
                expected_type.name_zh(),
                expected_count
            );
        }
        outcome
    }
}

/// 编号行的序号与题干部分；不是编号行时返回 None
fn header_rest(line: &str) -> Option<(u32, &str)> {
    let caps = HEADER.captures(line)?;
    let rest = caps.get(1).map_or("", |m| m.as_str());
    // "3.5 g of ..." 这类小数不是编号
    if rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let prefix = &line[..caps.get(1).map_or(line.len(), |m| m.start())];
    let number = prefix
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .ok()?;
    Some((number, rest))
}

/// 切分时正在读取的题块
struct OpenBlock<'a> {
    lines: Vec<&'a str>,
    number: u32,
    /// 已进入答案 / 解析 / 参考答案段落
    in_answer: bool,
    /// 答案段落内编号列表的最后一个序号
    list_last: Option<u32>,
}

impl<'a> OpenBlock<'a> {
    fn new(number: u32, rest: &'a str) -> Self {
        Self {
            lines: vec![rest],
            number,
            in_answer: false,
            list_last: None,
        }
    }

    /// 答案段落内的编号行是否开始下一道题
    ///
    /// 只有序号正好是上一题 +1 才算新题；
    /// 紧接着答案内编号列表（没有空行隔开）时仍算列表的下一项。
    fn starts_next(&self, number: u32, after_blank: bool) -> bool {
        if !self.in_answer {
            return true;
        }
        if number != self.number + 1 {
            return false;
        }
        !(self.list_last == Some(number - 1) && !after_blank)
    }
}

fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<OpenBlock> = None;
    let mut after_blank = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            after_blank = true;
            if let Some(block) = current.as_mut() {
                block.lines.push(line);
            }
            continue;
        }

        if let Some((number, rest)) = header_rest(line) {
            match current.as_mut() {
                Some(block) if !block.starts_next(number, after_blank) => {
                    block.list_last = Some(number);
                    block.lines.push(line);
                }
                _ => {
                    if let Some(block) = current.take() {
                        blocks.push(block.lines);
                    }
                    current = Some(OpenBlock::new(number, rest));
                }
            }
        } else if let Some(block) = current.as_mut() {
            if let Some((section, _)) = match_marker(trimmed) {
                block.in_answer = section != Section::Stem;
                block.list_last = None;
            }
            block.lines.push(line);
        }
        after_blank = false;
    }
    if let Some(block) = current {
        blocks.push(block.lines);
    }

    if blocks.is_empty() && !text.trim().is_empty() {
        blocks.push(text.lines().collect());
    }
    blocks
}

/// 读取后的题块
#[derive(Debug, Default)]
struct RawBlock {
    stem: Vec<String>,
    options: Vec<(char, String)>,
    answer: Vec<String>,
    explanation: Vec<String>,
    reference: Vec<String>,
    duplicate_label: bool,
}

impl RawBlock {
    fn push(&mut self, section: Section, text: &str) {
        let text = text.trim().to_string();
        match section {
            Section::Stem => self.stem.push(text),
            Section::Answer => self.answer.push(text),
            Section::Explanation => self.explanation.push(text),
            Section::Reference => self.reference.push(text),
            Section::Options => match self.options.last_mut() {
                Some((_, last)) => {
                    last.push(' ');
                    last.push_str(&text);
                }
                None => self.stem.push(text),
            },
        }
    }

    fn stem_text(&self) -> String {
        let stem = self.stem.join("\n");
        stem.trim().trim_end_matches("**").trim().to_string()
    }

    fn answer_text(&self) -> Option<String> {
        non_empty(self.answer.join(" "))
    }

    fn explanation_text(&self) -> Option<String> {
        non_empty(self.explanation.join(" "))
    }

    fn reference_text(&self) -> Option<String> {
        non_empty(self.reference.join("\n"))
    }
}

fn non_empty(text: String) -> Option<String> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn match_marker(line: &str) -> Option<(Section, &str)> {
    let caps = MARKER.captures(line)?;
    let label = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let key = label.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let section = *MARKER_LABELS.get(key.as_str())?;
    let value = caps.get(3).map_or("", |m| m.as_str());
    Some((section, value))
}

fn match_option(line: &str) -> Option<(char, &str)> {
    let caps = OPTION.captures(line)?;
    let label = caps
        .get(1)
        .or_else(|| caps.get(2))?
        .as_str()
        .chars()
        .next()?
        .to_ascii_uppercase();
    let text = caps.get(3)?.as_str().trim().trim_end_matches("**").trim();
    Some((label, text))
}

/// 逐行读取题块：题干 → 选项 → 标记段落
fn read_block(lines: &[&str]) -> RawBlock {
    let mut block = RawBlock::default();
    let mut section = Section::Stem;

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some((marked, value)) = match_marker(trimmed) {
            section = marked;
            if !value.trim().is_empty() {
                block.push(section, value);
            }
            continue;
        }

        // 进入答案 / 解析段落后不再识别选项
        if matches!(section, Section::Stem | Section::Options) {
            if let Some((label, text)) = match_option(trimmed) {
                if block.options.iter().any(|(l, _)| *l == label) {
                    block.duplicate_label = true;
                }
                block.options.push((label, text.to_string()));
                section = Section::Options;
                continue;
            }
        }

        block.push(section, trimmed);
    }

    block
}

type Built = (String, QuestionKind, Option<String>);

fn build_question(block: &RawBlock, expected: QuestionType) -> Result<Built, DropReason> {
    let stem = block.stem_text();
    if stem.is_empty() {
        return Err(DropReason::EmptyStem);
    }

    let question_type = match expected {
        QuestionType::Mixed => infer_type(block, &stem)?,
        other => other,
    };

    let kind = match question_type {
        QuestionType::MultipleChoice => build_multiple_choice(block)?,
        QuestionType::FillBlank => {
            if block.options.len() >= 2 {
                return Err(DropReason::TypeMismatch);
            }
            let answer = block.answer_text().ok_or(DropReason::MissingAnswer)?;
            QuestionKind::FillBlank { answer }
        }
        QuestionType::Essay | QuestionType::Mixed => {
            if block.options.len() >= 2 {
                return Err(DropReason::TypeMismatch);
            }
            let sample_answer = block
                .reference_text()
                .or_else(|| block.answer_text())
                .unwrap_or_default();
            QuestionKind::Essay { sample_answer }
        }
    };

    Ok((stem, kind, block.explanation_text()))
}

/// 混合题型：按题块内容推断
fn infer_type(block: &RawBlock, stem: &str) -> Result<QuestionType, DropReason> {
    if block.reference_text().is_some() {
        return Ok(QuestionType::Essay);
    }
    if block.options.len() >= 2 {
        return Ok(QuestionType::MultipleChoice);
    }
    if block.answer_text().is_some() {
        return Ok(QuestionType::FillBlank);
    }
    if BLANK.is_match(stem) {
        return Err(DropReason::MissingAnswer);
    }
    Ok(QuestionType::Essay)
}

fn build_multiple_choice(block: &RawBlock) -> Result<QuestionKind, DropReason> {
    if block.options.len() < 2 {
        return Err(DropReason::TooFewOptions);
    }
    if block.duplicate_label {
        return Err(DropReason::DuplicateOptions);
    }

    let answer = block.answer_text().ok_or(DropReason::MissingAnswer)?;
    let correct_index = resolve_answer(&block.options, &answer).ok_or(DropReason::UnresolvedAnswer)?;
    let options: Vec<String> = block.options.iter().map(|(_, text)| text.clone()).collect();

    QuestionKind::multiple_choice(options, correct_index).ok_or(DropReason::DuplicateOptions)
}

/// 把答案对应到选项：先按选项原文，再按字母标号
fn resolve_answer(options: &[(char, String)], answer: &str) -> Option<usize> {
    let answer = answer.trim();
    if let Some(index) = options
        .iter()
        .position(|(_, text)| text.trim().eq_ignore_ascii_case(answer))
    {
        return Some(index);
    }

    let letter = ANSWER_LETTER
        .captures(answer)?
        .get(1)?
        .as_str()
        .chars()
        .next()?
        .to_ascii_uppercase();
    options.iter().position(|(label, _)| *label == letter)
}
