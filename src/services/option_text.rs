//! 班级选项文本解析
//!
//! 页面 `<option>` 文本的格式并不统一，例如
//! `IF4101 Basis Data (3) 25/40 | Dosen ...`，
//! 所有正则启发式都集中在这里。

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Capacity, Category, ClassOption, RawValueParts};

static CAPACITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").expect("capacity regex"));
static STRICT_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z]{1,4}\d{3,6})\s+(.+?)\((\d+)\)").expect("display meta regex")
});
static CODE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{1,5}\d{3,7}$").expect("code token regex"));
static CREDITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)\)").expect("credits regex"));
static TRAILING_CAPACITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+\s*/\s*\d+\s*$").expect("trailing capacity regex"));

/// 文本中解析出的展示信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayMeta {
    pub display_code: String,
    pub name: String,
    pub credits: Option<u32>,
}

/// 规范化空白，并去掉 ` | ` 之后的附加说明
pub fn prepare_text(text: &str) -> String {
    let text = text.replace('\u{00A0}', " ");
    let text = match text.find(" | ") {
        Some(idx) => &text[..idx],
        None => text.as_str(),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 取最后一个 `已选/名额` 数对
pub fn parse_capacity(text: &str) -> Capacity {
    let Some(last) = CAPACITY_RE.captures_iter(text).last() else {
        return Capacity::default();
    };
    Capacity {
        filled: last[1].parse().ok(),
        quota: last[2].parse().ok(),
    }
}

/// 先按 `CODE 名称 (学分)` 严格匹配，失败后逐段猜测
pub fn parse_display_meta(text: &str) -> DisplayMeta {
    if let Some(caps) = STRICT_META_RE.captures(text) {
        return DisplayMeta {
            display_code: caps[1].to_string(),
            name: caps[2].trim().to_string(),
            credits: caps[3].parse().ok(),
        };
    }

    let tokens: Vec<&str> = text.split(' ').collect();
    let code_guess = tokens
        .first()
        .filter(|t| CODE_TOKEN_RE.is_match(t))
        .map(|t| t.to_string())
        .unwrap_or_default();
    let credits = CREDITS_RE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok());

    let no_cap = TRAILING_CAPACITY_RE.replace(text, "");
    let no_cap = no_cap.trim();

    let name = match no_cap.find('(') {
        Some(idx) if idx > 0 => {
            let after_code = if code_guess.is_empty() {
                no_cap
            } else {
                no_cap
                    .strip_prefix(code_guess.as_str())
                    .map(str::trim_start)
                    .unwrap_or(no_cap)
            };
            match after_code.find('(') {
                Some(end) => after_code[..end].trim().to_string(),
                None => after_code.trim().to_string(),
            }
        }
        _ => {
            let end = tokens.len().saturating_sub(2).max(1);
            tokens.get(1..end).unwrap_or_default().join(" ").trim().to_string()
        }
    };

    DisplayMeta {
        display_code: code_guess,
        name,
        credits,
    }
}

/// 拆分选项值 `code|section|curriculumYear|department`
pub fn parse_option_value(raw_value: &str) -> RawValueParts {
    RawValueParts::parse(raw_value)
}

/// 由一条原始选项构建 ClassOption
pub fn build_option(category: Category, raw_value: &str, option_text: &str) -> ClassOption {
    let parts = parse_option_value(raw_value);
    let text = prepare_text(option_text);
    let meta = parse_display_meta(&text);

    ClassOption {
        raw_value: raw_value.to_string(),
        value_code: parts.code,
        display_code: meta.display_code,
        name: meta.name,
        credits: meta.credits,
        section: parts.section,
        department: parts.department,
        curriculum_year: parts.curriculum_year,
        category,
        capacity: parse_capacity(&text),
    }
}
