//! Legal-hierarchy context formatting
//!
//! Partitions the final document list into three SECTION blocks by
//! priority: core statutes first, administrative rules second, cases
//! and commentary last. The generator prompt consumes this string; the
//! UI consumes the short reference lines.

use super::{keys, truncate_chars, Document};

pub const SECTION_0_HEADER: &str = "## [SECTION 0: 사용자 계약서 OCR (최우선 참고)]";
pub const SECTION_1_HEADER: &str = "## [SECTION 1: 핵심 법령 (최우선 법적 근거)]";
pub const SECTION_2_HEADER: &str = "## [SECTION 2: 관련 규정 및 절차 (세부 기준)]";
pub const SECTION_3_HEADER: &str = "## [SECTION 3: 판례 및 해석 사례 (적용 예시)]";

/// Uploaded contract text is capped to keep the prompt within budget.
pub const CONTRACT_MAX_CHARS: usize = 12_000;

/// Priorities mapped to SECTION 1 (core statutes).
const SECTION_1_PRIORITIES: [i64; 4] = [1, 2, 4, 5];
/// Priorities mapped to SECTION 2 (rules and procedures).
const SECTION_2_PRIORITIES: [i64; 5] = [3, 6, 7, 8, 11];

/// Source label for a document: statute name, case name, or whatever
/// identifying field the chunk carries.
fn source_title(doc: &Document) -> String {
    for key in ["src_title", "source", "src", "file", "title", keys::SOURCE_INDEX] {
        if let Some(v) = doc.meta_str(key) {
            return v;
        }
    }
    "자료".to_string()
}

/// Article (statute/rule clause) or, for cases, the case number.
fn article(doc: &Document) -> Option<String> {
    doc.meta_str("article").or_else(|| doc.meta_str("case_no"))
}

/// One full line: `{src_title} {article} - {body}` with the body
/// flattened to a single line and truncated.
pub fn format_reference_line(doc: &Document, text_max_chars: usize) -> String {
    let text = truncate_chars(&doc.content.trim().replace('\n', " "), text_max_chars);
    let mut left = source_title(doc);
    if let Some(a) = article(doc) {
        left.push(' ');
        left.push_str(&a);
    }
    format!("{} - {}", left.trim(), text).trim().to_string()
}

/// Short UI reference: `{src_title} {article}` with no body.
pub fn format_reference_short(doc: &Document) -> String {
    let mut out = source_title(doc);
    if let Some(a) = article(doc) {
        out.push(' ');
        out.push_str(&a);
    }
    let out = out.trim().to_string();
    if out.is_empty() {
        "자료".to_string()
    } else {
        out
    }
}

/// Assemble the SECTION 1/2/3 context string. Empty sections are
/// omitted.
pub fn format_context(docs: &[Document], text_max_chars: usize) -> String {
    let mut section_law: Vec<String> = Vec::new();
    let mut section_rule: Vec<String> = Vec::new();
    let mut section_case: Vec<String> = Vec::new();

    for doc in docs {
        let entry = format!("- {}", format_reference_line(doc, text_max_chars));
        let p = doc.priority();
        if SECTION_1_PRIORITIES.contains(&p) {
            section_law.push(entry);
        } else if SECTION_2_PRIORITIES.contains(&p) {
            section_rule.push(entry);
        } else {
            section_case.push(entry);
        }
    }

    let mut parts: Vec<String> = Vec::new();
    for (header, lines) in [
        (SECTION_1_HEADER, section_law),
        (SECTION_2_HEADER, section_rule),
        (SECTION_3_HEADER, section_case),
    ] {
        if !lines.is_empty() {
            parts.push(format!("{header}\n{}", lines.join("\n")));
        }
    }
    parts.join("\n\n").trim().to_string()
}

/// SECTION 0 block for uploaded contract OCR text, truncated to
/// [`CONTRACT_MAX_CHARS`]. Blank input yields nothing.
pub fn format_contract_block(contract_text: &str) -> Option<String> {
    let trimmed = contract_text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(
        "{SECTION_0_HEADER}\n{}",
        truncate_chars(trimmed, CONTRACT_MAX_CHARS)
    ))
}
