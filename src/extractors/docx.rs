//! DOCX extractor — file-based, not auto-detected from JSON (§4.1).
//!
//! DOCX is a ZIP archive with `word/document.xml` holding paragraphs as
//! `<w:p>` elements, each a run of `<w:t>` text fragments. We group
//! paragraphs by role heading into message blocks.

use super::{clean_message_content, Extractor, ExtractedMessage, ExtractorMetadata};
use crate::error::{Error, Result};
use crate::models::message::Role;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use serde_json::Value;
use std::io::Read as _;
use std::sync::OnceLock;

pub struct DocxExtractResult {
    pub title: Option<String>,
    pub messages: Vec<(Role, String, Option<DateTime<Utc>>)>,
}

/// Registry entry for the file-based DOCX format. Unlike the JSON extractors,
/// DOCX never participates in JSON format auto-detection (`detect` always
/// returns false); callers route `.docx` uploads straight to
/// `Importer::import_docx_file`, which calls `extract_from_bytes` directly.
/// It still counts toward the registry so discovery/metadata/count views
/// stay in parity (§4.1, §8).
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn key(&self) -> &'static str {
        "docx"
    }

    fn metadata(&self) -> ExtractorMetadata {
        ExtractorMetadata {
            name: "DOCX",
            version: "1.0.0",
            description: "Extracts role-tagged message blocks from exported Word documents.",
            supported_extensions: vec![".docx"],
            auto_detect: false,
            file_based: true,
        }
    }

    fn detect(&self, _data: &Value) -> bool {
        false
    }

    fn extract(&self, _data: &Value) -> Result<Vec<(Option<String>, Vec<ExtractedMessage>)>> {
        Err(Error::Internal(
            "docx is file-based; use Importer::import_docx_file instead of JSON extraction".into(),
        ))
    }
}

/// Parses a `.docx` file's raw bytes into role-tagged message blocks.
pub fn extract_from_bytes(bytes: &[u8], filename: &str) -> Result<DocxExtractResult> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| Error::Internal(format!("invalid docx archive: {e}")))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::Internal(format!("docx missing word/document.xml: {e}")))?
        .read_to_string(&mut document_xml)
        .map_err(Error::Io)?;

    let paragraphs = extract_paragraphs(&document_xml)?;
    let (messages, title) = group_by_role_heading(&paragraphs, filename);

    Ok(DocxExtractResult { title, messages })
}

fn extract_paragraphs(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"p" => {
                current.clear();
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(std::mem::take(&mut current));
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                in_text = true;
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => {
                in_text = false;
            }
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Internal(format!("malformed docx xml: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn role_heading_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(you|chatgpt|claude|user|assistant|system)( said)?:?\s*$").unwrap()
    })
}

fn role_for_heading(heading: &str) -> Role {
    match heading.to_lowercase().as_str() {
        "you" | "user" => Role::User,
        "system" => Role::System,
        _ => Role::Assistant,
    }
}

/// Groups paragraphs into message blocks by role heading, and opportunistically
/// parses any date-like text as a candidate message timestamp.
fn group_by_role_heading(
    paragraphs: &[String],
    filename: &str,
) -> (Vec<(Role, String, Option<DateTime<Utc>>)>, Option<String>) {
    let heading_re = role_heading_pattern();
    let mut messages = Vec::new();
    let mut current_role: Option<Role> = None;
    let mut current_lines: Vec<String> = Vec::new();
    let mut current_timestamp: Option<DateTime<Utc>> = None;

    let flush = |role: Option<Role>,
                 lines: &mut Vec<String>,
                 timestamp: Option<DateTime<Utc>>,
                 out: &mut Vec<(Role, String, Option<DateTime<Utc>>)>| {
        if let Some(role) = role {
            let content = clean_message_content(&lines.join("\n"));
            if !content.is_empty() {
                out.push((role, content, timestamp));
            }
        }
        lines.clear();
    };

    for paragraph in paragraphs {
        let trimmed = paragraph.trim();
        if let Some(captures) = heading_re.captures(trimmed) {
            flush(
                current_role.take(),
                &mut current_lines,
                current_timestamp.take(),
                &mut messages,
            );
            let heading = captures.get(1).unwrap().as_str();
            current_role = Some(role_for_heading(heading));
            continue;
        }

        if trimmed.is_empty() {
            flush(
                current_role,
                &mut current_lines,
                current_timestamp.take(),
                &mut messages,
            );
            continue;
        }

        if current_timestamp.is_none() {
            current_timestamp = parse_candidate_date(trimmed);
        }
        current_lines.push(trimmed.to_string());
    }
    flush(current_role, &mut current_lines, current_timestamp, &mut messages);

    let title = Some(
        filename
            .trim_end_matches(".docx")
            .trim_end_matches(".DOCX")
            .to_string(),
    );

    (messages, title)
}

fn date_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap(),
            Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap(),
            Regex::new(
                r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s*(\d{4})\b",
            )
            .unwrap(),
        ]
    })
}

fn parse_candidate_date(text: &str) -> Option<DateTime<Utc>> {
    let patterns = date_patterns();

    if let Some(c) = patterns[0].captures(text) {
        let (y, m, d) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d).map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    if let Some(c) = patterns[1].captures(text) {
        let (m, d, y) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d).map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    if let Some(c) = patterns[2].captures(text) {
        let month = month_number(&c[1])?;
        let (d, y): (u32, i32) = (c[2].parse().ok()?, c[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, month, d).map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc());
    }
    None
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_paragraphs_by_role_heading() {
        let paragraphs = vec![
            "You said:".to_string(),
            "What is Rust?".to_string(),
            "".to_string(),
            "ChatGPT said:".to_string(),
            "Rust is a systems programming language.".to_string(),
        ];
        let (messages, _) = group_by_role_heading(&paragraphs, "export.docx");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, Role::User);
        assert_eq!(messages[1].0, Role::Assistant);
    }

    #[test]
    fn parses_iso_date_as_candidate_timestamp() {
        let dt = parse_candidate_date("Conversation started 2024-03-15").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }

    #[test]
    fn parses_long_form_date() {
        let dt = parse_candidate_date("on March 15, 2024 we discussed").unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    }
}
