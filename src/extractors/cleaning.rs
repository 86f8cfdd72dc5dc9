use regex::Regex;
use std::sync::OnceLock;

fn tool_artifact_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\w+_map\{[^}]*\}").unwrap(),
            Regex::new(r#"\{"name"\s*:\s*"[^"]*"\s*,\s*"location"\s*:[^}]*"description"\s*:[^}]*\}"#)
                .unwrap(),
            Regex::new(r#""cite"\s*:\s*"turn\d+search\d+""#).unwrap(),
            Regex::new(r"【\d+:\d+†[^】]*】").unwrap(),
            Regex::new(r"\[\d+\]").unwrap(),
        ]
    })
}

fn collapsed_spaces_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

fn collapsed_newlines_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Single pure cleaning pass applied to every extracted message, exactly
/// once, at extract time. Repositories and search operate on the cleaned
/// content and never re-clean it.
pub fn clean_message_content(raw: &str) -> String {
    let mut text: String = raw
        .chars()
        .filter(|c| !('\u{E000}'..='\u{F8FF}').contains(c))
        .collect();

    for pattern in tool_artifact_patterns() {
        text = pattern.replace_all(&text, "").into_owned();
    }

    let collapsed_spaces = collapsed_spaces_pattern().replace_all(&text, " ");
    let trimmed_lines: String = collapsed_spaces
        .lines()
        .map(|line| line.trim())
        .collect::<Vec<_>>()
        .join("\n");

    let collapsed_newlines = collapsed_newlines_pattern()
        .replace_all(&trimmed_lines, "\n\n")
        .into_owned();

    collapsed_newlines.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_private_use_area_characters() {
        let raw = "hello\u{E000}world";
        assert_eq!(clean_message_content(raw), "helloworld");
    }

    #[test]
    fn removes_citation_markers() {
        let raw = "Some fact 【1:2†source】 and another [1].";
        let cleaned = clean_message_content(raw);
        assert!(!cleaned.contains("【"));
        assert!(!cleaned.contains("[1]"));
    }

    #[test]
    fn collapses_whitespace_and_blank_lines() {
        let raw = "line one   \n\n\n\nline two\t\t";
        assert_eq!(clean_message_content(raw), "line one\n\nline two");
    }

    #[test]
    fn preserves_markdown_structure() {
        let raw = "# Heading\n\n```rust\nfn main() {}\n```\n\n- item one\n- item two";
        let cleaned = clean_message_content(raw);
        assert!(cleaned.contains("# Heading"));
        assert!(cleaned.contains("```rust"));
        assert!(cleaned.contains("- item one"));
    }
}
