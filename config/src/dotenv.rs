//! `.env` reader: turns the project env file into key/value pairs.
//!
//! Accepts the pragmatic subset our deployment scripts produce: one
//! `KEY=VALUE` per line, an optional `export ` prefix, `#` comments (whole
//! line or trailing an unquoted value), and single- or double-quoted values.
//! Double quotes understand `\n`, `\"` and `\\`; single-quoted text is taken
//! literally. Malformed lines are skipped, never fatal.

use std::collections::HashMap;
use std::path::Path;

/// Splits one line into a key/value pair. `None` for blanks, comments, and
/// lines that do not form an assignment.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim_start();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, rest) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_string(), read_value(rest.trim())))
}

fn unquote(raw: &str, quote: char) -> Option<&str> {
    raw.strip_prefix(quote)?.strip_suffix(quote)
}

/// Decodes the value side of an assignment: quoted forms first, otherwise
/// bare text up to an inline comment.
fn read_value(raw: &str) -> String {
    if let Some(inner) = unquote(raw, '"') {
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    // Unknown escape: keep both characters.
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        return out;
    }
    if let Some(inner) = unquote(raw, '\'') {
        return inner.to_string();
    }
    // Bare value: a ` #` starts an inline comment.
    let end = raw.find(" #").unwrap_or(raw.len());
    raw[..end].trim_end().to_string()
}

/// Reads `.env` from `override_dir` (or the current directory) into a map.
/// A missing file is an empty map, not an error.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    let dir = match override_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
    {
        Some(d) => d,
        None => return Ok(HashMap::new()),
    };
    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().filter_map(parse_line).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_with_and_without_export() {
        assert_eq!(
            parse_line("PORT_AGENT=51200"),
            Some(("PORT_AGENT".into(), "51200".into()))
        );
        assert_eq!(
            parse_line("export LLM_MODEL=deepseek-chat"),
            Some(("LLM_MODEL".into(), "deepseek-chat".into()))
        );
        assert_eq!(parse_line("# a comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("no assignment here"), None);
        assert_eq!(parse_line("BAD KEY=1"), None);
    }

    #[test]
    fn quoted_values_and_escapes() {
        assert_eq!(
            parse_line(r#"GREETING="hello \"world\"""#),
            Some(("GREETING".into(), "hello \"world\"".into()))
        );
        assert_eq!(
            parse_line(r#"MULTI="line1\nline2""#),
            Some(("MULTI".into(), "line1\nline2".into()))
        );
        // single quotes are literal: no escape processing
        assert_eq!(
            parse_line(r"RAW='a\nb'"),
            Some(("RAW".into(), r"a\nb".into()))
        );
        assert_eq!(parse_line("EMPTY=\"\""), Some(("EMPTY".into(), String::new())));
    }

    #[test]
    fn bare_values_stop_at_inline_comments() {
        assert_eq!(
            parse_line("TTS_VOICE=charon # default voice"),
            Some(("TTS_VOICE".into(), "charon".into()))
        );
        // a # glued to the value is part of it
        assert_eq!(
            parse_line("COLOR=#ff8800"),
            Some(("COLOR".into(), "#ff8800".into()))
        );
        // quoted values keep their hash
        assert_eq!(
            parse_line("NOTE=\"keep # this\""),
            Some(("NOTE".into(), "keep # this".into()))
        );
    }

    #[test]
    fn load_env_map_reads_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_map(Some(dir.path())).unwrap().is_empty());

        std::fs::write(
            dir.path().join(".env"),
            "A=1\nexport B=two\n# skip\nC=\"three # kept\"\n",
        )
        .unwrap();
        let map = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("A").map(String::as_str), Some("1"));
        assert_eq!(map.get("B").map(String::as_str), Some("two"));
        assert_eq!(map.get("C").map(String::as_str), Some("three # kept"));
    }
}
