use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub model_name: String,
    pub full_prompt: String,
}

/// The content collaborator. The raw HTTP transport and streaming/model
/// selection concerns live outside the core; this trait is the entire
/// surface the core depends on.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        prompt: &str,
        temperature: f32,
        thinking: bool,
        timeout: Duration,
    ) -> Result<ChatResponse>;
}

/// Defensive JSON extraction/repair, used on whatever `chat` returns.
/// Tries, in order: parse as-is; extract a fenced code block; find the
/// first balanced `{...}`/`[...]`; repair LaTeX-style backslash escapes
/// (`\(`, `\s`, `\t`, ...) that are invalid JSON string escapes by
/// double-escaping non-structural backslashes, then retry.
pub fn parse_object(text: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str(text) {
        return Some(v);
    }

    if let Some(fenced) = extract_fenced_block(text) {
        if let Ok(v) = serde_json::from_str(&fenced) {
            return Some(v);
        }
        if let Some(repaired) = repair_and_parse(&fenced) {
            return Some(repaired);
        }
    }

    if let Some(braces) = extract_first_balanced(text) {
        if let Ok(v) = serde_json::from_str(&braces) {
            return Some(v);
        }
        if let Some(repaired) = repair_and_parse(&braces) {
            return Some(repaired);
        }
    }

    repair_and_parse(text)
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let after_fence = after_fence.strip_prefix("JSON").unwrap_or(after_fence);
    let end = after_fence.find("```")?;
    Some(after_fence[..end].trim().to_string())
}

fn extract_first_balanced(text: &str) -> Option<String> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(start) = text.find(open) {
            let mut depth = 0i32;
            for (offset, ch) in text[start..].char_indices() {
                if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(text[start..start + offset + ch.len_utf8()].to_string());
                    }
                }
            }
        }
    }
    None
}

/// Double-escapes backslashes that are not already part of a valid JSON
/// string escape sequence, which repairs the common LLM failure mode of
/// emitting raw LaTeX (`\(x\)`, `\sqrt`) inside a JSON string value.
fn repair_and_parse(text: &str) -> Option<serde_json::Value> {
    let mut repaired = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('"') | Some('\\') | Some('/') | Some('n') | Some('r') | Some('t') | Some('b')
                | Some('f') | Some('u') => {
                    repaired.push('\\');
                }
                _ => {
                    repaired.push_str("\\\\");
                }
            }
        } else {
            repaired.push(c);
        }
    }
    serde_json::from_str(&repaired).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_json() {
        let v = parse_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn parses_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        let v = parse_object(text).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn parses_first_balanced_braces() {
        let text = "noise before {\"a\": 1} noise after";
        let v = parse_object(text).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn repairs_latex_backslashes() {
        let text = r#"{"question": "Simplify \(x^2\)"}"#;
        let v = parse_object(text).unwrap();
        assert_eq!(v["question"], "Simplify \\(x^2\\)");
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_object("not json at all").is_none());
    }
}
