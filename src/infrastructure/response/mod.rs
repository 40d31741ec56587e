use once_cell::sync::Lazy;
use regex::Regex;

static THINK_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<think>[\s\S]*?</think>|<think\s*/>").unwrap());

static REASONING_TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<reasoning>[\s\S]*?</reasoning>").unwrap());

// fenced block with an optional language tag line
static CODE_FENCE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n)?([\s\S]*?)```").unwrap());

/// Removes reasoning blocks some models emit before the answer
pub fn clean_llm_response(response: &str) -> String {
    let cleaned = THINK_TAG_PATTERN.replace_all(response, "");
    let cleaned = REASONING_TAG_PATTERN.replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

/// Returns the body of the first fenced block, or the trimmed input when
/// there is none. An unterminated opening fence is dropped.
pub fn strip_code_fence(value: &str) -> String {
    if let Some(caps) = CODE_FENCE_PATTERN.captures(value) {
        if let Some(body) = caps.get(1) {
            return body.as_str().trim().to_string();
        }
    }

    let trimmed = value.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
        return rest.trim().trim_end_matches("```").trim().to_string();
    }
    trimmed.to_string()
}

/// Slice from the first `{` to the last `}`, for JSON wrapped in prose.
pub fn extract_json_object(value: &str) -> Option<&str> {
    let start = value.find('{')?;
    let end = value.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&value[start..=end])
}
