use super::{Answer, Answers, Checklist, ItemAnswer};
use crate::error::CallError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Decode a model reply into one answer per checklist key.
///
/// Missing keys are a validation failure; extra keys are dropped.
pub fn decode_answers<A: Answer>(raw: &str, checklist: &Checklist) -> Result<Answers<A>, CallError> {
    let decode_error = |reason: String| CallError::Decode {
        reason,
        raw: raw.to_string(),
    };

    let json_str = extract_json(raw)
        .ok_or_else(|| decode_error("no JSON object found in response".to_string()))?;

    let mut items: BTreeMap<String, Value> =
        serde_json::from_str(&json_str).map_err(|e| decode_error(e.to_string()))?;

    let missing: Vec<String> = checklist
        .keys()
        .filter(|key| !items.contains_key(*key))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(CallError::Validation {
            missing,
            raw: raw.to_string(),
        });
    }

    let mut answers = Answers::new();
    for key in checklist.keys() {
        if let Some(value) = items.remove(key) {
            let item: ItemAnswer<A> = serde_json::from_value(value)
                .map_err(|e| decode_error(format!("invalid entry for '{}': {}", key, e)))?;
            answers.insert(key.clone(), item);
        }
    }

    Ok(answers)
}

/// Extract a JSON object from a string that might contain markdown code blocks
pub fn extract_json(s: &str) -> Option<String> {
    // First try: the whole string is valid JSON
    if s.trim().starts_with('{') && serde_json::from_str::<Value>(s.trim()).is_ok() {
        return Some(s.trim().to_string());
    }

    // Second try: extract from markdown code block
    let re = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for cap in re.captures_iter(s) {
        let potential_json = cap.get(1)?.as_str().trim();
        if serde_json::from_str::<Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Third try: first balanced object, skipping braces inside strings
    let brace_start = s.find('{')?;
    if let Some(end) = balanced_end(&s[brace_start..]) {
        let potential_json = &s[brace_start..brace_start + end];
        if serde_json::from_str::<Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    // Last try: first '{' to last '}'
    let brace_end = s.rfind('}')?;
    if brace_end > brace_start {
        let potential_json = &s[brace_start..=brace_end];
        if serde_json::from_str::<Value>(potential_json).is_ok() {
            return Some(potential_json.to_string());
        }
    }

    None
}

/// Byte length of the object opening `s`, or `None` if it never closes
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
