//! Lenient extraction of JSON objects from model output.
//!
//! Models asked for "JSON only" still wrap their output in markdown fences,
//! prepend prose, or append commentary. These helpers strip that noise so
//! callers can run a strict `serde_json` parse on the object itself, with
//! field-level scanners as a fallback for partially malformed output.

/// Isolate the JSON object inside a raw model response: strip markdown
/// fences, then slice from the first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> &str {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    }
}

/// Extract a JSON string field value by scanning for `"field":"value"`,
/// handling escaped quotes.
pub fn extract_string_field(json: &str, field: &str) -> Option<String> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?;
    let trimmed = after_colon.trim_start();

    if !trimmed.starts_with('"') {
        return None;
    }

    let content = &trimmed[1..];
    let mut end = None;
    let mut escaped = false;
    for (i, ch) in content.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                end = Some(i);
                break;
            }
            _ => {}
        }
    }

    end.map(|e| content[..e].to_string())
}

/// Extract a JSON number field by scanning for `"field": 0.85`.
pub fn extract_number_field(json: &str, field: &str) -> Option<f32> {
    let pattern = format!("\"{}\"", field);
    let pos = json.find(&pattern)?;
    let after_key = &json[pos + pattern.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();

    let end = after_colon
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(after_colon.len());

    after_colon[..end].parse::<f32>().ok()
}
