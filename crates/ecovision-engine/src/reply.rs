use ecovision_contracts::waste::Flow;
use ecovision_contracts::ScanError;
use serde_json::{Map, Value};

fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.to_string();
    }
    let mut body = lines[1..lines.len() - 1].join("\n").trim().to_string();
    if body.to_ascii_lowercase().starts_with("json") {
        body = body[4..].trim().to_string();
    }
    body
}

/// Pulls the JSON object out of a model reply, tolerating a code fence or surrounding prose.
pub fn extract_json_object(flow: Flow, text: &str) -> Result<Map<String, Value>, ScanError> {
    let raw = strip_code_fence(text);
    if raw.trim().is_empty() {
        return Err(ScanError::schema(schema_name(flow), "model reply was empty"));
    }
    let mut candidates = vec![raw.clone()];
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            candidates.push(raw[start..=end].to_string());
        }
    }
    for candidate in candidates {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&candidate) {
            return Ok(object);
        }
    }
    Err(ScanError::schema(
        schema_name(flow),
        format!("model reply is not a JSON object: {}", truncate_text(&raw, 160)),
    ))
}

pub fn schema_name(flow: Flow) -> &'static str {
    match flow {
        Flow::Classify => "classification",
        Flow::ClassifyContinuous => "probability_distribution",
        Flow::Summarize => "summary",
    }
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use ecovision_contracts::waste::Flow;
    use ecovision_contracts::ScanError;
    use serde_json::json;

    use super::extract_json_object;

    #[test]
    fn accepts_bare_fenced_and_wrapped_objects() -> anyhow::Result<()> {
        let bare = extract_json_object(Flow::Summarize, r#"{"summary":"ok"}"#)?;
        assert_eq!(bare["summary"], json!("ok"));

        let fenced = extract_json_object(Flow::Summarize, "```json\n{\"summary\":\"ok\"}\n```")?;
        assert_eq!(fenced["summary"], json!("ok"));

        let wrapped = extract_json_object(
            Flow::Classify,
            "Here you go: {\"itemName\":\"Can\",\"category\":\"Recyclable\"} hope it helps",
        )?;
        assert_eq!(wrapped["itemName"], json!("Can"));
        Ok(())
    }

    #[test]
    fn rejects_non_objects_as_schema_failures() {
        for text in ["", "   ", "[1,2,3]", "Recyclable", "{not json}"] {
            let err = extract_json_object(Flow::ClassifyContinuous, text).err();
            assert!(
                matches!(
                    err,
                    Some(ScanError::SchemaValidation {
                        schema: "probability_distribution",
                        ..
                    })
                ),
                "{text:?}"
            );
        }
    }
}
