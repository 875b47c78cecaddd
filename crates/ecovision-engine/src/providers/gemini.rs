use ecovision_contracts::ScanError;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use super::{
    response_json_or_error, transport_error, value_to_nonnegative_i64, ModelInvocation,
    ModelProvider, ModelReply,
};
use crate::prompts::PromptPart;

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &ModelInvocation) -> Value {
        let parts: Vec<Value> = request
            .prompt
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => json!({ "text": text }),
                PromptPart::Media(image) => json!({
                    "inlineData": {
                        "mimeType": image.mime_type(),
                        "data": image.data(),
                    }
                }),
            })
            .collect();
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "candidateCount": 1,
                "maxOutputTokens": request.max_output_tokens,
                "responseMimeType": "application/json",
                "responseSchema": to_gemini_schema(&request.output_schema),
            },
        })
    }

    fn extract_text(response_payload: &Value) -> String {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect::<Vec<&str>>()
            .join("\n")
    }

    fn block_reason(response_payload: &Value) -> Option<String> {
        response_payload
            .get("promptFeedback")
            .and_then(|feedback| feedback.get("blockReason"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// Gemini takes an OpenAPI-style subset: upper-case type names and no
/// `additionalProperties`.
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(object) => {
            let mut out = Map::new();
            for (key, value) in object {
                match key.as_str() {
                    "additionalProperties" => continue,
                    "type" => {
                        let upper = value
                            .as_str()
                            .map(|kind| Value::String(kind.to_ascii_uppercase()))
                            .unwrap_or_else(|| value.clone());
                        out.insert(key.clone(), upper);
                    }
                    "properties" => {
                        let mut properties = Map::new();
                        for (name, property) in value.as_object().into_iter().flatten() {
                            properties.insert(name.clone(), to_gemini_schema(property));
                        }
                        out.insert(key.clone(), Value::Object(properties));
                    }
                    _ => {
                        out.insert(key.clone(), to_gemini_schema(value));
                    }
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn invoke(&self, request: &ModelInvocation) -> Result<ModelReply, ScanError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", self.api_key.as_str())
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .map_err(|err| transport_error("Gemini", &endpoint, err))?;
        let response_payload = response_json_or_error("Gemini", response)?;

        let text = Self::extract_text(&response_payload);
        if text.is_empty() {
            let reason = Self::block_reason(&response_payload)
                .map(|reason| format!(" (blocked: {reason})"))
                .unwrap_or_default();
            return Err(ScanError::invocation(format!(
                "Gemini returned no text for {}{reason}",
                request.flow
            )));
        }
        let usage = response_payload.get("usageMetadata");
        Ok(ModelReply {
            text,
            model: request.model.clone(),
            input_tokens: value_to_nonnegative_i64(
                usage.and_then(|row| row.get("promptTokenCount")),
            ),
            output_tokens: value_to_nonnegative_i64(
                usage.and_then(|row| row.get("candidatesTokenCount")),
            ),
        })
    }
}
