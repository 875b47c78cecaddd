use ecovision_contracts::ScanError;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{
    response_json_or_error, transport_error, value_to_nonnegative_i64, ModelInvocation,
    ModelProvider, ModelReply,
};
use crate::prompts::PromptPart;
use crate::reply::schema_name;

pub struct OpenAiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.api_base)
    }

    fn build_payload(request: &ModelInvocation) -> Value {
        let content: Vec<Value> = request
            .prompt
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => json!({ "type": "input_text", "text": text }),
                PromptPart::Media(image) => json!({
                    "type": "input_image",
                    "image_url": image.as_str(),
                }),
            })
            .collect();
        json!({
            "model": request.model,
            "input": [{
                "role": "user",
                "content": content,
            }],
            "max_output_tokens": request.max_output_tokens,
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": schema_name(request.flow),
                    "schema": request.output_schema,
                    "strict": false,
                }
            },
        })
    }
}

fn extract_output_text(response: &Value) -> String {
    if let Some(text) = response.get("output_text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return text.trim().to_string();
        }
    }

    let mut parts: Vec<&str> = Vec::new();
    let rows = response
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        match obj.get("type").and_then(Value::as_str) {
            Some("output_text" | "text") => {
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    parts.push(text.trim());
                }
                continue;
            }
            Some("message") | None => {}
            Some(_) => continue,
        }
        let content = obj
            .get("content")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for chunk in content {
            let kind = chunk.get("type").and_then(Value::as_str).unwrap_or("");
            if matches!(kind, "output_text" | "text") {
                if let Some(text) = chunk.get("text").and_then(Value::as_str) {
                    parts.push(text.trim());
                }
            }
        }
    }
    parts.retain(|text| !text.is_empty());
    parts.join("\n")
}

impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn invoke(&self, request: &ModelInvocation) -> Result<ModelReply, ScanError> {
        let endpoint = self.endpoint();
        let payload = Self::build_payload(request);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .timeout(request.timeout)
            .json(&payload)
            .send()
            .map_err(|err| transport_error("OpenAI", &endpoint, err))?;
        let parsed = response_json_or_error("OpenAI", response)?;

        let text = extract_output_text(&parsed);
        if text.is_empty() {
            return Err(ScanError::invocation(format!(
                "OpenAI returned no text for {}",
                request.flow
            )));
        }
        let usage = parsed.get("usage");
        Ok(ModelReply {
            text,
            model: parsed
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            input_tokens: value_to_nonnegative_i64(usage.and_then(|row| row.get("input_tokens"))),
            output_tokens: value_to_nonnegative_i64(
                usage.and_then(|row| row.get("output_tokens")),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ecovision_contracts::waste::{ClassifyRequest, Flow, FlowRequest, ImagePayload};
    use serde_json::json;

    use super::{extract_output_text, OpenAiProvider};
    use crate::prompts::PromptRenderer;
    use crate::providers::ModelInvocation;

    #[test]
    fn payload_carries_data_uri_and_schema_format() -> anyhow::Result<()> {
        let image = ImagePayload::parse("data:image/png;base64,iVBORw0KGgo=")?;
        let flow_request = FlowRequest::ClassifyContinuous(ClassifyRequest::new(image));
        let invocation = ModelInvocation {
            flow: Flow::ClassifyContinuous,
            model: "gpt-4o-mini".to_string(),
            prompt: PromptRenderer::new()?.render(&flow_request)?,
            output_schema: Flow::ClassifyContinuous.output_schema(),
            max_output_tokens: 120,
            timeout: Duration::from_secs(5),
        };
        let payload = OpenAiProvider::build_payload(&invocation);

        let content = &payload["input"][0]["content"];
        assert_eq!(content[0]["type"], json!("input_text"));
        assert_eq!(content[1]["type"], json!("input_image"));
        assert_eq!(
            content[1]["image_url"],
            json!("data:image/png;base64,iVBORw0KGgo=")
        );
        assert_eq!(payload["max_output_tokens"], json!(120));
        assert_eq!(payload["text"]["format"]["type"], json!("json_schema"));
        assert_eq!(
            payload["text"]["format"]["name"],
            json!("probability_distribution")
        );
        Ok(())
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let provider = OpenAiProvider::new("https://api.example.test/v1/", "sk");
        assert_eq!(provider.endpoint(), "https://api.example.test/v1/responses");
    }

    #[test]
    fn output_text_prefers_top_level_field() {
        let response = json!({
            "output_text": "  {\"summary\":\"hi\"}  ",
            "output": [{"type": "message", "content": [{"type": "output_text", "text": "other"}]}],
        });
        assert_eq!(extract_output_text(&response), "{\"summary\":\"hi\"}");
    }

    #[test]
    fn output_text_walks_message_content() {
        let response = json!({
            "output": [
                {"type": "reasoning", "content": [{"type": "output_text", "text": "skip"}]},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"a\":"},
                    {"type": "refusal", "refusal": "no"},
                    {"type": "output_text", "text": "1}"},
                ]},
            ],
        });
        assert_eq!(extract_output_text(&response), "{\"a\":\n1}");
        assert_eq!(extract_output_text(&json!({})), "");
    }
}
