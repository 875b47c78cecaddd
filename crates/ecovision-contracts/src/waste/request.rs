use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::payload::ImagePayload;
use crate::error::ScanError;

const CLASSIFY_SCHEMA: &str = "classify_request";
const SUMMARY_SCHEMA: &str = "summary_request";

/// Input of both image flows: exactly one data-URI field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClassifyRequest {
    pub image_data_uri: ImagePayload,
}

impl ClassifyRequest {
    pub fn new(image: ImagePayload) -> Self {
        Self {
            image_data_uri: image,
        }
    }

    pub fn validate(value: &Value) -> Result<Self, ScanError> {
        let Some(object) = value.as_object() else {
            return Err(ScanError::schema(CLASSIFY_SCHEMA, "request must be an object"));
        };
        if let Some(extra) = object.keys().find(|key| *key != "imageDataUri") {
            return Err(ScanError::schema(
                CLASSIFY_SCHEMA,
                format!("unexpected field '{extra}'"),
            ));
        }
        let raw = object
            .get("imageDataUri")
            .ok_or_else(|| ScanError::schema(CLASSIFY_SCHEMA, "missing field 'imageDataUri'"))?
            .as_str()
            .ok_or_else(|| ScanError::schema(CLASSIFY_SCHEMA, "'imageDataUri' must be a string"))?;
        Ok(Self::new(ImagePayload::parse(raw)?))
    }

    pub fn to_value(&self) -> Value {
        json!({ "imageDataUri": self.image_data_uri.as_str() })
    }
}

/// Prior category labels, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub waste_classification_history: Vec<String>,
}

impl SummaryRequest {
    pub fn new(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            waste_classification_history: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn validate(value: &Value) -> Result<Self, ScanError> {
        let rows = value
            .get("wasteClassificationHistory")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ScanError::schema(SUMMARY_SCHEMA, "'wasteClassificationHistory' must be an array")
            })?;
        let mut labels = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let label = row.as_str().ok_or_else(|| {
                ScanError::schema(SUMMARY_SCHEMA, format!("history entry {idx} is not a string"))
            })?;
            labels.push(label.to_string());
        }
        Ok(Self::new(labels))
    }

    pub fn to_value(&self) -> Value {
        json!({ "wasteClassificationHistory": self.waste_classification_history })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ClassifyRequest, SummaryRequest};

    #[test]
    fn classify_request_requires_exactly_one_data_uri_field() {
        assert!(ClassifyRequest::validate(&json!({"imageDataUri": "data:image/jpeg;base64,AAAA"})).is_ok());
        assert!(ClassifyRequest::validate(&json!({})).is_err());
        assert!(ClassifyRequest::validate(&json!({"imageDataUri": ""})).is_err());
        assert!(ClassifyRequest::validate(&json!({"imageDataUri": 42})).is_err());
        assert!(ClassifyRequest::validate(&json!({
            "imageDataUri": "data:image/jpeg;base64,AAAA",
            "hint": "bottle",
        }))
        .is_err());
        assert!(ClassifyRequest::validate(&json!("data:image/jpeg;base64,AAAA")).is_err());
    }

    #[test]
    fn classify_request_serde_rejects_bad_payloads() {
        let ok: Result<ClassifyRequest, _> =
            serde_json::from_value(json!({"imageDataUri": "data:image/png;base64,AAAA"}));
        assert!(ok.is_ok());
        let bad: Result<ClassifyRequest, _> =
            serde_json::from_value(json!({"imageDataUri": "data:image/png,AAAA"}));
        assert!(bad.is_err());
    }

    #[test]
    fn summary_request_keeps_label_order() -> anyhow::Result<()> {
        let request = SummaryRequest::validate(&json!({
            "wasteClassificationHistory": ["Recyclable", "Biodegradable"],
        }))?;
        assert_eq!(
            request.waste_classification_history,
            vec!["Recyclable".to_string(), "Biodegradable".to_string()]
        );
        assert_eq!(request.to_value()["wasteClassificationHistory"][1], json!("Biodegradable"));
        assert!(SummaryRequest::validate(&json!({"wasteClassificationHistory": [1]})).is_err());
        Ok(())
    }
}
