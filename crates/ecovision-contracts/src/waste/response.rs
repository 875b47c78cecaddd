use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::category::WasteCategory;
use crate::error::ScanError;

const CLASSIFICATION_SCHEMA: &str = "classification";
const DISTRIBUTION_SCHEMA: &str = "probability_distribution";
const SUMMARY_SCHEMA: &str = "summary";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationOutput {
    pub item_name: String,
    pub category: WasteCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycling_tips: Option<String>,
}

impl ClassificationOutput {
    /// Checks a model reply. Unknown keys are dropped, `null` tips count as absent.
    pub fn validate(payload: &Map<String, Value>) -> Result<Self, ScanError> {
        let item_name = required_str(payload, "itemName", CLASSIFICATION_SCHEMA)?;
        if item_name.trim().is_empty() {
            return Err(ScanError::schema(CLASSIFICATION_SCHEMA, "'itemName' is empty"));
        }
        let category: WasteCategory = required_str(payload, "category", CLASSIFICATION_SCHEMA)?
            .parse()
            .map_err(|err: ScanError| match err {
                ScanError::SchemaValidation { reason, .. } => {
                    ScanError::schema(CLASSIFICATION_SCHEMA, format!("'category': {reason}"))
                }
                other => other,
            })?;
        let recycling_tips = match payload.get("recyclingTips") {
            None | Some(Value::Null) => None,
            Some(Value::String(tips)) => Some(tips.clone()),
            Some(_) => {
                return Err(ScanError::schema(
                    CLASSIFICATION_SCHEMA,
                    "'recyclingTips' must be a string",
                ))
            }
        };
        if recycling_tips.is_some() && !category.allows_tips() {
            return Err(ScanError::schema(
                CLASSIFICATION_SCHEMA,
                format!("'recyclingTips' must be omitted for {category}"),
            ));
        }
        Ok(Self {
            item_name: item_name.trim().to_string(),
            category,
            recycling_tips,
        })
    }

    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "itemName": {
                    "type": "string",
                    "description": "The specific name of the waste item (e.g., \"Plastic bottle\", \"Apple core\").",
                },
                "category": {
                    "type": "string",
                    "enum": category_labels(),
                    "description": "The classification category of the waste item.",
                },
                "recyclingTips": {
                    "type": "string",
                    "description": "A few ideas on how to recycle or biodegrade the waste item yourself. Only provide for 'Recyclable' and 'Biodegradable' items.",
                },
            },
            "required": ["itemName", "category"],
        })
    }
}

/// Per-category probabilities from the continuous flow. The sum is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityDistribution {
    #[serde(rename = "Biodegradable")]
    pub biodegradable: f64,
    #[serde(rename = "Recyclable")]
    pub recyclable: f64,
    #[serde(rename = "Domestic Hazardous")]
    pub domestic_hazardous: f64,
}

impl ProbabilityDistribution {
    pub fn validate(payload: &Map<String, Value>) -> Result<Self, ScanError> {
        let probability = |category: WasteCategory| -> Result<f64, ScanError> {
            let key = category.as_str();
            let value = payload
                .get(key)
                .ok_or_else(|| ScanError::schema(DISTRIBUTION_SCHEMA, format!("missing '{key}'")))?
                .as_f64()
                .ok_or_else(|| {
                    ScanError::schema(DISTRIBUTION_SCHEMA, format!("'{key}' must be a number"))
                })?;
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ScanError::schema(
                    DISTRIBUTION_SCHEMA,
                    format!("'{key}' = {value} is outside [0, 1]"),
                ));
            }
            Ok(value)
        };
        Ok(Self {
            biodegradable: probability(WasteCategory::Biodegradable)?,
            recyclable: probability(WasteCategory::Recyclable)?,
            domestic_hazardous: probability(WasteCategory::DomesticHazardous)?,
        })
    }

    pub fn get(&self, category: WasteCategory) -> f64 {
        match category {
            WasteCategory::Biodegradable => self.biodegradable,
            WasteCategory::Recyclable => self.recyclable,
            WasteCategory::DomesticHazardous => self.domestic_hazardous,
        }
    }

    pub fn total(&self) -> f64 {
        self.biodegradable + self.recyclable + self.domestic_hazardous
    }

    pub fn is_normalized(&self, tolerance: f64) -> bool {
        (self.total() - 1.0).abs() <= tolerance
    }

    /// Highest-probability category; ties go to the earlier category.
    pub fn most_likely(&self) -> WasteCategory {
        let mut best = WasteCategory::Biodegradable;
        for category in WasteCategory::ALL {
            if self.get(category) > self.get(best) {
                best = category;
            }
        }
        best
    }

    pub fn json_schema() -> Value {
        let mut properties = Map::new();
        for category in WasteCategory::ALL {
            properties.insert(
                category.as_str().to_string(),
                json!({
                    "type": "number",
                    "minimum": 0.0,
                    "maximum": 1.0,
                    "description": format!("The probability of the item being {category}."),
                }),
            );
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": category_labels(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
}

impl SummaryResult {
    pub fn validate(payload: &Map<String, Value>) -> Result<Self, ScanError> {
        let summary = required_str(payload, "summary", SUMMARY_SCHEMA)?;
        if summary.trim().is_empty() {
            return Err(ScanError::schema(SUMMARY_SCHEMA, "'summary' is empty"));
        }
        Ok(Self {
            summary: summary.trim().to_string(),
        })
    }

    pub fn json_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "A summary of the waste classification history.",
                },
            },
            "required": ["summary"],
        })
    }
}

fn required_str<'a>(
    payload: &'a Map<String, Value>,
    key: &str,
    schema: &'static str,
) -> Result<&'a str, ScanError> {
    payload
        .get(key)
        .ok_or_else(|| ScanError::schema(schema, format!("missing '{key}'")))?
        .as_str()
        .ok_or_else(|| ScanError::schema(schema, format!("'{key}' must be a string")))
}

fn category_labels() -> Vec<&'static str> {
    WasteCategory::ALL.iter().map(|category| category.as_str()).collect()
}
