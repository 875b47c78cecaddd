use ecovision_contracts::waste::{Flow, WasteCategory};
use ecovision_contracts::ScanError;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use super::{ModelInvocation, ModelProvider, ModelReply};
use crate::prompts::RenderedPrompt;

/// Offline provider: derives a stable answer from the image bytes so the
/// same photo always lands in the same bin.
pub struct DryrunProvider;

const BIODEGRADABLE_ITEMS: [&str; 4] = ["Banana Peel", "Apple Core", "Used Tea Bag", "Eggshells"];
const RECYCLABLE_ITEMS: [&str; 4] = [
    "Plastic Water Bottle",
    "Cardboard Box",
    "Aluminium Can",
    "Glass Jar",
];
const HAZARDOUS_ITEMS: [&str; 4] = [
    "Used AA Battery",
    "Paint Can",
    "Expired Medicine Strip",
    "Tube Light",
];

impl ModelProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn invoke(&self, request: &ModelInvocation) -> Result<ModelReply, ScanError> {
        let reply = match request.flow {
            Flow::Classify => classify_reply(&image_digest(&request.prompt)),
            Flow::ClassifyContinuous => distribution_reply(&image_digest(&request.prompt)),
            Flow::Summarize => summary_reply(&history_from_prompt(&request.prompt.text())),
        };
        Ok(ModelReply {
            text: reply.to_string(),
            model: request.model.clone(),
            input_tokens: None,
            output_tokens: None,
        })
    }
}

fn image_digest(prompt: &RenderedPrompt) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for image in prompt.media() {
        hasher.update(image.decode());
    }
    hasher.finalize().into()
}

fn category_from_digest(digest: &[u8; 32]) -> WasteCategory {
    WasteCategory::ALL[usize::from(digest[0]) % WasteCategory::ALL.len()]
}

fn classify_reply(digest: &[u8; 32]) -> Value {
    let category = category_from_digest(digest);
    let items = match category {
        WasteCategory::Biodegradable => BIODEGRADABLE_ITEMS,
        WasteCategory::Recyclable => RECYCLABLE_ITEMS,
        WasteCategory::DomesticHazardous => HAZARDOUS_ITEMS,
    };
    let item_name = items[usize::from(digest[1]) % items.len()];
    let mut reply = json!({
        "itemName": item_name,
        "category": category.as_str(),
    });
    if category.allows_tips() {
        reply["recyclingTips"] = Value::String(tips_for(category).to_string());
    }
    reply
}

fn tips_for(category: WasteCategory) -> &'static str {
    match category {
        WasteCategory::Biodegradable => {
            "Add it to a home compost pit with dry leaves, or bury it near plants as fertilizer."
        }
        WasteCategory::Recyclable => {
            "Rinse it and reuse it as a planter or storage container before putting it in the blue bin."
        }
        WasteCategory::DomesticHazardous => "",
    }
}

fn distribution_reply(digest: &[u8; 32]) -> Value {
    let leading = category_from_digest(digest);
    let weights: Vec<(WasteCategory, f64)> = WasteCategory::ALL
        .iter()
        .enumerate()
        .map(|(idx, category)| {
            let bias = if *category == leading { 512.0 } else { 0.0 };
            (*category, f64::from(digest[idx + 1]) + 1.0 + bias)
        })
        .collect();
    let total: f64 = weights.iter().map(|(_, weight)| weight).sum();
    let mut reply = Map::new();
    for (category, weight) in weights {
        reply.insert(category.as_str().to_string(), json!(weight / total));
    }
    Value::Object(reply)
}

fn history_from_prompt(text: &str) -> Vec<String> {
    let Some((_, listing)) = text.split_once("History:") else {
        return Vec::new();
    };
    listing
        .lines()
        .filter_map(|line| line.trim().strip_prefix("- "))
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect()
}

fn summary_reply(history: &[String]) -> Value {
    let counts: Vec<(WasteCategory, usize)> = WasteCategory::ALL
        .iter()
        .map(|category| {
            let count = history
                .iter()
                .filter(|label| label.as_str() == category.as_str())
                .count();
            (*category, count)
        })
        .collect();
    let Some((top, top_count)) = counts
        .iter()
        .copied()
        .filter(|(_, count)| *count > 0)
        .reduce(|best, next| if next.1 > best.1 { next } else { best })
    else {
        return json!({
            "summary": "No items scanned yet. Scan a few things around you to start building good sorting habits!"
        });
    };
    let tip = match top {
        WasteCategory::Biodegradable => "Try starting a small compost bin for kitchen scraps.",
        WasteCategory::Recyclable => "Rinse containers before binning so they can be recycled cleanly.",
        WasteCategory::DomesticHazardous => {
            "Keep hazardous items sealed and hand them to an authorised collection point."
        }
    };
    json!({
        "summary": format!(
            "Great work! You've sorted {} items, and {} of them were {}. Tip: {}",
            history.len(),
            top_count,
            top.as_str(),
            tip
        )
    })
}
