use ecovision_contracts::waste::{Flow, FlowRequest, ImagePayload};
use ecovision_contracts::ScanError;
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
    RenderErrorReason,
};
use serde_json::Value;

/// Marks where `{{media url=...}}` spliced an image into the rendered text.
const MEDIA_MARK: char = '\u{1}';

const CLASSIFY_TEMPLATE: &str = r#"You are an expert in waste classification. Analyze the provided image and identify the primary waste item.

Determine the specific item name and its category from the following options: Biodegradable, Recyclable, or Domestic Hazardous.

- Biodegradable (Green Bin) examples: Vegetable peels, leftover food, meat/bones, garden leaves, tea bags, coconut shells.
- Recyclable (Blue Bin) examples: Plastic bottles, paper, cardboard, metal tins, glass, rubber, thermocol.
- Domestic Hazardous (Red Bin) examples: Paint cans, insecticide spray, used batteries, tube lights, expired medicines, broken thermometers.

If the item is 'Recyclable' or 'Biodegradable', provide a few creative and practical ideas for how someone could recycle or biodegrade the item themselves at home.
Do not provide tips for 'Domestic Hazardous' waste.

Image: {{media url=imageDataUri}}"#;

const CONTINUOUS_TEMPLATE: &str = r#"You are an expert in waste classification. Analyze the provided image.

Provide a probability score (between 0.0 and 1.0) for each of the following categories: Biodegradable, Recyclable, and Domestic Hazardous. The scores should sum to 1.0.

- Biodegradable examples: Vegetable peels, leftover food, meat/bones, garden leaves, tea bags, coconut shells.
- Recyclable examples: Plastic bottles, paper, cardboard, metal tins, glass, rubber, thermocol.
- Domestic Hazardous examples: Paint cans, insecticide spray, used batteries, tube lights, expired medicines, broken thermometers.

Image: {{media url=imageDataUri}}"#;

const SUMMARY_TEMPLATE: &str = r#"You are an expert in waste management and recycling.
Based on the following list of classified waste items, provide a short, encouraging summary for the user.
Highlight their most common classification and offer a simple tip for that category.

History:
{{#each wasteClassificationHistory}}
- {{this}}
{{/each}}
"#;

/// Appended to every prompt so models without native structured output still reply in JSON.
const JSON_REPLY_RULE: &str = "Respond with a single JSON object that matches the requested schema. No markdown, no prose outside JSON.";

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Media(ImagePayload),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub flow: Flow,
    pub parts: Vec<PromptPart>,
}

impl RenderedPrompt {
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                PromptPart::Text(text) => Some(text.as_str()),
                PromptPart::Media(_) => None,
            })
            .collect::<Vec<&str>>()
            .join("\n")
    }

    pub fn media(&self) -> impl Iterator<Item = &ImagePayload> {
        self.parts.iter().filter_map(|part| match part {
            PromptPart::Media(image) => Some(image),
            PromptPart::Text(_) => None,
        })
    }
}

pub fn template_source(flow: Flow) -> &'static str {
    match flow {
        Flow::Classify => CLASSIFY_TEMPLATE,
        Flow::ClassifyContinuous => CONTINUOUS_TEMPLATE,
        Flow::Summarize => SUMMARY_TEMPLATE,
    }
}

/// Compiled flow templates.
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, ScanError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("media", Box::new(media_helper));
        for flow in Flow::ALL {
            handlebars
                .register_template_string(flow.name(), template_source(flow))
                .map_err(|err| {
                    ScanError::invocation(format!("template {} failed to compile: {err}", flow))
                })?;
        }
        Ok(Self { handlebars })
    }

    pub fn render(&self, request: &FlowRequest) -> Result<RenderedPrompt, ScanError> {
        let flow = request.flow();
        let mut input = request.template_input();
        scrub_media_marks(&mut input);
        let rendered = self
            .handlebars
            .render(flow.name(), &input)
            .map_err(|err| ScanError::invocation(format!("{flow} prompt render failed: {err}")))?;
        let mut parts = split_media(&rendered)?;
        parts.push(PromptPart::Text(JSON_REPLY_RULE.to_string()));
        Ok(RenderedPrompt { flow, parts })
    }
}

fn media_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let url = h
        .hash_get("url")
        .and_then(|value| value.value().as_str())
        .ok_or_else(|| RenderErrorReason::Other("media helper needs a string url".to_string()))?;
    out.write(&format!("{MEDIA_MARK}{url}{MEDIA_MARK}"))?;
    Ok(())
}

/// Only the `media` helper may emit marks, so any already present in caller data
/// are replaced before rendering.
fn scrub_media_marks(value: &mut Value) {
    match value {
        Value::String(text) if text.contains(MEDIA_MARK) => {
            *text = text.replace(MEDIA_MARK, "\u{FFFD}");
        }
        Value::Array(items) => items.iter_mut().for_each(scrub_media_marks),
        Value::Object(map) => map.values_mut().for_each(scrub_media_marks),
        _ => {}
    }
}

/// Odd segments between marks are media URLs, even ones are text.
fn split_media(rendered: &str) -> Result<Vec<PromptPart>, ScanError> {
    let mut parts = Vec::new();
    for (idx, segment) in rendered.split(MEDIA_MARK).enumerate() {
        if idx % 2 == 1 {
            parts.push(PromptPart::Media(ImagePayload::parse(segment)?));
            continue;
        }
        let text = segment.trim();
        if !text.is_empty() {
            parts.push(PromptPart::Text(text.to_string()));
        }
    }
    Ok(parts)
}
