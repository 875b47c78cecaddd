pub mod capture;
pub mod config;
pub mod prompts;
pub mod providers;
pub mod reply;
pub mod session;

use std::time::{Duration, Instant};

use ecovision_contracts::events::{EventPayload, EventWriter};
use ecovision_contracts::history::ClassificationResult;
use ecovision_contracts::models::{ModelRegistry, ModelSelection, ModelSelector};
use ecovision_contracts::waste::{
    ClassificationOutput, ClassifyRequest, Flow, FlowRequest, FlowResponse, ImagePayload,
    ProbabilityDistribution, SummaryRequest, SummaryResult,
};
use ecovision_contracts::ScanError;
use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::prompts::PromptRenderer;
use crate::providers::{default_provider_registry, ModelInvocation, ModelProviderRegistry, ModelReply};
use crate::reply::extract_json_object;

/// Runs the three flows: render the template, call the selected model once,
/// validate the reply.
pub struct ClassificationEngine {
    providers: ModelProviderRegistry,
    model_selector: ModelSelector,
    model: Option<String>,
    prompts: PromptRenderer,
    timeout: Duration,
    events: Option<EventWriter>,
    last_selection: Option<ModelSelection>,
}

impl ClassificationEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ScanError> {
        Self::with_providers(config, default_provider_registry(config))
    }

    /// Models whose provider is not registered are never selected.
    pub fn with_providers(
        config: &EngineConfig,
        providers: ModelProviderRegistry,
    ) -> Result<Self, ScanError> {
        let mut registry = ModelRegistry::new(None);
        registry.retain_providers(|provider| providers.contains(provider));
        Ok(Self {
            providers,
            model_selector: ModelSelector::new(Some(registry)),
            model: config.model.clone(),
            prompts: PromptRenderer::new()?,
            timeout: config.request_timeout,
            events: None,
            last_selection: None,
        })
    }

    pub fn set_event_writer(&mut self, events: EventWriter) {
        self.events = Some(events);
    }

    pub fn event_writer(&self) -> Option<&EventWriter> {
        self.events.as_ref()
    }

    pub fn set_model(&mut self, model: Option<String>) {
        self.model = model;
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn providers(&self) -> &ModelProviderRegistry {
        &self.providers
    }

    pub fn model_registry(&self) -> &ModelRegistry {
        &self.model_selector.registry
    }

    /// The model used by the most recent flow, with the fallback reason if any.
    pub fn last_selection(&self) -> Option<&ModelSelection> {
        self.last_selection.as_ref()
    }

    pub fn classify(&mut self, image: &ImagePayload) -> Result<ClassificationResult, ScanError> {
        match self.run(FlowRequest::Classify(ClassifyRequest::new(image.clone())))? {
            FlowResponse::Classification(result) => Ok(result),
            other => Err(mismatched(Flow::Classify, &other)),
        }
    }

    pub fn classify_continuous(
        &mut self,
        image: &ImagePayload,
    ) -> Result<ProbabilityDistribution, ScanError> {
        match self.run(FlowRequest::ClassifyContinuous(ClassifyRequest::new(
            image.clone(),
        )))? {
            FlowResponse::Distribution(distribution) => Ok(distribution),
            other => Err(mismatched(Flow::ClassifyContinuous, &other)),
        }
    }

    /// Any number of labels is accepted here, including none.
    pub fn summarize(&mut self, categories: &[String]) -> Result<SummaryResult, ScanError> {
        match self.run(FlowRequest::Summarize(SummaryRequest::new(
            categories.iter().cloned(),
        )))? {
            FlowResponse::Summary(summary) => Ok(summary),
            other => Err(mismatched(Flow::Summarize, &other)),
        }
    }

    pub fn run(&mut self, request: FlowRequest) -> Result<FlowResponse, ScanError> {
        let flow = request.flow();
        let started = Instant::now();
        self.last_selection = None;
        let outcome = self.run_flow(request);
        let latency_ms = started.elapsed().as_millis() as u64;
        let model = self
            .last_selection
            .as_ref()
            .map(|selection| selection.model.name.clone());

        match &outcome {
            Ok((_, reply)) => {
                tracing::info!(flow = %flow, model = %reply.model, latency_ms, "flow completed");
                self.emit(
                    "flow_completed",
                    json!({
                        "flow": flow.name(),
                        "model": reply.model,
                        "latency_ms": latency_ms,
                        "input_tokens": reply.input_tokens,
                        "output_tokens": reply.output_tokens,
                    }),
                );
            }
            Err(err) => {
                tracing::warn!(flow = %flow, kind = err.kind(), error = %err, "flow failed");
                self.emit(
                    "flow_failed",
                    json!({
                        "flow": flow.name(),
                        "model": model,
                        "latency_ms": latency_ms,
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                    }),
                );
            }
        }
        outcome.map(|(response, _)| response)
    }

    fn run_flow(&mut self, request: FlowRequest) -> Result<(FlowResponse, ModelReply), ScanError> {
        let request = revalidate(request)?;
        let flow = request.flow();

        let selection = self
            .model_selector
            .select(self.model.as_deref(), flow.capability())?;
        if let Some(reason) = selection.fallback_reason.as_deref() {
            tracing::debug!(flow = %flow, model = %selection.model.name, reason, "model fallback");
        }
        let model = selection.model.clone();
        self.last_selection = Some(selection);

        let provider = self.providers.get(&model.provider).ok_or_else(|| {
            ScanError::invocation(format!("provider '{}' is not configured", model.provider))
        })?;
        let prompt = self.prompts.render(&request)?;
        let invocation = ModelInvocation {
            flow,
            model: model.name.clone(),
            prompt,
            output_schema: flow.output_schema(),
            max_output_tokens: flow.max_output_tokens(),
            timeout: self.timeout,
        };

        self.emit(
            "flow_started",
            json!({
                "flow": flow.name(),
                "model": model.name,
                "provider": model.provider,
                "fallback_reason": self
                    .last_selection
                    .as_ref()
                    .and_then(|selection| selection.fallback_reason.clone()),
            }),
        );
        tracing::debug!(flow = %flow, model = %model.name, provider = %model.provider, "invoking model");

        let reply = provider.invoke(&invocation)?;
        let payload = extract_json_object(flow, &reply.text)?;
        Ok((decode(flow, &payload)?, reply))
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        let payload: EventPayload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = events.emit(event_type, payload) {
            tracing::warn!(event_type, error = %format!("{err:#}"), "event log write failed");
        }
    }
}

impl std::fmt::Debug for ClassificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationEngine")
            .field("providers", &self.providers)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Requests are checked again at the engine boundary, whatever built them.
fn revalidate(request: FlowRequest) -> Result<FlowRequest, ScanError> {
    Ok(match request {
        FlowRequest::Classify(inner) => {
            FlowRequest::Classify(ClassifyRequest::validate(&inner.to_value())?)
        }
        FlowRequest::ClassifyContinuous(inner) => {
            FlowRequest::ClassifyContinuous(ClassifyRequest::validate(&inner.to_value())?)
        }
        FlowRequest::Summarize(inner) => {
            FlowRequest::Summarize(SummaryRequest::validate(&inner.to_value())?)
        }
    })
}

fn decode(flow: Flow, payload: &Map<String, Value>) -> Result<FlowResponse, ScanError> {
    Ok(match flow {
        Flow::Classify => FlowResponse::Classification(ClassificationResult::stamped(
            ClassificationOutput::validate(payload)?,
        )),
        Flow::ClassifyContinuous => {
            FlowResponse::Distribution(ProbabilityDistribution::validate(payload)?)
        }
        Flow::Summarize => FlowResponse::Summary(SummaryResult::validate(payload)?),
    })
}

fn mismatched(expected: Flow, response: &FlowResponse) -> ScanError {
    ScanError::invocation(format!(
        "{expected} produced a {} response",
        response.flow()
    ))
}
