mod dryrun;
mod gemini;
mod openai;

use std::collections::BTreeMap;
use std::time::Duration;

use ecovision_contracts::waste::Flow;
use ecovision_contracts::ScanError;
use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::prompts::RenderedPrompt;
use crate::reply::truncate_text;

pub use dryrun::DryrunProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Everything a provider needs for one model call.
#[derive(Debug, Clone)]
pub struct ModelInvocation {
    pub flow: Flow,
    pub model: String,
    pub prompt: RenderedPrompt,
    pub output_schema: Value,
    pub max_output_tokens: u64,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
}

pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, request: &ModelInvocation) -> Result<ModelReply, ScanError>;
}

#[derive(Default)]
pub struct ModelProviderRegistry {
    providers: BTreeMap<String, Box<dyn ModelProvider>>,
}

impl ModelProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ModelProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ModelProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ModelProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

/// Dryrun is always present; hosted providers only when their key is configured.
pub fn default_provider_registry(config: &EngineConfig) -> ModelProviderRegistry {
    let mut providers = ModelProviderRegistry::new();
    providers.register(DryrunProvider);
    if let Some(key) = config.gemini_api_key.as_deref() {
        providers.register(GeminiProvider::new(&config.gemini_api_base, key));
    }
    if let Some(key) = config.openai_api_key.as_deref() {
        providers.register(OpenAiProvider::new(&config.openai_api_base, key));
    }
    providers
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, ScanError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .map_err(|err| ScanError::invocation(format!("{provider} response body read failed: {err}")))?;
    if !status.is_success() {
        return Err(ScanError::invocation(format!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        )));
    }
    serde_json::from_str(&body).map_err(|err| {
        ScanError::invocation(format!("{provider} returned invalid JSON payload: {err}"))
    })
}

fn transport_error(provider: &str, endpoint: &str, err: reqwest::Error) -> ScanError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "could not connect"
    } else {
        "failed"
    };
    // The URL may carry credentials; the endpoint passed in never does.
    let err = err.without_url();
    ScanError::invocation(format!("{provider} request {kind} ({endpoint}): {err}"))
}

fn value_to_nonnegative_i64(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    if let Some(raw) = value.as_i64() {
        return (raw >= 0).then_some(raw);
    }
    value
        .as_f64()
        .filter(|raw| raw.is_finite() && *raw >= 0.0)
        .map(|raw| raw.round() as i64)
}
