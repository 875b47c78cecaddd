use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: String,
    pub capabilities: Vec<String>,
    pub context_window: Option<u64>,
}

impl ModelSpec {
    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Known models in preference order; the first capable model is the default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    pub fn ensure(&self, name: &str, capability: &str) -> Option<ModelSpec> {
        let model = self.get(name)?;
        if model.supports(capability) {
            return Some(model.clone());
        }
        None
    }

    /// Keeps only models whose provider passes `keep`, preserving order.
    pub fn retain_providers(&mut self, keep: impl Fn(&str) -> bool) {
        self.models.retain(|_, model| keep(&model.provider));
    }
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: &str, capabilities: &[&str], context: Option<u64>| {
        map.insert(
            name.to_string(),
            ModelSpec {
                name: name.to_string(),
                provider: provider.to_string(),
                capabilities: capabilities
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect(),
                context_window: context,
            },
        );
    };

    insert("gemini-2.0-flash", "gemini", &["vision", "text"], Some(1_048_576));
    insert("gemini-2.5-flash", "gemini", &["vision", "text"], Some(1_048_576));
    insert("gpt-4o-mini", "openai", &["vision", "text"], Some(128_000));
    insert("gpt-4.1-mini", "openai", &["vision", "text"], Some(1_047_576));
    insert("dryrun-vision-1", "dryrun", &["vision", "text"], Some(8192));
    insert("dryrun-text-1", "dryrun", &["text"], Some(8192));

    map
}
