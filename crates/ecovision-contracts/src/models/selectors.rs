use super::registry::{ModelRegistry, ModelSpec};
use crate::error::ScanError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: ModelSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    pub registry: ModelRegistry,
}

impl ModelSelector {
    pub fn new(registry: Option<ModelRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_else(|| ModelRegistry::new(None)),
        }
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        capability: &str,
    ) -> Result<ModelSelection, ScanError> {
        let (fallback_reason, requested_text) = match requested {
            Some(requested_value) => {
                if let Some(model) = self.registry.ensure(requested_value, capability) {
                    return Ok(ModelSelection {
                        model,
                        requested: Some(requested_value.to_string()),
                        fallback_reason: None,
                    });
                }
                (
                    Some(format!(
                        "Requested model '{requested_value}' unavailable for capability '{capability}'."
                    )),
                    Some(requested_value.to_string()),
                )
            }
            None => (Some("No model specified; using default.".to_string()), None),
        };

        let Some(model) = self.registry.by_capability(capability).into_iter().next() else {
            return Err(ScanError::invocation(format!(
                "No models available for capability '{capability}'."
            )));
        };
        Ok(ModelSelection {
            model,
            requested: requested_text,
            fallback_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::ModelSelector;
    use crate::error::ScanError;
    use crate::models::{ModelRegistry, ModelSpec};

    fn model(name: &str, capabilities: &[&str]) -> ModelSpec {
        ModelSpec {
            name: name.to_string(),
            provider: "dryrun".to_string(),
            capabilities: capabilities.iter().map(|cap| (*cap).to_string()).collect(),
            context_window: None,
        }
    }

    fn registry(models: Vec<ModelSpec>) -> ModelRegistry {
        let mut map = IndexMap::new();
        for spec in models {
            map.insert(spec.name.clone(), spec);
        }
        ModelRegistry::new(Some(map))
    }

    #[test]
    fn requested_model_wins_when_capable() -> anyhow::Result<()> {
        let selection = ModelSelector::new(Some(registry(vec![
            model("first", &["vision"]),
            model("second", &["vision"]),
        ])))
        .select(Some("second"), "vision")?;
        assert_eq!(selection.model.name, "second");
        assert_eq!(selection.fallback_reason, None);
        Ok(())
    }

    #[test]
    fn falls_back_when_requested_model_lacks_capability() -> anyhow::Result<()> {
        let selection = ModelSelector::new(Some(registry(vec![
            model("writer", &["text"]),
            model("viewer", &["vision"]),
        ])))
        .select(Some("writer"), "vision")?;
        assert_eq!(selection.model.name, "viewer");
        assert_eq!(selection.requested.as_deref(), Some("writer"));
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Requested model 'writer' unavailable for capability 'vision'.")
        );
        Ok(())
    }

    #[test]
    fn no_request_uses_default_with_explanation() -> anyhow::Result<()> {
        let selection =
            ModelSelector::new(Some(registry(vec![model("viewer", &["vision"])]))).select(None, "vision")?;
        assert_eq!(selection.model.name, "viewer");
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("No model specified; using default.")
        );
        Ok(())
    }

    #[test]
    fn errors_when_no_model_has_capability() {
        let err = ModelSelector::new(Some(registry(vec![model("writer", &["text"])])))
            .select(Some("writer"), "vision")
            .err();
        assert_eq!(
            err,
            Some(ScanError::ModelInvocation(
                "No models available for capability 'vision'.".to_string()
            ))
        );
    }
}
