use std::env;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";

const DEFAULT_REQUEST_TIMEOUT_S: f64 = 45.0;
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_SCAN_COOLDOWN: Duration = Duration::from_secs(3);

/// Runtime settings, read from the environment and overridable by CLI flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: Option<String>,
    pub request_timeout: Duration,
    pub jpeg_quality: u8,
    pub scan_cooldown: Duration,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub openai_api_key: Option<String>,
    pub openai_api_base: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            scan_cooldown: DEFAULT_SCAN_COOLDOWN,
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            openai_api_key: None,
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| -> Option<String> {
            keys.iter().find_map(|key| {
                lookup(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };
        let defaults = Self::default();

        let request_timeout = first(&["ECOVISION_REQUEST_TIMEOUT_S"])
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| Duration::from_secs_f64(secs.clamp(1.0, 300.0)))
            .unwrap_or(defaults.request_timeout);
        let jpeg_quality = first(&["ECOVISION_JPEG_QUALITY"])
            .and_then(|raw| raw.parse::<u8>().ok())
            .map(|quality| quality.clamp(1, 100))
            .unwrap_or(defaults.jpeg_quality);

        Self {
            model: first(&["ECOVISION_MODEL"]),
            request_timeout,
            jpeg_quality,
            scan_cooldown: defaults.scan_cooldown,
            gemini_api_key: first(&["GEMINI_API_KEY", "GOOGLE_API_KEY"]),
            gemini_api_base: first(&["GEMINI_API_BASE"])
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_api_base),
            openai_api_key: first(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]),
            openai_api_base: first(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])
                .map(|base| normalize_openai_base(&base))
                .unwrap_or(defaults.openai_api_base),
        }
    }
}

fn normalize_openai_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{EngineConfig, DEFAULT_GEMINI_API_BASE};

    fn config(pairs: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.model, None);
        assert_eq!(cfg.jpeg_quality, 90);
        assert_eq!(cfg.scan_cooldown, Duration::from_secs(3));
        assert_eq!(cfg.gemini_api_base, DEFAULT_GEMINI_API_BASE);
        assert!(cfg.gemini_api_key.is_none());
    }

    #[test]
    fn reads_keys_with_fallback_names() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "  "),
            ("GOOGLE_API_KEY", "g-key"),
            ("OPENAI_BASE_URL", "https://proxy.example.com/"),
            ("ECOVISION_MODEL", "gpt-4o-mini"),
            ("ECOVISION_REQUEST_TIMEOUT_S", "12.5"),
            ("ECOVISION_JPEG_QUALITY", "250"),
        ]);
        assert_eq!(cfg.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(cfg.openai_api_base, "https://proxy.example.com/v1");
        assert_eq!(cfg.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(cfg.request_timeout, Duration::from_secs_f64(12.5));
        assert_eq!(cfg.jpeg_quality, 90);
    }
}
