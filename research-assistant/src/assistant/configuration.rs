use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use tracing::{info, warn};
use url::Url;

pub const MODEL_OPTIONS: [&str; 4] = ["gpt-4o-mini", "gpt-4o", "gpt-4-turbo", "gpt-3.5-turbo"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "ollama")]
    Ollama,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub serper_api_key: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub llm_provider: LlmProvider,
    pub ollama_model: String,
    pub openai_base_url: String,
    pub serper_base_url: String,
    pub bind_addr: SocketAddr,
}

fn default_openai_model() -> String {
    MODEL_OPTIONS[0].to_string()
}

fn default_ollama_model() -> String {
    "deepseek-r1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_serper_base_url() -> String {
    "https://google.serper.dev".to_string()
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            serper_api_key: String::new(),
            openai_api_key: String::new(),
            openai_model: default_openai_model(),
            llm_provider: LlmProvider::default(),
            ollama_model: default_ollama_model(),
            openai_base_url: default_openai_base_url(),
            serper_base_url: default_serper_base_url(),
            bind_addr: default_bind_addr(),
        }
    }
}

/// Values entered by the user that take precedence over the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialOverrides {
    #[serde(default)]
    pub serper_api_key: Option<String>,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub openai_model: Option<String>,
}

/// Research options offered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSettings {
    #[serde(default = "default_depth")]
    pub depth: u8,
    #[serde(default = "default_true")]
    pub include_visualizations: bool,
    #[serde(default = "default_true")]
    pub include_citations: bool,
}

pub const MIN_DEPTH: u8 = 1;
pub const MAX_DEPTH: u8 = 5;

fn default_depth() -> u8 {
    3
}

fn default_true() -> bool {
    true
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            include_visualizations: true,
            include_citations: true,
        }
    }
}

impl ResearchSettings {
    pub fn clamped(self) -> Self {
        Self {
            depth: self.depth.clamp(MIN_DEPTH, MAX_DEPTH),
            ..self
        }
    }
}

const ENV_VARS: [&str; 7] = [
    "SERPER_API_KEY",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
    "LLM_PROVIDER",
    "OLLAMA_MODEL",
    "OPENAI_BASE_URL",
    "SERPER_BASE_URL",
];

impl Configuration {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup. Missing credentials are
    /// left empty since the UI may still supply them.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Loading configuration...");
        for var in ENV_VARS {
            match lookup(var) {
                Some(value) if var.contains("KEY") => {
                    info!(var, value = %mask(&value), "found env var")
                }
                Some(value) => info!(var, %value, "found env var"),
                None => warn!(var, "env var not set"),
            }
        }

        let llm_provider = match lookup("LLM_PROVIDER").as_deref() {
            None | Some("") | Some("openai") => LlmProvider::OpenAi,
            Some("ollama") => LlmProvider::Ollama,
            Some(other) => anyhow::bail!("LLM_PROVIDER must be 'openai' or 'ollama', got '{other}'"),
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(addr) => addr
                .parse()
                .with_context(|| format!("BIND_ADDR '{addr}' is not a socket address"))?,
            None => default_bind_addr(),
        };

        let config = Configuration {
            serper_api_key: lookup("SERPER_API_KEY").unwrap_or_default(),
            openai_api_key: lookup("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: lookup("OPENAI_MODEL")
                .filter(|m| !m.is_empty())
                .unwrap_or_else(default_openai_model),
            llm_provider,
            ollama_model: lookup("OLLAMA_MODEL").unwrap_or_else(default_ollama_model),
            openai_base_url: lookup("OPENAI_BASE_URL").unwrap_or_else(default_openai_base_url),
            serper_base_url: lookup("SERPER_BASE_URL").unwrap_or_else(default_serper_base_url),
            bind_addr,
        };
        config.validate_urls()?;
        Ok(config)
    }

    fn validate_urls(&self) -> Result<()> {
        Url::parse(&self.openai_base_url)
            .with_context(|| format!("OPENAI_BASE_URL '{}' is not a valid URL", self.openai_base_url))?;
        Url::parse(&self.serper_base_url)
            .with_context(|| format!("SERPER_BASE_URL '{}' is not a valid URL", self.serper_base_url))?;
        Ok(())
    }

    /// A copy with every non-empty override applied.
    pub fn with_overrides(&self, overrides: &CredentialOverrides) -> Self {
        let pick = |over: &Option<String>, current: &String| {
            over.as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| current.clone())
        };
        Configuration {
            serper_api_key: pick(&overrides.serper_api_key, &self.serper_api_key),
            openai_api_key: pick(&overrides.openai_api_key, &self.openai_api_key),
            openai_model: pick(&overrides.openai_model, &self.openai_model),
            ..self.clone()
        }
    }

    /// Names of the inputs that still block a run, in form order.
    pub fn missing_inputs(&self, topic: &str) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if topic.trim().is_empty() {
            missing.push("topic");
        }
        if self.serper_api_key.is_empty() {
            missing.push("Serper API key");
        }
        if self.llm_provider == LlmProvider::OpenAi && self.openai_api_key.is_empty() {
            missing.push("OpenAI API key");
        }
        missing
    }

    /// Position of the configured model in [`MODEL_OPTIONS`], falling back to the first.
    pub fn selected_model_index(&self) -> usize {
        MODEL_OPTIONS
            .iter()
            .position(|m| *m == self.openai_model)
            .unwrap_or(0)
    }

    pub fn active_model(&self) -> &str {
        match self.llm_provider {
            LlmProvider::OpenAi => &self.openai_model,
            LlmProvider::Ollama => &self.ollama_model,
        }
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "***"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = Configuration::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert_eq!(config.llm_provider, LlmProvider::OpenAi);
        assert!(config.serper_api_key.is_empty());
        assert_eq!(config.bind_addr.port(), 3000);
    }

    #[test]
    fn reads_credentials_and_provider() {
        let config = Configuration::from_lookup(lookup_from(&[
            ("SERPER_API_KEY", "s-key"),
            ("OPENAI_API_KEY", "o-key"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("LLM_PROVIDER", "ollama"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]))
        .unwrap();
        assert_eq!(config.serper_api_key, "s-key");
        assert_eq!(config.openai_api_key, "o-key");
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.llm_provider, LlmProvider::Ollama);
        assert_eq!(config.active_model(), "deepseek-r1:8b");
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn rejects_unknown_provider_and_bad_urls() {
        assert!(Configuration::from_lookup(lookup_from(&[("LLM_PROVIDER", "groq")])).is_err());
        assert!(Configuration::from_lookup(lookup_from(&[("OPENAI_BASE_URL", "not a url")])).is_err());
    }

    #[test]
    fn overrides_replace_only_non_empty_values() {
        let base = Configuration {
            serper_api_key: "env-serper".into(),
            openai_api_key: "env-openai".into(),
            ..Default::default()
        };
        let merged = base.with_overrides(&CredentialOverrides {
            serper_api_key: Some("typed".into()),
            openai_api_key: Some("  ".into()),
            openai_model: Some("gpt-4-turbo".into()),
        });
        assert_eq!(merged.serper_api_key, "typed");
        assert_eq!(merged.openai_api_key, "env-openai");
        assert_eq!(merged.openai_model, "gpt-4-turbo");
        assert_eq!(base.serper_api_key, "env-serper");
    }

    #[test]
    fn start_is_gated_on_topic_and_keys() {
        let mut config = Configuration::default();
        assert_eq!(
            config.missing_inputs(""),
            vec!["topic", "Serper API key", "OpenAI API key"]
        );
        config.serper_api_key = "s".into();
        config.llm_provider = LlmProvider::Ollama;
        assert!(config.missing_inputs("AI in healthcare").is_empty());
    }

    #[test]
    fn unknown_model_selects_first_option() {
        let mut config = Configuration::default();
        config.openai_model = "gpt-4-turbo".into();
        assert_eq!(config.selected_model_index(), 2);
        config.openai_model = "o1-preview".into();
        assert_eq!(config.selected_model_index(), 0);
    }

    #[test]
    fn settings_clamp_depth() {
        let settings = ResearchSettings {
            depth: 9,
            ..Default::default()
        };
        assert_eq!(settings.clamped().depth, MAX_DEPTH);
        let settings: ResearchSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, ResearchSettings::default());
    }
}
