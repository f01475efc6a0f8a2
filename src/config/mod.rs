//! Configuration system (layered: code > env).

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<MaestroConfig> = OnceLock::new();

/// Layered configuration for Maestro.
///
/// API keys and base URLs are resolved per provider name. Explicit values
/// set in code win over values loaded from the environment.
#[derive(Clone, Default)]
pub struct MaestroConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
}

impl fmt::Debug for MaestroConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaestroConfig")
            .field("base_urls", &self.base_urls)
            .field("api_keys", &"..")
            .finish()
    }
}

impl MaestroConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables (OPENAI_API_KEY, ANTHROPIC_API_KEY, etc.).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let config = Self::new();

        let env_mappings = [
            ("OPENAI_API_KEY", "openai"),
            ("ANTHROPIC_API_KEY", "anthropic"),
        ];
        for (env_var, provider) in &env_mappings {
            if let Ok(key) = std::env::var(env_var) {
                config.set_api_key(provider, key);
            }
        }

        let url_mappings = [
            ("OPENAI_BASE_URL", "openai"),
            ("ANTHROPIC_BASE_URL", "anthropic"),
        ];
        for (env_var, provider) in &url_mappings {
            if let Ok(url) = std::env::var(env_var) {
                config.set_base_url(provider, url);
            }
        }

        config
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static MaestroConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap()
            .insert(provider.to_string(), key);
    }

    /// Resolve an API key for a provider.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys.read().ok()?.get(provider).cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap()
            .insert(provider.to_string(), url);
    }

    /// Resolve a base URL override for a provider.
    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls.read().ok()?.get(provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_resolves() {
        let config = MaestroConfig::new();
        config.set_api_key("openai", "sk-test".into());
        assert_eq!(config.get_api_key("openai").as_deref(), Some("sk-test"));
        assert_eq!(config.get_api_key("anthropic"), None);
    }

    #[test]
    fn base_url_override() {
        let config = MaestroConfig::new();
        config.set_base_url("anthropic", "http://localhost:9999".into());
        assert_eq!(
            config.get_base_url("anthropic").as_deref(),
            Some("http://localhost:9999")
        );
    }
}
