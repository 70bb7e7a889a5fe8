use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the analyst bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub chat_llm: ChatLlmConfig,
    pub analyst: AnalystConfig,
    pub dispatch: DispatchConfig,
    pub redis: RedisConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLlmConfig {
    /// Text-generation endpoint of the chat backend.
    pub base_url: String,
    /// Name of the environment variable holding the API key. Read once, when
    /// the client is first built.
    pub api_key_env: String,
    pub chat_model: String,
    pub validation_model: String,
    pub chat_max_tokens: u32,
    pub complete_max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Running inside the hosting platform: forward requests through the
    /// platform gateway instead of calling the session host directly.
    pub hosted: bool,
    /// Scheme placed before `Token="..."` in the Authorization header.
    pub auth_scheme: String,
    /// Replaces `https://{host}` for direct calls when set.
    #[serde(default)]
    pub base_url: Option<String>,
    pub platform_gateway_url: String,
    pub platform_timeout_ms: u64,
    /// Timeout for direct calls to the session host.
    pub request_timeout_seconds: u64,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    ChatLlm,
    Analyst,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chat_llm" | "chat-llm" | "llm" | "qwen" => Ok(BackendKind::ChatLlm),
            "analyst" | "cortex" => Ok(BackendKind::Analyst),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::ChatLlm => write!(f, "chat_llm"),
            BackendKind::Analyst => write!(f, "analyst"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStore {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub backend: BackendKind,
    pub cache_ttl_seconds: u64,
    pub cache_store: CacheStore,
    /// Language the assistant is told to answer in.
    pub response_language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub key_prefix: String,
    pub pool_size: usize,
    pub timeout_seconds: u64,
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::debug!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("BRIDGE_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::from_yaml(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(bind) = lookup("BRIDGE_HTTP_BIND") {
            self.server.bind = bind;
        }
        if let Some(token) = lookup("BRIDGE_BEARER_TOKEN") {
            self.server.bearer_token = Some(token);
        }

        // Chat backend overrides
        if let Some(url) = lookup("CHAT_LLM_BASE_URL") {
            self.chat_llm.base_url = url;
        }
        if let Some(model) = lookup("CHAT_LLM_MODEL") {
            self.chat_llm.chat_model = model;
        }
        if let Some(model) = lookup("CHAT_LLM_VALIDATION_MODEL") {
            self.chat_llm.validation_model = model;
        }

        // Analyst overrides
        if let Some(hosted) = lookup("ANALYST_HOSTED") {
            self.analyst.hosted = matches!(hosted.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = lookup("ANALYST_BASE_URL") {
            self.analyst.base_url = Some(url);
        }
        if let Some(url) = lookup("ANALYST_PLATFORM_GATEWAY_URL") {
            self.analyst.platform_gateway_url = url;
        }

        // Dispatch overrides
        if let Some(backend) = lookup("BRIDGE_BACKEND") {
            match backend.parse::<BackendKind>() {
                Ok(kind) => self.dispatch.backend = kind,
                Err(e) => tracing::warn!("Ignoring BRIDGE_BACKEND: {}", e),
            }
        }
        if let Some(ttl) = lookup("BRIDGE_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse() {
                self.dispatch.cache_ttl_seconds = ttl;
            }
        }
        if let Some(store) = lookup("BRIDGE_CACHE_STORE") {
            match store.to_lowercase().as_str() {
                "memory" => self.dispatch.cache_store = CacheStore::Memory,
                "redis" => self.dispatch.cache_store = CacheStore::Redis,
                other => tracing::warn!("Unknown BRIDGE_CACHE_STORE '{}', keeping current", other),
            }
        }
        if let Some(language) = lookup("BRIDGE_RESPONSE_LANGUAGE") {
            self.dispatch.response_language = language;
        }

        // Redis overrides
        if let Some(url) = lookup("REDIS_URL") {
            self.redis.url = url;
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.dispatch.cache_ttl_seconds == 0 {
            return Err("dispatch.cache_ttl_seconds cannot be 0".into());
        }
        if !(0.0..=2.0).contains(&self.chat_llm.temperature) {
            return Err("chat_llm.temperature must be between 0.0 and 2.0".into());
        }
        if !(0.0..=1.0).contains(&self.chat_llm.top_p) {
            return Err("chat_llm.top_p must be between 0.0 and 1.0".into());
        }
        if self.chat_llm.api_key_env.is_empty() {
            return Err("chat_llm.api_key_env cannot be empty".into());
        }
        if self.dispatch.cache_store == CacheStore::Redis && self.redis.pool_size == 0 {
            return Err("redis.pool_size cannot be 0".into());
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dispatch.cache_ttl_seconds)
    }

    /// Model identifier sent to the given backend for conversations.
    pub fn chat_model_for(&self, kind: BackendKind) -> &str {
        match kind {
            BackendKind::ChatLlm => &self.chat_llm.chat_model,
            BackendKind::Analyst => &self.analyst.model,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8788".to_string(),
                bearer_token: None,
            },
            chat_llm: ChatLlmConfig {
                base_url: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation"
                    .to_string(),
                api_key_env: "DASHSCOPE_API_KEY".to_string(),
                chat_model: "qwen-plus".to_string(),
                validation_model: "qwen-plus".to_string(),
                chat_max_tokens: 4000,
                complete_max_tokens: 2000,
                temperature: 0.1,
                top_p: 0.9,
                request_timeout_seconds: 120,
            },
            analyst: AnalystConfig {
                hosted: false,
                auth_scheme: "Snowflake".to_string(),
                base_url: None,
                platform_gateway_url: "http://127.0.0.1:8790".to_string(),
                platform_timeout_ms: 30000,
                request_timeout_seconds: 30,
                model: "analyst".to_string(),
            },
            dispatch: DispatchConfig {
                backend: BackendKind::ChatLlm,
                cache_ttl_seconds: 60,
                cache_store: CacheStore::Memory,
                response_language: "Chinese".to_string(),
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379/0".to_string(),
                key_prefix: "analyst-bridge:reply".to_string(),
                pool_size: 8,
                timeout_seconds: 5,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_backend_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.dispatch.cache_ttl_seconds, 60);
        assert_eq!(cfg.analyst.platform_timeout_ms, 30000);
        assert_eq!(cfg.analyst.request_timeout_seconds, 30);
        assert_eq!(cfg.chat_llm.chat_max_tokens, 4000);
        assert!((cfg.chat_llm.temperature - 0.1).abs() < 1e-6);
        assert!((cfg.chat_llm.top_p - 0.9).abs() < 1e-6);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn overrides_select_backend_and_mode() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BRIDGE_BACKEND", "analyst"),
            ("ANALYST_HOSTED", "true"),
            ("BRIDGE_CACHE_TTL_SECONDS", "5"),
            ("BRIDGE_CACHE_STORE", "redis"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.dispatch.backend, BackendKind::Analyst);
        assert!(cfg.analyst.hosted);
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(5));
        assert_eq!(cfg.dispatch.cache_store, CacheStore::Redis);
    }

    #[test]
    fn unknown_backend_override_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| (k == "BRIDGE_BACKEND").then(|| "mystery".to_string()));
        assert_eq!(cfg.dispatch.backend, BackendKind::ChatLlm);
    }

    #[test]
    fn parses_yaml_file_contents() {
        let mut value = serde_yaml::to_value(Config::default()).unwrap();
        value["dispatch"]["backend"] = serde_yaml::Value::String("analyst".to_string());
        let yaml = serde_yaml::to_string(&value).unwrap();
        let cfg = Config::from_yaml(&yaml).expect("round-tripped yaml should parse");
        assert_eq!(cfg.dispatch.backend, BackendKind::Analyst);
        assert_eq!(cfg.chat_model_for(BackendKind::ChatLlm), "qwen-plus");
    }
}
