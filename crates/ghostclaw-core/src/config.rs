use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HTTP_PORT: u16 = 8787;
pub const DEFAULT_WS_PORT: u16 = 8788;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_BODY_BYTES: usize = 64 * 1024;
pub const MAX_WS_FRAME_BYTES: usize = 1024 * 1024;

/// Top-level GhostClaw configuration — `~/.ghostclaw/config.yaml` plus
/// `GHOSTCLAW_*` environment overrides (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default)]
    pub reliability: ReliabilityConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            autonomy: AutonomyConfig::default(),
            reliability: ReliabilityConfig::default(),
            observability: ObservabilityConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// `"sqlite"` (default) or `"markdown"` (§4.7 / SPEC_FULL §4.7).
    #[serde(default = "default_memory_backend")]
    pub backend: String,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default = "default_embedder")]
    pub embedder: String,
    #[serde(default = "default_embedding_cache_size")]
    pub embedding_cache_size: usize,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,
    #[serde(default)]
    pub auto_save: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            workspace_dir: default_workspace_dir(),
            embedder: default_embedder(),
            embedding_cache_size: default_embedding_cache_size(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            recency_weight: default_recency_weight(),
            recency_half_life_days: default_recency_half_life_days(),
            auto_save: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub allow_public_bind: bool,
    #[serde(default = "bool_true")]
    pub require_pairing: bool,
    #[serde(default)]
    pub paired_tokens: Vec<String>,
    #[serde(default)]
    pub require_authorization: bool,
    #[serde(default = "bool_true")]
    pub session_send_policy_enabled: bool,
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    pub whatsapp_verify_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            ws_port: default_ws_port(),
            bind: default_bind(),
            allow_public_bind: false,
            require_pairing: true,
            paired_tokens: Vec::new(),
            require_authorization: false,
            session_send_policy_enabled: true,
            max_per_window: default_max_per_window(),
            window_seconds: default_window_seconds(),
            tls_cert_path: None,
            tls_key_path: None,
            whatsapp_verify_token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    ReadOnly,
    #[default]
    Supervised,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default)]
    pub level: AutonomyLevel,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default)]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,
    #[serde(default = "default_max_actions_per_hour")]
    pub max_actions_per_hour: u32,
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: AutonomyLevel::default(),
            workspace_dir: default_workspace_dir(),
            allowed_commands: Vec::new(),
            forbidden_paths: default_forbidden_paths(),
            max_actions_per_hour: default_max_actions_per_hour(),
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Provider ids tried in order after the primary fails (§4.2).
    #[serde(default)]
    pub fallback_providers: Vec<String>,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            fallback_providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub sandbox_enabled: bool,
    #[serde(default)]
    pub approval_required_for: Vec<String>,
}

fn bool_true() -> bool {
    true
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_memory_backend() -> String {
    "sqlite".to_string()
}
fn default_embedder() -> String {
    "local".to_string()
}
fn default_embedding_cache_size() -> usize {
    2000
}
fn default_vector_weight() -> f64 {
    0.6
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_recency_weight() -> f64 {
    0.1
}
fn default_recency_half_life_days() -> f64 {
    14.0
}
fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}
fn default_ws_port() -> u16 {
    DEFAULT_WS_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_max_per_window() -> u32 {
    20
}
fn default_window_seconds() -> u64 {
    60
}
fn default_max_actions_per_hour() -> u32 {
    120
}
fn default_max_tool_iterations() -> u32 {
    10
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    500
}
fn default_forbidden_paths() -> Vec<String> {
    vec!["/etc".to_string(), "~/.ssh".to_string()]
}

pub fn ghostclaw_root() -> std::path::PathBuf {
    if let Ok(root) = std::env::var("GHOSTCLAW_ROOT") {
        return std::path::PathBuf::from(root);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    std::path::PathBuf::from(home).join(".ghostclaw")
}

fn default_workspace_dir() -> String {
    ghostclaw_root().join("workspace").to_string_lossy().into_owned()
}

fn default_config_path() -> std::path::PathBuf {
    ghostclaw_root().join("config.yaml")
}

impl Config {
    /// Load config: built-in defaults → `~/.ghostclaw/config.yaml` (if
    /// present) → `GHOSTCLAW_*` environment overrides (nested keys split on
    /// `__`, e.g. `GHOSTCLAW_GATEWAY__HTTP_PORT`).
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(std::path::PathBuf::from)
            .unwrap_or_else(default_config_path);

        let figment = Figment::from(figment::providers::Serialized::defaults(Config::default()))
            .merge(Yaml::file(&path))
            .merge(Env::prefixed("GHOSTCLAW_").split("__"));

        figment
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = Config::default();
        assert_eq!(cfg.default_provider, "openai");
        assert_eq!(cfg.gateway.http_port, DEFAULT_HTTP_PORT);
        assert!(cfg.gateway.require_pairing);
    }

    #[test]
    fn loads_from_nonexistent_path_using_defaults() {
        let cfg = Config::load(Some("/nonexistent/ghostclaw-config-test.yaml")).unwrap();
        assert_eq!(cfg.default_model, "gpt-4o-mini");
    }
}
