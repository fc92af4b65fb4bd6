//! Built-in provider registry — maps well-known provider IDs to their API
//! endpoints and default models. Used by `build_provider()` in the gateway
//! to resolve provider configuration without requiring users to look up URLs.

/// A well-known LLM provider that is OpenAI-compatible.
pub struct KnownProvider {
    /// Short identifier used in config (e.g. "groq", "deepseek").
    pub id: &'static str,
    /// Human-readable display name.
    pub name: &'static str,
    /// Base URL without trailing slash (e.g. "https://api.groq.com/openai").
    pub base_url: &'static str,
    /// Path appended to base_url for chat completions.
    /// Almost always "/v1/chat/completions"; some providers omit the /v1.
    pub chat_path: &'static str,
    /// Recommended model for this provider.
    pub default_model: &'static str,
    /// True if the provider offers a meaningful free tier.
    pub free_tier: bool,
}

impl KnownProvider {
    /// Full chat completions endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }
}

pub const KNOWN_PROVIDERS: &[KnownProvider] = &[
    // ── Tier 1: Major commercial providers ───────────────────────────────────
    KnownProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai",
        chat_path: "/v1/chat/completions",
        default_model: "llama-3.3-70b-versatile",
        free_tier: true,
    },
    KnownProvider {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-chat",
        free_tier: false,
    },
    KnownProvider {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api",
        chat_path: "/v1/chat/completions",
        default_model: "openai/gpt-4o",
        free_tier: true,
    },
    KnownProvider {
        id: "xai",
        name: "xAI (Grok)",
        base_url: "https://api.x.ai",
        chat_path: "/v1/chat/completions",
        default_model: "grok-2-latest",
        free_tier: false,
    },
    KnownProvider {
        id: "mistral",
        name: "Mistral AI",
        base_url: "https://api.mistral.ai",
        chat_path: "/v1/chat/completions",
        default_model: "mistral-large-latest",
        free_tier: false,
    },
    KnownProvider {
        id: "perplexity",
        name: "Perplexity",
        base_url: "https://api.perplexity.ai",
        chat_path: "/chat/completions",
        default_model: "sonar-pro",
        free_tier: false,
    },
    KnownProvider {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz",
        chat_path: "/v1/chat/completions",
        default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
        free_tier: false,
    },
    KnownProvider {
        id: "fireworks",
        name: "Fireworks AI",
        base_url: "https://api.fireworks.ai/inference",
        chat_path: "/v1/chat/completions",
        default_model: "accounts/fireworks/models/llama-v3p3-70b-instruct",
        free_tier: false,
    },
    KnownProvider {
        id: "cerebras",
        name: "Cerebras",
        base_url: "https://api.cerebras.ai",
        chat_path: "/v1/chat/completions",
        default_model: "llama3.3-70b",
        free_tier: true,
    },
    KnownProvider {
        id: "sambanova",
        name: "SambaNova",
        base_url: "https://api.sambanova.ai",
        chat_path: "/v1/chat/completions",
        default_model: "Meta-Llama-3.1-405B-Instruct",
        free_tier: true,
    },
    KnownProvider {
        id: "hyperbolic",
        name: "Hyperbolic",
        base_url: "https://api.hyperbolic.xyz",
        chat_path: "/v1/chat/completions",
        default_model: "meta-llama/Llama-3.3-70B-Instruct",
        free_tier: false,
    },
    KnownProvider {
        id: "novita",
        name: "Novita AI",
        base_url: "https://api.novita.ai/v3/openai",
        chat_path: "/chat/completions",
        default_model: "meta-llama/llama-3.1-70b-instruct",
        free_tier: false,
    },
    KnownProvider {
        id: "lepton",
        name: "Lepton AI",
        base_url: "https://llm.lepton.ai/api",
        chat_path: "/v1/chat/completions",
        default_model: "llama3-3-70b",
        free_tier: true,
    },
    KnownProvider {
        id: "corethink",
        name: "CoreThink",
        base_url: "https://api.corethink.ai",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-r1",
        free_tier: false,
    },
    KnownProvider {
        id: "featherless",
        name: "Featherless AI",
        base_url: "https://api.featherless.ai",
        chat_path: "/v1/chat/completions",
        default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct",
        free_tier: false,
    },
    KnownProvider {
        id: "requesty",
        name: "Requesty",
        base_url: "https://router.requesty.ai",
        chat_path: "/v1/chat/completions",
        default_model: "openai/gpt-4o",
        free_tier: false,
    },
    KnownProvider {
        id: "glama",
        name: "Glama",
        base_url: "https://glama.ai/api",
        chat_path: "/v1/chat/completions",
        default_model: "openai/gpt-4o",
        free_tier: true,
    },
    KnownProvider {
        id: "chutes",
        name: "Chutes AI",
        base_url: "https://llm.chutes.ai",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-ai/DeepSeek-R1",
        free_tier: true,
    },
    KnownProvider {
        id: "cohere",
        name: "Cohere",
        base_url: "https://api.cohere.com/compatibility",
        chat_path: "/v1/chat/completions",
        default_model: "command-r-plus-08-2024",
        free_tier: true,
    },
    // ── Tier 2: China region providers ───────────────────────────────────────
    KnownProvider {
        id: "moonshot",
        name: "Moonshot AI (Kimi)",
        base_url: "https://api.moonshot.cn",
        chat_path: "/v1/chat/completions",
        default_model: "moonshot-v1-8k",
        free_tier: false,
    },
    KnownProvider {
        id: "glm",
        name: "GLM (Zhipu AI)",
        base_url: "https://open.bigmodel.cn/api/paas",
        chat_path: "/v4/chat/completions",
        default_model: "glm-4-flash",
        free_tier: true,
    },
    KnownProvider {
        id: "doubao",
        name: "Doubao (ByteDance)",
        base_url: "https://ark.cn-beijing.volces.com/api",
        chat_path: "/v3/chat/completions",
        default_model: "doubao-pro-4k",
        free_tier: false,
    },
    KnownProvider {
        id: "qwen",
        name: "Qwen (Alibaba)",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode",
        chat_path: "/v1/chat/completions",
        default_model: "qwen-turbo",
        free_tier: false,
    },
    KnownProvider {
        id: "zai",
        name: "Z.AI",
        base_url: "https://api.z.ai",
        chat_path: "/v1/chat/completions",
        default_model: "z1-preview",
        free_tier: false,
    },
    KnownProvider {
        id: "yi",
        name: "01.AI (Yi)",
        base_url: "https://api.01.ai",
        chat_path: "/v1/chat/completions",
        default_model: "yi-large",
        free_tier: false,
    },
    KnownProvider {
        id: "minimax",
        name: "MiniMax",
        base_url: "https://api.minimax.chat",
        chat_path: "/v1/text/chatcompletion_v2",
        default_model: "MiniMax-Text-01",
        free_tier: false,
    },
    KnownProvider {
        id: "hunyuan",
        name: "Hunyuan (Tencent)",
        base_url: "https://api.hunyuan.cloud.tencent.com",
        chat_path: "/v1/chat/completions",
        default_model: "hunyuan-turbo",
        free_tier: false,
    },
    KnownProvider {
        id: "stepfun",
        name: "StepFun",
        base_url: "https://api.stepfun.com",
        chat_path: "/v1/chat/completions",
        default_model: "step-1-8k",
        free_tier: false,
    },
    // ── Google AI (Gemini) — OpenAI-compatible endpoint ────────────────────────
    KnownProvider {
        id: "gemini",
        name: "Google AI (Gemini)",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        chat_path: "/chat/completions",
        default_model: "gemini-2.0-flash",
        free_tier: true,
    },
    // ── Tier 3: Local / self-hosted ───────────────────────────────────────────
    KnownProvider {
        id: "lmstudio",
        name: "LM Studio (local)",
        base_url: "http://localhost:1234",
        chat_path: "/v1/chat/completions",
        default_model: "local-model",
        free_tier: true,
    },
    KnownProvider {
        id: "llamacpp",
        name: "llama.cpp server (local)",
        base_url: "http://localhost:8080",
        chat_path: "/v1/chat/completions",
        default_model: "local-model",
        free_tier: true,
    },
    KnownProvider {
        id: "localai",
        name: "LocalAI (local)",
        base_url: "http://localhost:8080",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4",
        free_tier: true,
    },
    KnownProvider {
        id: "litellm",
        name: "LiteLLM proxy",
        base_url: "http://localhost:4000",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-3.5-turbo",
        free_tier: true,
    },
    // ── Gateway proxies ─────────────────────────────────────────────────────
    KnownProvider {
        id: "cloudflare-ai-gateway",
        name: "Cloudflare AI Gateway",
        base_url: "https://gateway.ai.cloudflare.com/v1/<account_id>/<gateway_id>/openai",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
        free_tier: false,
    },
];

/// Look up a known provider by its ID.
pub fn lookup(id: &str) -> Option<&'static KnownProvider> {
    KNOWN_PROVIDERS.iter().find(|p| p.id == id)
}

// ---------------------------------------------------------------------------
// Factory (C3): resolves a provider name + config into a running `Provider`.
// `KNOWN_PROVIDERS` above is informational only (display/`/health` surfaces);
// routing is controlled entirely by the `Route` table below.
// ---------------------------------------------------------------------------

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;
use crate::provider::Provider;
use crate::reliable::ReliableProvider;

/// Normalize known aliases to their canonical provider id.
pub fn normalize_provider_id(id: &str) -> String {
    match id.trim().to_lowercase().as_str() {
        "z.ai" | "z-ai" => "zai".to_string(),
        "opencode-zen" => "opencode".to_string(),
        "kimi-code" => "kimi-coding".to_string(),
        "cloudflare-ai" => "cloudflare-ai-gateway".to_string(),
        other => other.to_string(),
    }
}

/// How a route authenticates and is invoked.
pub enum Route {
    Compatible {
        base_url: &'static str,
        require_api_key: bool,
        extra_headers: &'static [(&'static str, &'static str)],
    },
    Anthropic {
        base_url: &'static str,
        use_bearer_auth: bool,
        extra_headers: &'static [(&'static str, &'static str)],
    },
}

fn builtin_route(id: &str) -> Option<Route> {
    match id {
        "openai" => Some(Route::Compatible {
            base_url: "https://api.openai.com",
            require_api_key: true,
            extra_headers: &[],
        }),
        "anthropic" => Some(Route::Anthropic {
            base_url: "https://api.anthropic.com",
            use_bearer_auth: false,
            extra_headers: &[],
        }),
        "ollama" => Some(Route::Compatible {
            base_url: "http://localhost:11434",
            require_api_key: false,
            extra_headers: &[],
        }),
        _ => lookup(id).map(|p| Route::Compatible {
            base_url: p.base_url,
            require_api_key: true,
            extra_headers: &[],
        }),
    }
}

fn env_api_key_vars(id: &str) -> Vec<String> {
    let upper = id.to_uppercase().replace('-', "_").replace('.', "_");
    if id == "anthropic" {
        vec!["ANTHROPIC_OAUTH_TOKEN".to_string(), "ANTHROPIC_API_KEY".to_string()]
    } else {
        vec![format!("{upper}_API_KEY")]
    }
}

fn resolve_api_key(id: &str, explicit: Option<&str>) -> Option<String> {
    if let Some(key) = explicit {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    for var in env_api_key_vars(id) {
        if let Ok(value) = std::env::var(&var) {
            if !value.trim().is_empty() {
                return Some(value);
            }
        }
    }
    if let Ok(value) = std::env::var("GHOSTCLAW_API_KEY") {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }
    None
}

fn resolve_base_url(id: &str, default: &str) -> String {
    let upper = id.to_uppercase().replace('-', "_").replace('.', "_");
    if let Ok(value) = std::env::var(format!("{upper}_BASE_URL")) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    if let Ok(value) = std::env::var(format!("GHOSTCLAW_{upper}_BASE_URL")) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    default.to_string()
}

/// Refuse a Cloudflare AI Gateway URL that still carries unfilled
/// `<account_id>`/`<gateway_id>` placeholders.
fn check_cloudflare_placeholders(base_url: &str) -> Result<(), String> {
    if base_url.contains("<account_id>") || base_url.contains("<gateway_id>") {
        return Err(format!(
            "base URL for cloudflare-ai-gateway still contains placeholder segments: {base_url}"
        ));
    }
    Ok(())
}

/// Build one provider from a name, optional explicit API key, and optional
/// base URL override. `name` may be `custom:https://...` to point an
/// OpenAI-compatible route at an arbitrary URL.
pub fn create_provider(name: &str, api_key: Option<&str>, base_url_override: Option<&str>) -> Result<Box<dyn Provider>, String> {
    if let Some(custom_url) = name.strip_prefix("custom:") {
        let key = resolve_api_key("custom", api_key);
        return Ok(Box::new(OpenAiProvider::new("custom", key, custom_url.to_string())));
    }

    let id = normalize_provider_id(name);
    let route = builtin_route(&id).ok_or_else(|| format!("unknown provider: {name}"))?;

    match route {
        Route::Compatible { base_url, require_api_key, extra_headers } => {
            let base_url = base_url_override.map(|s| s.to_string()).unwrap_or_else(|| resolve_base_url(&id, base_url));
            if id == "cloudflare-ai-gateway" {
                check_cloudflare_placeholders(&base_url)?;
            }
            let key = resolve_api_key(&id, api_key);
            if require_api_key && key.is_none() {
                return Err(format!("no API key found for provider '{id}'"));
            }
            let headers = extra_headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
            Ok(Box::new(OpenAiProvider::new(id, key, base_url).with_extra_headers(headers)))
        }
        Route::Anthropic { base_url, use_bearer_auth, extra_headers: _ } => {
            let base_url = base_url_override.map(|s| s.to_string()).unwrap_or_else(|| resolve_base_url(&id, base_url));
            let key = resolve_api_key(&id, api_key).ok_or_else(|| format!("no API key found for provider '{id}'"))?;
            Ok(Box::new(AnthropicProvider::new(key, Some(base_url)).with_bearer_auth(use_bearer_auth)))
        }
    }
}

/// Build the primary provider plus its configured fallbacks, wrapped in a
/// `ReliableProvider` (C4). Fallbacks that normalize to the same id as the
/// primary are skipped.
pub fn create_reliable_provider(
    primary_name: &str,
    api_key: Option<&str>,
    fallback_names: &[String],
    max_retries: u32,
    backoff_ms: u64,
) -> Result<ReliableProvider, String> {
    let primary = create_provider(primary_name, api_key, None)?;
    let primary_id = normalize_provider_id(primary_name);

    let mut fallbacks = Vec::new();
    for fb_name in fallback_names {
        if normalize_provider_id(fb_name) == primary_id {
            continue;
        }
        if let Ok(provider) = create_provider(fb_name, None, None) {
            fallbacks.push(provider);
        }
    }

    Ok(ReliableProvider::new(primary, fallbacks, max_retries, backoff_ms))
}

#[cfg(test)]
mod factory_tests {
    use super::*;

    #[test]
    fn normalizes_known_aliases() {
        assert_eq!(normalize_provider_id("z.ai"), "zai");
        assert_eq!(normalize_provider_id("opencode-zen"), "opencode");
        assert_eq!(normalize_provider_id("kimi-code"), "kimi-coding");
    }

    #[test]
    fn create_provider_fails_without_api_key() {
        std::env::remove_var("OPENAI_API_KEY");
        std::env::remove_var("GHOSTCLAW_API_KEY");
        let result = create_provider("openai", None, None);
        assert!(result.is_err());
    }

    #[test]
    fn create_provider_uses_explicit_api_key() {
        let result = create_provider("openai", Some("sk-test"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn cloudflare_gateway_with_placeholder_is_rejected() {
        let err = check_cloudflare_placeholders("https://gateway.ai.cloudflare.com/v1/<account_id>/<gateway_id>/openai").unwrap_err();
        assert!(err.contains("placeholder"));
    }

    #[test]
    fn custom_prefixed_name_builds_compatible_route() {
        let result = create_provider("custom:https://my-llm.internal", Some("k"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn create_reliable_provider_skips_duplicate_fallback() {
        let reliable = create_reliable_provider(
            "openai",
            Some("k"),
            &["openai".to_string(), "groq".to_string()],
            1,
            100,
        )
        .unwrap();
        assert_eq!(reliable.name(), "reliable");
    }
}
