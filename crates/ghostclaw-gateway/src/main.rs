use std::sync::Arc;

use ghostclaw_agent::{create_reliable_provider, AgentEngine};
use ghostclaw_core::config::Config;
use ghostclaw_memory::embedder::{LocalHashEmbedder, NoopEmbedder, OpenAiEmbedder};
use ghostclaw_memory::markdown_store::MarkdownMemory;
use ghostclaw_memory::sqlite_store::SqliteMemory;
use ghostclaw_memory::{Embedder, Memory};
use ghostclaw_protocol::PairingState;
use ghostclaw_security::{ApprovalManager, AutoApprove, ToolExecutor, ToolRegistry};
use ghostclaw_sessions::{SessionSendPolicy, SessionStore};
use tracing::{info, warn};

use ghostclaw_gateway::http;
use ghostclaw_gateway::observability::{self, ComponentStatus, TracingObserver};
use ghostclaw_gateway::session_lane::SessionLanes;
use ghostclaw_gateway::state::GatewayState;
use ghostclaw_gateway::ws;
use ghostclaw_gateway::ws::hub::WsHub;

const DEFAULT_MAX_WS_CLIENTS: usize = 256;

fn build_embedder(config: &Config) -> Arc<dyn Embedder> {
    match config.memory.embedder.as_str() {
        "openai" => {
            let http = ghostclaw_core::http::HttpClient::default();
            Arc::new(OpenAiEmbedder::new(config.api_key.clone().unwrap_or_default(), "text-embedding-3-small", 1536, http))
        }
        "noop" => Arc::new(NoopEmbedder::new(256)),
        _ => Arc::new(LocalHashEmbedder),
    }
}

fn build_memory(config: &Config) -> anyhow::Result<Arc<dyn Memory>> {
    match config.memory.backend.as_str() {
        "markdown" => Ok(Arc::new(MarkdownMemory::new(&config.memory.workspace_dir)?)),
        _ => {
            let embedder = build_embedder(config);
            let db_path = std::path::Path::new(&config.memory.workspace_dir).join("memory.sqlite3");
            Ok(Arc::new(SqliteMemory::open(
                db_path,
                embedder,
                config.memory.vector_weight,
                config.memory.keyword_weight,
                config.memory.embedding_cache_size,
            )?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("GHOSTCLAW_CONFIG").ok();
    let (config, config_load_error) = match Config::load(config_path.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e.to_string())),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ghostclaw_gateway=info".into());
    if config.observability.log_json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
    observability::set_observer(Box::new(TracingObserver));

    if let Some(e) = config_load_error {
        warn!(error = %e, "config load failed, using defaults");
    }

    let provider = create_reliable_provider(
        &config.default_provider,
        config.api_key.as_deref(),
        &config.reliability.fallback_providers,
        config.reliability.max_retries,
        config.reliability.backoff_ms,
    )
    .map_err(|e| anyhow::anyhow!("failed to construct provider: {e}"))?;

    let memory = build_memory(&config)?;

    let tool_registry = Arc::new(ToolRegistry::new());
    let approval = Arc::new(ApprovalManager::new(Box::new(AutoApprove)));
    let executor = Arc::new(ToolExecutor::new(tool_registry.clone(), None, Some(approval)));

    let engine = Arc::new(AgentEngine::new(
        Arc::new(provider),
        tool_registry,
        executor,
        Some(memory.clone()),
        config.memory.workspace_dir.clone(),
        config.default_model.clone(),
        config.default_temperature,
        config.memory.auto_save,
        config.tools.sandbox_enabled,
        "ghostclaw",
    ));

    let sessions = Arc::new(SessionStore::new(&config.memory.workspace_dir)?);

    let send_policy = config.gateway.session_send_policy_enabled.then(|| {
        Arc::new(SessionSendPolicy::new(
            config.gateway.max_per_window as f64,
            config.gateway.max_per_window as f64 / config.gateway.window_seconds.max(1) as f64,
        ))
    });

    let pairing = config
        .gateway
        .require_pairing
        .then(|| Arc::new(std::sync::Mutex::new(PairingState::new(5, &config.gateway.paired_tokens))));

    if let Some(pairing) = &pairing {
        let code = pairing.lock().expect("pairing lock poisoned").code().to_string();
        info!(pairing_code = %code, "gateway pairing code (use once to obtain a bearer token)");
    }

    let websocket_enabled = config.gateway.ws_port != 0;
    let state = Arc::new(GatewayState {
        config: config.clone(),
        engine,
        sessions,
        memory,
        send_policy,
        pairing,
        lanes: SessionLanes::new(),
        ws_hub: WsHub::new(DEFAULT_MAX_WS_CLIENTS),
        websocket_enabled,
    });

    observability::set_component_status("gateway", ComponentStatus::Ok);
    observability::set_component_status("websocket", if websocket_enabled { ComponentStatus::Ok } else { ComponentStatus::Disabled });

    if websocket_enabled {
        let ws_state = state.clone();
        let http_state = state.clone();
        tokio::try_join!(
            async { http::server::serve(http_state).await.map_err(anyhow::Error::from) },
            async { ws::server::serve(ws_state).await.map_err(anyhow::Error::from) },
        )?;
    } else {
        http::server::serve(state).await?;
    }

    Ok(())
}
