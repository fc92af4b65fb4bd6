//! Agent subsystem (C3-C4, C13-C15, C22 addition): provider contract and
//! backends, reliability wrapping, provider factory and health tracking,
//! system prompt assembly, and the agent engine's tool loop.

pub mod anthropic;
pub mod context_builder;
pub mod engine;
pub mod health;
pub mod openai;
pub mod parsing;
pub mod provider;
pub mod registry;
pub mod reliable;
pub mod stream_parser;

pub use context_builder::ContextBuilder;
pub use engine::{AgentEngine, AgentOptions, AgentResponse, StreamCallbacks};
pub use health::{HealthTracker, ProviderHealthEntry, ProviderStatus};
pub use provider::{OnChunk, Provider, ProviderError, StreamChunk};
pub use registry::{create_provider, create_reliable_provider, normalize_provider_id, KnownProvider, Route, KNOWN_PROVIDERS};
pub use reliable::ReliableProvider;
pub use stream_parser::{DetectedToolCall, StreamToolParser};
