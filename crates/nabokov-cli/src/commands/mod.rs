//! Command implementations.

pub mod exec;
pub mod generate;
pub mod providers;
pub mod serve;

use crate::config::Config;
use nabokov_provider::providers::agent_sdk::AgentSdkProvider;
use nabokov_provider::providers::anthropic::AnthropicSdk;
use nabokov_provider::providers::codex::{CodexConfig, CodexProvider};
use nabokov_provider::providers::mock::MockProvider;
use nabokov_provider::{GenerationService, ProviderRegistry, ProviderSelection};
use std::sync::Arc;

/// Register every built-in provider, configured from `config`.
pub fn build_registry(config: &Config) -> ProviderRegistry {
    let mut codex = CodexConfig {
        model: config.codex.model.clone(),
        profile: config.codex.profile.clone(),
        timeout: config.codex.timeout(),
        require_terminal_event: config.codex.require_terminal_event,
        ..Default::default()
    };
    if let Some((program, args)) = config.codex.command() {
        codex.program = program;
        codex.program_args = args;
    }

    let mut sdk = AnthropicSdk::new(config.claude.api_key.clone());
    if let Some(url) = &config.claude.base_url {
        sdk = sdk.with_base_url(url.clone());
    }
    let mut claude = AgentSdkProvider::new(Arc::new(sdk));
    if let Some(model) = &config.claude.model {
        claude = claude.with_default_model(model.clone());
    }

    let mut registry = ProviderRegistry::new();
    registry.register("codex", Arc::new(CodexProvider::new(codex)));
    registry.register("claude", Arc::new(claude));
    registry.register("mock", Arc::new(MockProvider::echo()));
    registry
}

/// Build the service, resolving the active provider once.
pub fn build_service(config: &Config, explicit: Option<&str>) -> anyhow::Result<GenerationService> {
    let selection = ProviderSelection {
        explicit: explicit.map(str::to_string),
        configured: config.provider.clone(),
        use_alternate: config.use_claude,
        ..Default::default()
    };
    let service = GenerationService::new(build_registry(config), &selection)?;
    Ok(service)
}
