//! Provider implementations.

pub mod agent_sdk;
pub mod anthropic;
pub mod codex;
pub mod mock;
