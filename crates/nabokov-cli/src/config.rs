//! Settings from `~/.nabokov/config.json`, overridden by the environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3100;

/// Serialized settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred provider key. Ignored with a warning if not registered.
    pub provider: Option<String>,
    /// Prefer the claude provider over codex.
    pub use_claude: bool,
    pub port: u16,
    pub codex: CodexSettings,
    pub claude: ClaudeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            use_claude: false,
            port: DEFAULT_PORT,
            codex: CodexSettings::default(),
            claude: ClaudeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodexSettings {
    /// Command line used to launch codex, e.g. `npx codex`.
    pub bin: Option<String>,
    pub model: Option<String>,
    pub profile: Option<String>,
    pub timeout_secs: Option<u64>,
    pub require_terminal_event: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeSettings {
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl CodexSettings {
    /// Program and leading arguments from `bin`.
    pub fn command(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.bin.as_deref()?.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

impl Config {
    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from `lookup`. Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get("LLM_PROVIDER") {
            self.provider = Some(provider.to_lowercase());
        }
        if let Some(flag) = get("USE_CLAUDE") {
            self.use_claude = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid PORT"),
            }
        }
        if let Some(bin) = get("CODEX_BIN") {
            self.codex.bin = Some(bin);
        }
        if let Some(model) = get("CODEX_MODEL") {
            self.codex.model = Some(model);
        }
        if let Some(profile) = get("CODEX_PROFILE") {
            self.codex.profile = Some(profile);
        }
        if let Some(secs) = get("CODEX_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(secs) => self.codex.timeout_secs = Some(secs),
                Err(_) => tracing::warn!(value = %secs, "ignoring invalid CODEX_TIMEOUT_SECS"),
            }
        }
        if let Some(flag) = get("CODEX_REQUIRE_TERMINAL_EVENT") {
            self.codex.require_terminal_event = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(model) = get("CLAUDE_MODEL") {
            self.claude.model = Some(model);
        }
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.claude.api_key = Some(key);
        }
        if let Some(url) = get("ANTHROPIC_BASE_URL") {
            self.claude.base_url = Some(url);
        }
    }
}

/// Location of the settings file.
pub struct ConfigStore {
    path: PathBuf,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".nabokov");
        path.push("config.json");
        Self::with_path(path)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved config, or fall back to defaults.
    pub fn load(&self) -> Config {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(_) => return Config::default(),
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config");
                Config::default()
            }
        }
    }
}
