//! Shell configuration loading from file and environment variables.

use bahncy_voice::ControllerConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Agent the shortcut and the bare `start` command talk to.
pub const DEFAULT_AGENT_ID: &str = "agent_4301k204f3fgfgmte77ezfxznqkz";

/// Top-level shell configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Remote agent settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Controller timeouts.
    #[serde(default)]
    pub session: ControllerConfig,

    /// Simulated platform settings.
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifier of the remote conversational agent.
    #[serde(default = "default_agent_id")]
    pub id: String,

    /// Open text-only conversations instead of voice.
    #[serde(default)]
    pub text_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,

    /// Length of one scripted agent turn.
    #[serde(default = "default_agent_turn_ms")]
    pub agent_turn_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "bahncy_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_agent_id() -> String {
    DEFAULT_AGENT_ID.to_string()
}

fn default_connect_delay_ms() -> u64 {
    1_000
}

fn default_agent_turn_ms() -> u64 {
    1_500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            text_only: false,
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: default_connect_delay_ms(),
            agent_turn_ms: default_agent_turn_ms(),
        }
    }
}

impl SimulatorConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn agent_turn(&self) -> Duration {
        Duration::from_millis(self.agent_turn_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Controller settings with the agent's conversation options folded in.
    pub fn controller(&self) -> ControllerConfig {
        let mut controller = self.session.clone();
        controller.conversation.text_only = self.agent.text_only;
        controller
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `BAHNCY_AGENT_ID` overrides `agent.id`
/// - `BAHNCY_CONNECT_TIMEOUT_MS` overrides `session.connect_timeout_ms`
/// - `BAHNCY_CLOSE_TIMEOUT_MS` overrides `session.close_timeout_ms`
/// - `BAHNCY_LOG_LEVEL` overrides `logging.level`
/// - `BAHNCY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `BAHNCY_*` overrides read through `lookup`. Unparseable numbers
/// are ignored.
pub fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(agent_id) = lookup("BAHNCY_AGENT_ID") {
        if !agent_id.trim().is_empty() {
            config.agent.id = agent_id;
        }
    }
    if let Some(ms) = lookup("BAHNCY_CONNECT_TIMEOUT_MS") {
        if let Ok(parsed) = ms.parse() {
            config.session.connect_timeout_ms = parsed;
        }
    }
    if let Some(ms) = lookup("BAHNCY_CLOSE_TIMEOUT_MS") {
        if let Ok(parsed) = ms.parse() {
            config.session.close_timeout_ms = parsed;
        }
    }
    if let Some(level) = lookup("BAHNCY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("BAHNCY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
