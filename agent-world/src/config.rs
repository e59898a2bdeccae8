//! Runtime configuration: data root, turn limit default, history
//! window, tool-call iteration cap, HITL default option, log level.
//!
//! Grounded on the `env_config` crate's `load_and_apply` (XDG + `.env`, env
//! wins), generalized into a typed summary the way the teacher's
//! `config::build_config_summary` aggregates run settings for display.

use std::path::PathBuf;

const DEFAULT_DATA_PATH: &str = "./data/worlds";
const DEFAULT_TURN_LIMIT: u32 = 5;
const DEFAULT_HISTORY_WINDOW: usize = 10;
const DEFAULT_TOOL_ITERATION_CAP: u32 = 8;
const DEFAULT_HITL_OPTION: &str = "cancel";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Process-wide runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub data_path: PathBuf,
    pub default_turn_limit: u32,
    pub history_window: usize,
    pub tool_iteration_cap: u32,
    pub hitl_default_option: String,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            default_turn_limit: DEFAULT_TURN_LIMIT,
            history_window: DEFAULT_HISTORY_WINDOW,
            tool_iteration_cap: DEFAULT_TOOL_ITERATION_CAP,
            hitl_default_option: DEFAULT_HITL_OPTION.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Loads `.env`/XDG config into the process environment (via `env_config`)
    /// then reads `AGENT_WORLD_DATA_PATH` and `RUST_LOG`/`AGENT_WORLD_LOG_LEVEL`
    /// over the defaults.
    pub fn load(app_name: &str) -> Self {
        let _ = env_config::load_and_apply(app_name, None);
        Self::from_env()
    }

    /// Reads overrides directly from the current process environment, without
    /// touching `.env`/XDG — used by tests that set vars explicitly.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("AGENT_WORLD_DATA_PATH") {
            if !path.is_empty() {
                config.data_path = PathBuf::from(path);
            }
        }
        if let Ok(level) = std::env::var("AGENT_WORLD_LOG_LEVEL").or_else(|_| std::env::var("RUST_LOG")) {
            if !level.is_empty() {
                config.log_level = level;
            }
        }
        config
    }
}
