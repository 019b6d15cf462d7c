use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{TutanError, TutanResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step budget per task; reaching it ends the task as `timeout`.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Fixed pause after every executed step so the UI can settle.
    #[serde(default = "default_settle_interval_ms")]
    pub settle_interval_ms: u64,
    /// Grab a screenshot each step for `ui_update` events. Never sent to the planner.
    #[serde(default)]
    pub capture_screenshots: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            settle_interval_ms: default_settle_interval_ms(),
            capture_screenshots: false,
        }
    }
}

fn default_max_steps() -> u32 {
    30
}

fn default_settle_interval_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Port of the on-device helper app, forwarded 1:1 over adb.
    #[serde(default = "default_helper_port")]
    pub helper_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Explicit adb binary. `ADB_PATH` in the environment wins over this.
    #[serde(default)]
    pub adb_path: Option<PathBuf>,
    #[serde(default = "default_adb_timeout_secs")]
    pub adb_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Pause between the focus click and text input of a `type` action.
    #[serde(default = "default_focus_delay_ms")]
    pub focus_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            helper_port: default_helper_port(),
            request_timeout_secs: default_request_timeout_secs(),
            adb_path: None,
            adb_timeout_secs: default_adb_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            focus_delay_ms: default_focus_delay_ms(),
        }
    }
}

fn default_helper_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_adb_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_refresh_interval_secs() -> u64 {
    10
}

fn default_cache_ttl_secs() -> u64 {
    5
}

fn default_focus_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                display_name: "OpenAI".to_string(),
                api_base: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
                temperature: 0.0,
                api_key: None,
                timeout_secs: default_planner_timeout_secs(),
            },
        );
        Self {
            active_provider: "openai".to_string(),
            providers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    pub api_base: String,
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    /// Falls back to env vars `TUTAN_<ID>_API_KEY`, then `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_planner_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_planner_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// `~/.local/share/tutan/sessions` (platform equivalent), falling back to
    /// the working directory.
    pub fn resolve_sessions_dir(&self) -> PathBuf {
        if let Some(dir) = &self.sessions_dir {
            return dir.clone();
        }
        match dirs::data_local_dir() {
            Some(base) => base.join("tutan").join("sessions"),
            None => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("sessions"),
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let cwd = std::env::current_dir().ok()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

pub fn parse_config(content: &str) -> TutanResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !config.llm.providers.contains_key(&config.llm.active_provider) {
        return Err(TutanError::Config(format!(
            "active provider '{}' has no [llm.providers.{}] entry",
            config.llm.active_provider, config.llm.active_provider
        )));
    }
    Ok(config)
}

/// Load `config.toml` from `explicit`, or from next to the executable / the
/// working directory. Built-in defaults apply when no file exists.
pub fn load_config(explicit: Option<&Path>) -> TutanResult<AppConfig> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match resolve_config_path() {
            Some(p) => p,
            None => {
                tracing::info!("no config.toml found, using defaults");
                return Ok(AppConfig::default());
            }
        },
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> TutanResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.agent.max_steps, 30);
        assert_eq!(cfg.agent.settle_interval_ms, 1500);
        assert_eq!(cfg.device.helper_port, 8080);
        assert_eq!(cfg.device.focus_delay_ms, 500);
        assert_eq!(cfg.llm.active_provider, "openai");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_config(
            r#"
            [agent]
            max_steps = 5

            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "vLLM"
            api_base = "http://localhost:8000/v1"
            model = "qwen2-vl"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.max_steps, 5);
        assert_eq!(cfg.agent.settle_interval_ms, 1500);
        let local = &cfg.llm.providers["local"];
        assert_eq!(local.timeout_secs, 60);
        assert_eq!(local.temperature, 0.0);
    }

    #[test]
    fn unknown_active_provider_is_rejected() {
        let err = parse_config(
            r#"
            [llm]
            active_provider = "missing"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TutanError::Config(_)));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.agent.capture_screenshots = true;
        cfg.device.helper_port = 9090;
        save_config(&cfg, &path).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.agent.capture_screenshots);
        assert_eq!(loaded.device.helper_port, 9090);
    }
}
