//! Configuration management for termpilot.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_core::permission::PermissionMode;
use agent_core::provider::LlmProvider;
use agent_core::providers::ChatCompletionsProvider;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "termpilot";
const API_KEY_FILE: &str = "api_key";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion endpoint and accounting.
    pub agent: AgentConfig,

    /// Output caps for local operations.
    pub limits: Limits,

    /// Terminal behavior.
    pub ui: UiConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// Loads global config first, then merges the project-local config from the
    /// current directory if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::load_from(&Self::config_path()?, &Self::project_config_path(&cwd))
    }

    /// Load the global file at `global` and overlay the project file at `project`.
    ///
    /// Missing files are skipped. Project keys override global keys table by
    /// table, so a project file only needs the values it changes.
    ///
    /// # Errors
    ///
    /// Returns an error if either file exists but cannot be read or parsed.
    pub fn load_from(global: &Path, project: &Path) -> anyhow::Result<Self> {
        let mut merged = toml::Table::new();

        for path in [global, project] {
            if !path.exists() {
                continue;
            }
            let contents = std::fs::read_to_string(path)?;
            let table: toml::Table = toml::from_str(&contents)
                .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config file");
            merge_tables(&mut merged, table);
        }

        Ok(toml::Value::Table(merged).try_into()?)
    }

    /// Get the project-local configuration file path (`.termpilot/config.toml`).
    #[must_use]
    pub fn project_config_path(cwd: &Path) -> PathBuf {
        cwd.join(format!(".{APP_DIR}")).join("config.toml")
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/termpilot/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join(APP_DIR));
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join(APP_DIR))
    }

    /// Get the data directory path (`~/.local/share/termpilot/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn data_dir() -> anyhow::Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine data directory"))?;

        Ok(base.data_dir().join(APP_DIR))
    }

    /// Path of the stored API key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn api_key_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join(API_KEY_FILE))
    }
}

/// Recursively overlay `overlay` onto `base`.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Completion endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of a Chat Completions compatible endpoint.
    pub base_url: String,

    /// Model to request.
    pub model: String,

    /// Max tokens per response.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Whole-request timeout, streaming included.
    pub request_timeout_secs: u64,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Price per 1000 tokens, for the running cost estimate.
    pub cost_per_1k_tokens: f64,

    /// Context window shown in the status line.
    pub max_context_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.minimax.io/v1".to_string(),
            model: "MiniMax-Text-01".to_string(),
            max_tokens: 4096,
            temperature: Some(0.7),
            request_timeout_secs: 180,
            api_key_env: "TERMPILOT_API_KEY".to_string(),
            cost_per_1k_tokens: 0.0001,
            max_context_tokens: 128_000,
        }
    }
}

impl AgentConfig {
    /// Resolve the API key: environment variable first, then the key file.
    #[must_use]
    pub fn resolve_api_key(&self, key_file: &Path) -> Option<String> {
        if let Ok(key) = std::env::var(&self.api_key_env) {
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Some(key);
            }
        }

        let contents = std::fs::read_to_string(key_file).ok()?;
        let key = contents.trim();
        (!key.is_empty()).then(|| key.to_string())
    }

    /// Create the completion provider with the given key.
    ///
    /// # Errors
    ///
    /// Returns error if the key is empty or the HTTP client can't be built.
    pub fn create_provider(&self, api_key: &str) -> anyhow::Result<Box<dyn LlmProvider>> {
        let provider = ChatCompletionsProvider::with_config(
            api_key,
            self.base_url.clone(),
            Duration::from_secs(self.request_timeout_secs),
        )?;
        Ok(Box::new(provider))
    }

    /// Cost estimate for a token count.
    #[must_use]
    pub fn cost_for(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.cost_per_1k_tokens
    }
}

/// Persist an API key with owner-only permissions.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_api_key(path: &Path, key: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;

    // mode() only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(key.trim().as_bytes())?;

    tracing::info!(path = %path.display(), "saved API key");
    Ok(())
}

/// Output caps for local operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Lines shown by `read`.
    pub read_lines: usize,
    /// Max depth of `tree`.
    pub tree_depth: usize,
    /// Entries shown per directory in `tree`.
    pub tree_entries: usize,
    /// Max depth of `find`.
    pub find_depth: usize,
    /// Matches shown by `find`.
    pub find_results: usize,
    /// Matches shown by `grep`.
    pub grep_results: usize,
    /// Body bytes kept by `fetch`.
    pub fetch_bytes: usize,
    /// Timeout for `fetch`.
    pub fetch_timeout_secs: u64,
    /// Timeout for `search`.
    pub search_timeout_secs: u64,
    /// Largest file `image` accepts.
    pub image_max_bytes: u64,
    /// Lines inlined per `@file` mention.
    pub mention_lines: usize,
    /// Undo ledger capacity.
    pub undo_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            read_lines: 200,
            tree_depth: 3,
            tree_entries: 15,
            find_depth: 6,
            find_results: 30,
            grep_results: 25,
            fetch_bytes: 8000,
            fetch_timeout_secs: 30,
            search_timeout_secs: 10,
            image_max_bytes: 5 * 1024 * 1024,
            mention_lines: 100,
            undo_capacity: agent_core::undo::DEFAULT_CAPACITY,
        }
    }
}

/// Terminal behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Show the thinking indicator while waiting for the first token.
    pub show_thinking: bool,

    /// Approval mode at startup.
    pub default_mode: PermissionMode,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_thinking: true,
            default_mode: PermissionMode::Unrestricted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(
            &dir.path().join("nope.toml"),
            &dir.path().join("also-nope.toml"),
        )
        .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn project_config_overrides_global() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");

        std::fs::write(
            &global,
            r#"
[agent]
model = "global-model"
max_tokens = 1000

[limits]
read_lines = 50
"#,
        )
        .unwrap();
        std::fs::write(
            &project,
            r#"
[agent]
model = "project-model"

[ui]
default_mode = "blocked"
"#,
        )
        .unwrap();

        let config = Config::load_from(&global, &project).unwrap();
        assert_eq!(config.agent.model, "project-model");
        assert_eq!(config.agent.max_tokens, 1000);
        assert_eq!(config.limits.read_lines, 50);
        assert_eq!(config.limits.grep_results, 25);
        assert_eq!(config.ui.default_mode, PermissionMode::Blocked);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.toml");
        std::fs::write(&global, "[agent\nmodel = ").unwrap();

        assert!(Config::load_from(&global, &dir.path().join("none.toml")).is_err());
    }

    #[test]
    fn project_config_lives_under_dot_dir() {
        let path = Config::project_config_path(Path::new("/work"));
        assert_eq!(path, PathBuf::from("/work/.termpilot/config.toml"));
    }

    #[test]
    fn api_key_from_file_when_env_unset() {
        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("api_key");
        save_api_key(&key_file, "  sk-test \n").unwrap();

        let config = AgentConfig {
            api_key_env: "TERMPILOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AgentConfig::default()
        };
        assert_eq!(config.resolve_api_key(&key_file), Some("sk-test".to_string()));
    }

    #[test]
    fn env_var_takes_precedence_over_key_file() {
        // HOME is always set in test environments
        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("api_key");
        std::fs::write(&key_file, "from-file").unwrap();

        let config = AgentConfig {
            api_key_env: "HOME".to_string(),
            ..AgentConfig::default()
        };
        assert_eq!(
            config.resolve_api_key(&key_file),
            std::env::var("HOME").ok().map(|h| h.trim().to_string())
        );
    }

    #[test]
    fn missing_key_resolves_to_none() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            api_key_env: "TERMPILOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AgentConfig::default()
        };
        assert_eq!(config.resolve_api_key(&dir.path().join("api_key")), None);
    }

    #[cfg(unix)]
    #[test]
    fn saved_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("nested").join("api_key");
        save_api_key(&key_file, "sk").unwrap();

        let mode = std::fs::metadata(&key_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn saving_over_a_readable_key_tightens_it() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let key_file = dir.path().join("api_key");
        std::fs::write(&key_file, "old-key-that-is-longer").unwrap();
        std::fs::set_permissions(&key_file, std::fs::Permissions::from_mode(0o644)).unwrap();

        save_api_key(&key_file, " sk-new \n").unwrap();

        let mode = std::fs::metadata(&key_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(&key_file).unwrap(), "sk-new");
    }

    #[test]
    fn cost_scales_per_thousand_tokens() {
        let config = AgentConfig::default();
        assert!((config.cost_for(10_000) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
