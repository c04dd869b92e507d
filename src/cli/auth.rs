use std::path::Path;

use dialoguer::{Password, theme::ColorfulTheme};

use crate::config::{AgentConfig, Config, save_api_key};

/// Store an API key given on the command line, or prompt for one.
pub fn login(api_key: Option<String>) -> anyhow::Result<()> {
    let key = match api_key {
        Some(key) => validate_key(&key)?,
        None => prompt_api_key()?,
    };

    let path = Config::api_key_path()?;
    save_api_key(&path, &key)?;
    println!("Saved API key to {}", path.display());
    Ok(())
}

/// Resolve the API key, prompting once and persisting it when none is set.
///
/// # Errors
///
/// Returns error if no key is configured and the prompt is cancelled or empty.
pub fn ensure_api_key(config: &AgentConfig) -> anyhow::Result<String> {
    let path = Config::api_key_path()?;
    ensure_api_key_at(config, &path, prompt_api_key)
}

fn ensure_api_key_at(
    config: &AgentConfig,
    path: &Path,
    prompt: impl FnOnce() -> anyhow::Result<String>,
) -> anyhow::Result<String> {
    if let Some(key) = config.resolve_api_key(path) {
        return Ok(key);
    }

    println!(
        "No API key found. Set ${} or enter one now; it will be saved to {}.",
        config.api_key_env,
        path.display()
    );
    let key = prompt()?;
    save_api_key(path, &key)?;
    Ok(key)
}

fn prompt_api_key() -> anyhow::Result<String> {
    let api_key = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter API key")
        .interact()?;

    validate_key(&api_key)
}

fn validate_key(key: &str) -> anyhow::Result<String> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key cannot be empty");
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_without_env() -> AgentConfig {
        AgentConfig {
            api_key_env: "TERMPILOT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn validate_rejects_blank_keys() {
        assert!(validate_key("   ").is_err());
        assert_eq!(validate_key(" sk-1 \n").unwrap(), "sk-1");
    }

    #[test]
    fn stored_key_skips_prompt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_key");
        std::fs::write(&path, "sk-stored\n").unwrap();

        let key = ensure_api_key_at(&config_without_env(), &path, || {
            panic!("should not prompt")
        })
        .unwrap();
        assert_eq!(key, "sk-stored");
    }

    #[test]
    fn prompted_key_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/api_key");

        let key =
            ensure_api_key_at(&config_without_env(), &path, || Ok("sk-new".to_string())).unwrap();

        assert_eq!(key, "sk-new");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sk-new");
    }

    #[test]
    fn cancelled_prompt_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api_key");

        let result = ensure_api_key_at(&config_without_env(), &path, || {
            anyhow::bail!("API key cannot be empty")
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
