use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the current directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".pr-summarizer.toml";

const DEFAULT_MODEL_PATH: &str = "models/mistral-7b-instruct-v0.2.Q4_K_M.gguf";
const DEFAULT_MODEL_URL: &str = "https://huggingface.co/TheBloke/Mistral-7B-Instruct-v0.2-GGUF/resolve/main/mistral-7b-instruct-v0.2.Q4_K_M.gguf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("GitHub token is required. Set GITHUB_TOKEN or github.token in .pr-summarizer.toml")]
    MissingToken,
}

/// Top-level configuration loaded from .pr-summarizer.toml.
/// Every section is optional; only the GitHub token is required at run time.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    /// Base URL of the REST API
    pub api_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            timeout_secs: 30,
        }
    }
}

// Hand-written so the token never ends up in a log line.
impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Inference parameters for the local model plus the settings of the
/// completion server that hosts it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// GGUF model file on the local filesystem
    pub path: PathBuf,
    /// Upper bound on prompt + response tokens
    pub context_window: u32,
    /// Tokens generated per summary
    pub max_tokens: u32,
    /// Sampling temperature, typically in [0, 1]
    pub temperature: f32,
    /// Nucleus sampling threshold
    pub top_p: f32,
    pub repeat_penalty: f32,
    /// CPU threads used by the inference server
    pub threads: u32,
    /// Offload all layers to the GPU
    pub gpu: bool,
    /// Attach to an already running server instead of launching one
    pub server_url: Option<String>,
    pub server_binary: String,
    pub port: u16,
    pub startup_timeout_secs: u64,
    /// Where `--download-model` fetches the artifact from
    pub download_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            context_window: 4096,
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.95,
            repeat_penalty: 1.1,
            threads: 4,
            gpu: false,
            server_url: None,
            server_binary: "llama-server".to_string(),
            port: 8089,
            startup_timeout_secs: 120,
            download_url: DEFAULT_MODEL_URL.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from .pr-summarizer.toml in the
    /// current directory when no path is given. A missing default file yields
    /// the default config; an explicitly named file must exist.
    /// Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from(default_path)?
                } else {
                    AppConfig::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// GITHUB_TOKEN only fills an absent token; the model variables always win
    /// over the file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.github.token.is_none() {
            self.github.token = lookup("GITHUB_TOKEN");
        }
        if let Some(path) = lookup("PR_SUMMARIZER_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("PR_SUMMARIZER_SERVER_URL") {
            self.model.server_url = Some(url);
        }
    }

    /// Fail with `MissingToken` unless a non-blank token is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.github_token().map(|_| ())
    }

    pub fn github_token(&self) -> Result<&str, ConfigError> {
        self.github
            .token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.model.context_window, 4096);
        assert_eq!(config.model.threads, 4);
        assert!(!config.model.gpu);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
token = "ghp_example"

[model]
path = "/opt/models/tiny.gguf"
max_tokens = 256
temperature = 0.2
gpu = true
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.token.as_deref(), Some("ghp_example"));
        assert_eq!(config.model.path, PathBuf::from("/opt/models/tiny.gguf"));
        assert_eq!(config.model.max_tokens, 256);
        assert!(config.model.gpu);
        // untouched keys keep their defaults
        assert_eq!(config.model.top_p, 0.95);
        assert_eq!(config.github.timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\ncontext_window = 2048").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model.context_window, 2048);
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("nope.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model\nmax_tokens = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_token_fills_missing_token() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "GITHUB_TOKEN").then(|| "from-env".to_string()));
        assert_eq!(config.github_token().unwrap(), "from-env");
    }

    #[test]
    fn test_file_token_takes_precedence() {
        let mut config = AppConfig::default();
        config.github.token = Some("from-file".to_string());
        config.apply_env(|key| (key == "GITHUB_TOKEN").then(|| "from-env".to_string()));
        assert_eq!(config.github_token().unwrap(), "from-file");
    }

    #[test]
    fn test_env_overrides_model_settings() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "PR_SUMMARIZER_MODEL_PATH" => Some("/tmp/m.gguf".to_string()),
            "PR_SUMMARIZER_SERVER_URL" => Some("http://127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.model.path, PathBuf::from("/tmp/m.gguf"));
        assert_eq!(config.model.server_url.as_deref(), Some("http://127.0.0.1:9000"));
    }

    #[test]
    fn test_validate_rejects_missing_or_blank_token() {
        let mut config = AppConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
        config.github.token = Some("   ".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
        config.github.token = Some("abc".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = AppConfig::default();
        config.github.token = Some("super-secret".to_string());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
