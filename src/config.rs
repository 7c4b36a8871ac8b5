use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_REMOTE_STORE_URL: &str = "http://127.0.0.1:3001";
const DEFAULT_LOCAL_STORE_PATH: &str = "data/local.sqlite3";
const DEFAULT_COMPLETION_MODEL: &str = "llama3.1";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SERVER_PORT: u16 = 3001;

/// Default per-file character budget applied when assembling the grounding context.
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 150_000;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration shared by the CLI, the gateway, and the bundled store server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the remote REST store.
    pub remote_store_url: String,
    /// Transport timeout applied to every remote store call, in seconds.
    pub remote_timeout_secs: u64,
    /// Location of the embedded SQLite fallback store.
    pub local_store_path: PathBuf,
    /// Maximum number of characters of each file injected into the grounding context.
    pub context_max_chars: usize,
    /// Provider answering conversation turns.
    pub completion_provider: CompletionProvider,
    /// Model identifier passed to the completion provider.
    pub completion_model: String,
    /// Optional Ollama base URL override.
    pub ollama_url: Option<String>,
    /// Listen port for the bundled REST store server.
    pub server_port: u16,
    /// Directory holding the REST store's JSON document.
    pub data_dir: PathBuf,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionProvider {
    /// No provider configured; conversation turns cannot be answered.
    None,
    /// Local Ollama runtime.
    Ollama,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            remote_store_url: load_env_optional("REMOTE_STORE_URL")
                .unwrap_or_else(|| DEFAULT_REMOTE_STORE_URL.to_string()),
            remote_timeout_secs: parse_optional("REMOTE_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
            local_store_path: load_env_optional("LOCAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_STORE_PATH)),
            context_max_chars: parse_optional("CONTEXT_MAX_CHARS")?
                .unwrap_or(DEFAULT_CONTEXT_MAX_CHARS),
            completion_provider: load_env_optional("COMPLETION_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::InvalidValue("COMPLETION_PROVIDER".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(CompletionProvider::None),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL"),
            server_port: parse_optional("SERVER_PORT")?.unwrap_or(DEFAULT_SERVER_PORT),
            data_dir: load_env_optional("STORE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_store_url: DEFAULT_REMOTE_STORE_URL.to_string(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            local_store_path: PathBuf::from(DEFAULT_LOCAL_STORE_PATH),
            context_max_chars: DEFAULT_CONTEXT_MAX_CHARS,
            completion_provider: CompletionProvider::None,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            ollama_url: None,
            server_port: DEFAULT_SERVER_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Calling this more than once keeps the first configuration.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        remote_store_url = %config.remote_store_url,
        local_store_path = %config.local_store_path.display(),
        completion_provider = ?config.completion_provider,
        server_port = config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
