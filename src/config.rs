use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";

const DEFAULT_CONTEXT: &str = "Purpose: The primary role of this agent is to assist users by providing accurate \
information about world population statistics and details about a country.";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub agent: AgentConfig,
    pub population: DatasetConfig,
    pub documents: DocumentsConfig,
    pub notes: NotesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub context: String,
    pub max_iterations: usize,
    pub max_history_turns: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            context: DEFAULT_CONTEXT.to_string(),
            max_iterations: 10,
            max_history_turns: 20,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub preview_rows: usize,
    pub synthesize_response: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("population.csv"),
            preview_rows: 5,
            synthesize_response: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentsConfig {
    pub source: PathBuf,
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub top_k: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::from("data").join("canada"),
            index_dir: PathBuf::from("canada"),
            chunk_size: 1024,
            top_k: 2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotesConfig {
    pub path: PathBuf,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data").join("notes.txt"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when it is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            log::debug!("No {} found, using defaults", path.display());
            Self::default()
        };

        // Override with environment variable if set
        if let Ok(endpoint) = std::env::var(BASE_URL_VAR) {
            if !endpoint.trim().is_empty() {
                config.openai.endpoint = endpoint;
            }
        }

        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("OpenAI API key not found. Set OPENAI_API_KEY in the environment or a .env file.")]
    MissingCredential,
}

/// API credential for the model service.
#[derive(Clone)]
pub struct CredentialConfig {
    pub api_key: String,
}

impl std::fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialConfig").field("api_key", &"<redacted>").finish()
    }
}

impl CredentialConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(std::env::var(API_KEY_VAR).ok())
    }

    /// Accept a non-blank key.
    pub fn resolve(value: Option<String>) -> Result<Self, ConfigError> {
        match value {
            Some(key) if !key.trim().is_empty() => Ok(Self {
                api_key: key.trim().to_string(),
            }),
            _ => Err(ConfigError::MissingCredential),
        }
    }
}
