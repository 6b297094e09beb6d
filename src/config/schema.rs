use crate::routing::{Persona, PersonaSet};
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level personachat configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` flag → `PERSONACHAT_CONFIG_DIR` env → `~/.personachat/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the selected provider. Overridden by `PERSONACHAT_API_KEY`, `OPENAI_API_KEY` or `API_KEY`.
    pub api_key: Option<String>,
    /// Base URL override for the provider API (e.g. `"http://localhost:8000/v1"`).
    pub api_url: Option<String>,
    /// Provider ID: `"openai"`, `"echo"`, or `"custom:<url>"`. Default: `"openai"`.
    pub default_provider: Option<String>,
    /// Model name sent to the provider. Default: `"gpt-4"`.
    pub default_model: Option<String>,
    /// Sampling temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    /// Turn and history settings (`[chat]`).
    #[serde(default)]
    pub chat: ChatConfig,

    /// HTTP gateway settings (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Persona table override (`[[personas]]`). Empty means the built-in table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personas: Vec<Persona>,
}

fn default_temperature() -> f64 {
    0.7
}

// ── Chat ──────────────────────────────────────────────────────────

/// Turn settings (`[chat]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChatConfig {
    /// Completion token cap. Default: `3000`.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Default: `0.1`.
    #[serde(default = "default_penalty")]
    pub presence_penalty: f64,
    /// Default: `0.1`.
    #[serde(default = "default_penalty")]
    pub frequency_penalty: f64,
    /// Prior messages sent with each turn. Default: `10`.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Conversations listed in sidebars and by default in the API. Default: `5`.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Recently used personas shown in the terminal sidebar. Default: `3`.
    #[serde(default = "default_recent_agents_limit")]
    pub recent_agents_limit: usize,
    /// Model backend call timeout in seconds. Default: `120`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// System instruction appended after the user query on every turn.
    /// Set to an empty string to send none.
    #[serde(default = "default_closing_guidance")]
    pub closing_guidance: Option<String>,
}

fn default_max_tokens() -> u32 {
    3000
}

fn default_penalty() -> f64 {
    0.1
}

fn default_history_window() -> usize {
    10
}

fn default_recent_limit() -> usize {
    5
}

fn default_recent_agents_limit() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Asks the model for long, detailed answers.
pub const DEFAULT_CLOSING_GUIDANCE: &str = "Please provide an in-depth, comprehensive response \
with specific details, examples, and thorough explanations. Aim for at least 400-600 words that \
thoroughly cover multiple aspects of the question.";

fn default_closing_guidance() -> Option<String> {
    Some(DEFAULT_CLOSING_GUIDANCE.to_string())
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            presence_penalty: default_penalty(),
            frequency_penalty: default_penalty(),
            history_window: default_history_window(),
            recent_limit: default_recent_limit(),
            recent_agents_limit: default_recent_agents_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            closing_guidance: default_closing_guidance(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────

/// HTTP gateway configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 8787)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// When set, `/api/*` requests must send `Authorization: Bearer <token>`.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Whole-request timeout in seconds. Must exceed the chat timeout. Default: `150`.
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes. Default: `65536`.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Open sessions allowed at once. Default: `1000`.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Seconds without a request before a session is evicted. Default: `3600`.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_timeout_secs() -> u64 {
    150
}

fn default_max_body_bytes() -> usize {
    65_536
}

fn default_max_sessions() -> usize {
    crate::sessions::DEFAULT_MAX_SESSIONS
}

fn default_session_idle_secs() -> u64 {
    crate::sessions::DEFAULT_SESSION_IDLE.as_secs()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
            request_timeout_secs: default_gateway_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let config_dir = default_config_dir().unwrap_or_else(|_| PathBuf::from(".personachat"));

        Self {
            config_path: config_dir.join("config.toml"),
            api_key: None,
            api_url: None,
            default_provider: Some("openai".to_string()),
            default_model: Some("gpt-4".to_string()),
            default_temperature: default_temperature(),
            chat: ChatConfig::default(),
            gateway: GatewayConfig::default(),
            personas: Vec::new(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".personachat"))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ConfigResolutionSource {
    Flag,
    EnvConfigDir,
    DefaultConfigDir,
}

impl ConfigResolutionSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "--config-dir",
            Self::EnvConfigDir => "PERSONACHAT_CONFIG_DIR",
            Self::DefaultConfigDir => "default",
        }
    }
}

fn resolve_config_dir(flag: Option<&Path>) -> Result<(PathBuf, ConfigResolutionSource)> {
    if let Some(dir) = flag {
        return Ok((dir.to_path_buf(), ConfigResolutionSource::Flag));
    }

    if let Ok(custom_config_dir) = std::env::var("PERSONACHAT_CONFIG_DIR") {
        let custom_config_dir = custom_config_dir.trim();
        if !custom_config_dir.is_empty() {
            return Ok((
                PathBuf::from(custom_config_dir),
                ConfigResolutionSource::EnvConfigDir,
            ));
        }
    }

    Ok((default_config_dir()?, ConfigResolutionSource::DefaultConfigDir))
}

fn env_non_empty(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

impl Config {
    /// Load `config.toml`, creating it with defaults on first run.
    pub async fn load_or_init(config_dir: Option<&Path>) -> Result<Self> {
        let (config_dir, resolution_source) = resolve_config_dir(config_dir)?;
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(&config_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            source = resolution_source.as_str(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application.
    pub fn validate(&self) -> Result<()> {
        // Gateway
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }
        if self.gateway.max_sessions == 0 {
            anyhow::bail!("gateway.max_sessions must be greater than 0");
        }
        if self.gateway.session_idle_secs == 0 {
            anyhow::bail!("gateway.session_idle_secs must be greater than 0");
        }

        // Chat
        if self.chat.history_window == 0 {
            anyhow::bail!("chat.history_window must be greater than 0");
        }
        if self.chat.request_timeout_secs == 0 {
            anyhow::bail!("chat.request_timeout_secs must be greater than 0");
        }
        if self.gateway.request_timeout_secs <= self.chat.request_timeout_secs {
            anyhow::bail!(
                "gateway.request_timeout_secs ({}) must exceed chat.request_timeout_secs ({})",
                self.gateway.request_timeout_secs,
                self.chat.request_timeout_secs
            );
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!(
                "default_temperature must be between 0.0 and 2.0 (got {})",
                self.default_temperature
            );
        }

        // Personas
        if !self.personas.is_empty() {
            let mut seen = HashSet::new();
            for (i, persona) in self.personas.iter().enumerate() {
                if !seen.insert(persona.name.trim()) {
                    anyhow::bail!("personas[{i}] duplicates name '{}'", persona.name);
                }
            }
            PersonaSet::new(self.personas.clone()).context("Invalid [[personas]] table")?;
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API Key: PERSONACHAT_API_KEY, OPENAI_API_KEY, or API_KEY (generic)
        if let Some(key) = env_non_empty(&["PERSONACHAT_API_KEY", "OPENAI_API_KEY", "API_KEY"]) {
            self.api_key = Some(key);
        }

        if let Some(provider) = env_non_empty(&["PERSONACHAT_PROVIDER"]) {
            self.default_provider = Some(provider);
        }

        // Model: PERSONACHAT_MODEL or MODEL
        if let Some(model) = env_non_empty(&["PERSONACHAT_MODEL", "MODEL"]) {
            self.default_model = Some(model);
        }

        if let Some(url) = env_non_empty(&["PERSONACHAT_API_URL"]) {
            self.api_url = Some(url);
        }

        // Temperature: PERSONACHAT_TEMPERATURE
        if let Some(temp_str) = env_non_empty(&["PERSONACHAT_TEMPERATURE"]) {
            match temp_str.parse::<f64>() {
                Ok(temp) if (0.0..=2.0).contains(&temp) => self.default_temperature = temp,
                _ => tracing::warn!(
                    value = %temp_str,
                    "Ignoring invalid PERSONACHAT_TEMPERATURE (expected 0.0-2.0)"
                ),
            }
        }

        // Gateway host: PERSONACHAT_GATEWAY_HOST or HOST
        if let Some(host) = env_non_empty(&["PERSONACHAT_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        // Gateway port: PERSONACHAT_GATEWAY_PORT or PORT
        if let Some(port_str) = env_non_empty(&["PERSONACHAT_GATEWAY_PORT", "PORT"]) {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        if let Some(secs) = env_non_empty(&["PERSONACHAT_REQUEST_TIMEOUT_SECS"]) {
            if let Ok(secs) = secs.parse::<u64>() {
                self.chat.request_timeout_secs = secs;
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or("config.toml");
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
