use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crewforge_core::records::mask_secret;

pub const DEFAULT_SOCKET_URL: &str = "http://localhost:3001";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrewforgeConfig {
    #[serde(default)]
    pub socket: SocketSection,
    #[serde(default)]
    pub qdrant: QdrantSection,
    #[serde(default)]
    pub runtime: RuntimeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SocketSection {
    #[serde(default = "default_socket_url")]
    pub url: String,
    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for SocketSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketSection")
            .field("url", &self.url)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

fn default_socket_url() -> String {
    DEFAULT_SOCKET_URL.to_string()
}

impl Default for SocketSection {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantSection {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

impl Default for QdrantSection {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Attempts per chat request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".crewforge")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}

impl CrewforgeConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path.clone().unwrap_or_else(default_config_path);

        // Refuse group/other-readable files, they may hold the socket token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow::anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `crewforge init` first.",
                path.display()
            )
        })?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Parse TOML after env expansion, filling empty URLs with defaults
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let mut config: Self = toml::from_str(&expanded)?;

        if config.socket.url.trim().is_empty() {
            config.socket.url = default_socket_url();
        }
        if config.qdrant.url.trim().is_empty() {
            config.qdrant.url = default_qdrant_url();
        }
        if !config.socket.token.is_empty() && !content.contains("${AGENT_BACKEND_SOCKET_TOKEN}") {
            warn!(
                "Socket token is hardcoded in config file. For security, use environment variables: token = \"${{AGENT_BACKEND_SOCKET_TOKEN}}\""
            );
        }

        Ok(config)
    }

    /// Copy safe to print
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.socket.token = mask_secret(&self.socket.token);
        masked
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "AGENT_BACKEND_SOCKET_TOKEN",
    "SOCKET_URL",
    "QDRANT_HOST",
    "OPENAI_API_KEY",
    "AZURE_OPENAI_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // leave ${VAR} in place so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}
