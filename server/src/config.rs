use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Parley real-time chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "parley-server", version, about = "Parley real-time chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value = "4600")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PARLEY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PARLEY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (SQLite database)
    #[arg(long, env = "PARLEY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Media-room token configuration (loaded from [media] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub media: Option<MediaConfig>,

    /// Assistant identity configuration (loaded from [assistant] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub assistant: Option<AssistantConfig>,
}

/// Configuration for signed media-room tokens handed to the external call
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Application id embedded in issued tokens
    #[serde(default = "default_app_id")]
    pub app_id: String,

    /// Shared secret for HMAC token signatures.
    /// An ephemeral secret is generated at startup if empty.
    #[serde(default)]
    pub server_secret: String,

    /// Token TTL in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            server_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_app_id() -> String {
    "parley-dev".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

/// Configuration for the assistant identity and its reply-generation
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Whether the assistant identity is created and replies are generated
    #[serde(default)]
    pub enabled: bool,

    /// Username for the assistant identity (default: "aria")
    #[serde(default = "default_assistant_username")]
    pub username: String,

    /// Text-generation endpoint; POST {prompt, model} -> {text}
    #[serde(default)]
    pub api_url: String,

    /// Model name forwarded to the generation endpoint
    #[serde(default)]
    pub model: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: default_assistant_username(),
            api_url: String::new(),
            model: String::new(),
        }
    }
}

fn default_assistant_username() -> String {
    "aria".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4600,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            media: Some(MediaConfig::default()),
            assistant: Some(AssistantConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PARLEY_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4600)
# port = 4600

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# ---- Media-Room Tokens ----
# [media]

# Application id embedded in issued tokens
# app_id = "parley-dev"

# Shared secret for HMAC-SHA256 token signatures.
# Leave empty to generate an ephemeral secret at startup (tokens then do
# not survive restarts; set this in production).
# server_secret = ""

# Token TTL in seconds (default: 3600 = 1 hour)
# token_ttl_secs = 3600

# ---- Assistant ----
# [assistant]

# Create the assistant identity and generate auto-replies
# enabled = false

# Username for the assistant identity
# username = "aria"

# Text-generation endpoint; POST {prompt, model} -> {text}
# api_url = ""

# Model name forwarded to the generation endpoint
# model = ""
"#
    .to_string()
}
