use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::api::{parse_filter, Resource};

/// Ledger client - authenticated access to the ledger backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Backend base URL
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// File holding the persisted access/refresh tokens
    #[arg(short = 'c', long, env = "CREDENTIALS_FILE")]
    pub credentials_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "text", value_parser = ["text", "json"])]
    pub log_format: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Upper bound on a token refresh call in seconds
    #[arg(long, env = "REFRESH_TIMEOUT", default_value = "30")]
    pub refresh_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Obtain and store a credential pair
    Login {
        #[arg(short = 'U', long)]
        username: String,
        /// Prompted for when omitted
        #[arg(short = 'P', long, env = "LEDGER_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget stored credentials
    Logout,
    /// Show the current user
    Whoami,
    /// Show whether credentials are stored
    Status,
    /// Show the signed-in user's profile
    Profile,
    /// Partially update the profile from a JSON body
    ProfileUpdate { body: String },
    /// List a collection, optionally filtered with key=value pairs
    List {
        resource: Resource,
        #[arg(value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Fetch one item
    Get { resource: Resource, id: String },
    /// Create an item from a JSON body
    Create { resource: Resource, body: String },
    /// Replace an item with a JSON body
    Update {
        resource: Resource,
        id: String,
        body: String,
    },
    /// Partially update an item with a JSON body
    Patch {
        resource: Resource,
        id: String,
        body: String,
    },
    /// Delete an item
    Delete { resource: Resource, id: String },
    /// Send an arbitrary authenticated request
    Request {
        method: String,
        path: String,
        body: Option<String>,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub api_base_url: String,

    // Credentials
    pub credentials_file: PathBuf,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
    pub refresh_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let command = args.command.clone();
        Ok((Self::from_args(args)?, command))
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let credentials_file = match args.credentials_file {
            Some(path) => expand_tilde(&path),
            None => default_credentials_file()
                .context("Cannot locate a config directory; set CREDENTIALS_FILE")?,
        };

        Ok(Config {
            api_base_url: args.base_url.trim_end_matches('/').to_string(),
            credentials_file,

            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),

            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),

            http_request_timeout: args.http_timeout,
            refresh_timeout: args.refresh_timeout,

            log_level: args.log_level,
            log_format: args.log_format,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            anyhow::bail!(
                "API_BASE_URL must start with http:// or https://: {}",
                self.api_base_url
            );
        }

        if self.http_request_timeout == 0 || self.http_connect_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        if self.refresh_timeout == 0 {
            anyhow::bail!("REFRESH_TIMEOUT must be greater than zero");
        }

        Ok(())
    }
}

/// Default credentials location under the user's config directory
fn default_credentials_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ledger-client").join("credentials.json"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
