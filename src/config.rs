//! CLI-args + TOML-file configuration layer: values in the file, when
//! present, override the CLI arguments — the same resolution order the
//! surrounding stack's config loader uses.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

use crate::context::RequestsLoggingLevel;

#[derive(Parser, Debug)]
#[command(name = "dirac-auth-server", about = "DIRAC OAuth2/OIDC authorization server")]
pub struct CliArgs {
    /// Path to the DIRAC configuration registry TOML file: VOs, groups,
    /// known clients and the signing secret.
    #[arg(long)]
    pub registry: PathBuf,

    /// Path to a TOML file whose values override the CLI arguments above.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// The externally-visible base URL of this server, used to build
    /// `verification_uri` and the IdP callback redirect URIs. Defaults to
    /// `http://localhost:<port>`.
    #[arg(long)]
    pub base_url: Option<String>,

    /// The level of logging to perform on each request.
    #[arg(long, value_enum, default_value_t = RequestsLoggingLevel::Path)]
    pub requests_logging_level: RequestsLoggingLevel,

    /// Device flow row TTL in seconds.
    #[arg(long, default_value_t = 600)]
    pub device_ttl_secs: i64,

    /// Authorization-code flow row TTL in seconds.
    #[arg(long, default_value_t = 300)]
    pub auth_code_ttl_secs: i64,

    /// DIRAC access token TTL in seconds.
    #[arg(long, default_value_t = 180_000)]
    pub access_token_ttl_secs: i64,

    /// Path to the SQLite file backing the flow store. Defaults to an
    /// in-memory database, which does not survive a restart.
    #[arg(long)]
    pub flow_db: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileOverrides {
    registry: Option<PathBuf>,
    port: Option<u16>,
    base_url: Option<String>,
    requests_logging_level: Option<String>,
    device_ttl_secs: Option<i64>,
    auth_code_ttl_secs: Option<i64>,
    access_token_ttl_secs: Option<i64>,
    flow_db: Option<PathBuf>,
}

/// The fully-resolved settings the binary runs with, after TOML overrides
/// (if any) have been applied on top of the CLI arguments.
#[derive(Debug, Clone)]
pub struct Settings {
    pub registry: PathBuf,
    pub port: u16,
    pub base_url: String,
    pub requests_logging_level: RequestsLoggingLevel,
    pub device_ttl_secs: i64,
    pub auth_code_ttl_secs: i64,
    pub access_token_ttl_secs: i64,
    pub flow_db: Option<PathBuf>,
}

impl Settings {
    pub fn resolve(args: CliArgs) -> Result<Self> {
        let mut settings = Settings {
            registry: args.registry,
            port: args.port,
            base_url: args
                .base_url
                .unwrap_or_else(|| format!("http://localhost:{}", args.port)),
            requests_logging_level: args.requests_logging_level,
            device_ttl_secs: args.device_ttl_secs,
            auth_code_ttl_secs: args.auth_code_ttl_secs,
            access_token_ttl_secs: args.access_token_ttl_secs,
            flow_db: args.flow_db,
        };

        let Some(path) = args.config else {
            return Ok(settings);
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {:?}", path))?;
        let overrides: FileOverrides = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {:?}", path))?;

        if let Some(v) = overrides.registry {
            settings.registry = v;
        }
        if let Some(v) = overrides.port {
            settings.port = v;
        }
        if let Some(v) = overrides.base_url {
            settings.base_url = v;
        }
        if let Some(v) = overrides.requests_logging_level {
            settings.requests_logging_level = match v.as_str() {
                "none" | "None" => RequestsLoggingLevel::None,
                "headers" | "Headers" => RequestsLoggingLevel::Headers,
                _ => RequestsLoggingLevel::Path,
            };
        }
        if let Some(v) = overrides.device_ttl_secs {
            settings.device_ttl_secs = v;
        }
        if let Some(v) = overrides.auth_code_ttl_secs {
            settings.auth_code_ttl_secs = v;
        }
        if let Some(v) = overrides.access_token_ttl_secs {
            settings.access_token_ttl_secs = v;
        }
        if let Some(v) = overrides.flow_db {
            settings.flow_db = Some(v);
        }

        Ok(settings)
    }
}
