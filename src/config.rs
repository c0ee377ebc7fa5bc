use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_connections: u32,
}

/// What the process should do after configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    /// Apply the schema and exit.
    Migrate,
    /// Apply the schema, load demo fixtures and exit.
    Seed,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "User attribute admin service")]
pub struct Args {
    /// Host to bind to (overrides USER_ATTRIBUTE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides USER_ATTRIBUTE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides USER_ATTRIBUTE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "seed")]
    pub migrate: bool,

    /// Run migrations, load demo fixtures and exit
    #[arg(long)]
    pub seed: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("USER_ATTRIBUTE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("USER_ATTRIBUTE_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing USER_ATTRIBUTE_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading USER_ATTRIBUTE_PORT"),
        };
        let env_db = env::var("USER_ATTRIBUTE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/user_attribute.db".into());

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            max_connections: 5,
        };

        let mode = if args.migrate {
            RunMode::Migrate
        } else if args.seed {
            RunMode::Seed
        } else {
            RunMode::Serve
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
