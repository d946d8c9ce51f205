//! Environment-based Configuration for the exitq Backend
//!
//! This module provides configuration loading from environment variables.
//! All privileged addresses MUST come from environment variables on
//! non-devnet networks, never from hardcoded values.
//!
//! # Environment Variables
//!
//! ## Network Configuration
//! - `EXITQ_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `EXITQ_API_HOST` - API bind host (default: "127.0.0.1")
//! - `EXITQ_API_PORT` - API bind port (default: 3000)
//! - `EXITQ_DB_PATH` - SQLite database path (default: "data/exitq.db")
//!
//! ## Role Configuration (comma-separated address lists)
//! - `EXITQ_FINALIZE_ROLE` - Addresses allowed to run finalization
//! - `EXITQ_ORACLE_ROLE` - Addresses allowed to submit oracle reports
//! - `EXITQ_PAUSE_ROLE` - Addresses allowed to pause/resume
//!
//! ## Queue Settings
//! - `EXITQ_MIN_AMOUNT_WEI` - Minimum withdrawal amount in wei
//! - `EXITQ_MAX_AMOUNT_WEI` - Maximum withdrawal amount in wei
//! - `EXITQ_SAFE_BORDER_SECS` - Requests younger than this are not finalized
//! - `EXITQ_FINALIZATION_INTERVAL_SECS` - Daemon tick interval
//! - `EXITQ_MAX_REQUESTS_PER_TICK` - Batch calculator scan allowance per tick
//!
//! ## Optional Settings
//! - `EXITQ_LOG_LEVEL` - Logging level (debug, info, warn, error)
//! - `EXITQ_LOG_JSON` - Set to "1" for JSON log output

use std::env;
use std::str::FromStr;
use thiserror::Error;

use alloy_primitives::Address;

use crate::queue::{MAX_WITHDRAWAL_AMOUNT, MIN_WITHDRAWAL_AMOUNT};
use crate::types::Wei;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "EXITQ_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Open role sets (anyone may call) are only acceptable off mainnet
    pub fn allows_open_roles(&self) -> bool {
        matches!(self, Network::Devnet | Network::Testnet)
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    /// Network environment
    pub network: Network,

    /// API bind host
    pub api_host: String,

    /// API bind port
    pub api_port: u16,

    /// SQLite database path
    pub db_path: String,

    /// Addresses holding the finalize role (empty = open)
    pub finalize_role: Vec<Address>,

    /// Addresses holding the oracle role (empty = open)
    pub oracle_role: Vec<Address>,

    /// Addresses holding the pause role (empty = open)
    pub pause_role: Vec<Address>,

    /// Minimum withdrawal amount in wei
    pub min_amount: Wei,

    /// Maximum withdrawal amount in wei
    pub max_amount: Wei,

    /// Requests created within this many seconds of now are left unfinalized
    pub safe_border_secs: u64,

    /// Finalization daemon tick interval
    pub finalization_interval_secs: u64,

    /// Batch calculator scan allowance per tick
    pub max_requests_per_tick: u64,

    /// Log level
    pub log_level: String,

    /// Emit JSON logs
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("EXITQ_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let api_host = env::var("EXITQ_API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = parse_var("EXITQ_API_PORT", 3000u16)?;
        let db_path = env::var("EXITQ_DB_PATH").unwrap_or_else(|_| "data/exitq.db".to_string());

        let finalize_role = parse_address_list("EXITQ_FINALIZE_ROLE")?;
        let oracle_role = parse_address_list("EXITQ_ORACLE_ROLE")?;
        let pause_role = parse_address_list("EXITQ_PAUSE_ROLE")?;

        let min_amount = parse_var("EXITQ_MIN_AMOUNT_WEI", MIN_WITHDRAWAL_AMOUNT)?;
        let max_amount = parse_var("EXITQ_MAX_AMOUNT_WEI", MAX_WITHDRAWAL_AMOUNT)?;
        if min_amount == 0 || min_amount > max_amount {
            return Err(ConfigError::InvalidValue(
                "EXITQ_MIN_AMOUNT_WEI".to_string(),
                format!("bounds [{min_amount}, {max_amount}] are not a valid range"),
            ));
        }

        let safe_border_secs = parse_var("EXITQ_SAFE_BORDER_SECS", 8 * 3600u64)?;
        let finalization_interval_secs = parse_var("EXITQ_FINALIZATION_INTERVAL_SECS", 60u64)?;
        let max_requests_per_tick = parse_var("EXITQ_MAX_REQUESTS_PER_TICK", 1000u64)?;
        if max_requests_per_tick == 0 {
            return Err(ConfigError::InvalidValue(
                "EXITQ_MAX_REQUESTS_PER_TICK".to_string(),
                "must be positive".to_string(),
            ));
        }

        let log_level = env::var("EXITQ_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_json = env::var("EXITQ_LOG_JSON").map(|v| v == "1").unwrap_or(false);

        Ok(Self {
            network,
            api_host,
            api_port,
            db_path,
            finalize_role,
            oracle_role,
            pause_role,
            min_amount,
            max_amount,
            safe_border_secs,
            finalization_interval_secs,
            max_requests_per_tick,
            log_level,
            log_json,
        })
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        // every role must be held by someone on mainnet
        for (var, role) in [
            ("EXITQ_FINALIZE_ROLE", &self.finalize_role),
            ("EXITQ_ORACLE_ROLE", &self.oracle_role),
            ("EXITQ_PAUSE_ROLE", &self.pause_role),
        ] {
            if role.is_empty() {
                return Err(ConfigError::MissingEnvVar(var.to_string()));
            }
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== exitq Configuration ===");
        println!("Network: {:?}", self.network);
        println!("API: {}:{}", self.api_host, self.api_port);
        println!("Database: {}", self.db_path);
        println!(
            "Roles: finalize={}, oracle={}, pause={}",
            role_summary(&self.finalize_role),
            role_summary(&self.oracle_role),
            role_summary(&self.pause_role),
        );
        println!("Amount bounds: [{}, {}] wei", self.min_amount, self.max_amount);
        println!("Safe border: {}s", self.safe_border_secs);
        println!("Finalization interval: {}s", self.finalization_interval_secs);
        println!("Log Level: {}", self.log_level);
        println!("===========================");
    }

    /// Devnet defaults without touching the environment, for tests.
    pub fn default_for_tests() -> Self {
        Self {
            network: Network::Devnet,
            api_host: "127.0.0.1".to_string(),
            api_port: 3000,
            db_path: ":memory:".to_string(),
            finalize_role: Vec::new(),
            oracle_role: Vec::new(),
            pause_role: Vec::new(),
            min_amount: MIN_WITHDRAWAL_AMOUNT,
            max_amount: MAX_WITHDRAWAL_AMOUNT,
            safe_border_secs: 0,
            finalization_interval_secs: 1,
            max_requests_per_tick: 1000,
            log_level: "debug".to_string(),
            log_json: false,
        }
    }
}

fn role_summary(role: &[Address]) -> String {
    if role.is_empty() {
        "open".to_string()
    } else {
        format!("{} address(es)", role.len())
    }
}

/// Parse an env var with a default, erroring on unparseable values.
fn parse_var<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), format!("unparseable: {value}"))
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated address list; absent or empty means open.
fn parse_address_list(var_name: &str) -> Result<Vec<Address>, ConfigError> {
    let raw = match env::var(var_name) {
        Ok(raw) => raw,
        Err(_) => return Ok(Vec::new()),
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| {
                ConfigError::InvalidValue(var_name.to_string(), format!("bad address: {s}"))
            })
        })
        .collect()
}
