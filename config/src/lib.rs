//! CBD Configuration
//!
//! Shared configuration crate for the CBD client components.
//!
//! Handles loading configuration from:
//! 1. CBD_CONFIG env var (explicit path)
//! 2. ./cbd.toml (current directory)
//! 3. ~/.cbd/config.toml (user home)
//!
//! Environment variables take precedence over TOML config. The loaded
//! config is passed explicitly to whoever needs it; there is no global.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

const LOCAL_CONFIG_FILE: &str = "cbd.toml";
const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = ".cbd";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_PORTER_URI: &str = "https://porter-tapir.nucypher.community";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_THRESHOLD: usize = 3;
const DEFAULT_SHARES: usize = 5;
const DEFAULT_NODE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_DEADLINE_MS: u64 = 30_000;
const DEFAULT_CHAIN_ID: u64 = 5;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbdConfig {
    #[serde(default)]
    pub porter: PorterConfig,
    #[serde(default)]
    pub cohort: CohortConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conditions: ConditionsConfig,
}

/// Discovery service connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PorterConfig {
    #[serde(default = "default_porter_uri")]
    pub uri: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for PorterConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_PORTER_URI.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

fn default_porter_uri() -> String {
    DEFAULT_PORTER_URI.into()
}
fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

/// Default policy shape (m-of-n)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortConfig {
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default = "default_shares")]
    pub shares: usize,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            shares: DEFAULT_SHARES,
        }
    }
}

fn default_threshold() -> usize {
    DEFAULT_THRESHOLD
}
fn default_shares() -> usize {
    DEFAULT_SHARES
}

/// Work order dispatch limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Bound on a single node's response
    #[serde(default = "default_node_timeout")]
    pub node_timeout_ms: u64,
    /// Bound on a whole retrieval call
    #[serde(default = "default_deadline")]
    pub deadline_ms: u64,
    /// Nodes contacted up front; unset means every assigned node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_fanout: Option<usize>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: DEFAULT_NODE_TIMEOUT_MS,
            deadline_ms: DEFAULT_DEADLINE_MS,
            initial_fanout: None,
        }
    }
}

impl RetrievalConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

fn default_node_timeout() -> u64 {
    DEFAULT_NODE_TIMEOUT_MS
}
fn default_deadline() -> u64 {
    DEFAULT_DEADLINE_MS
}

/// Condition defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionsConfig {
    #[serde(default = "default_chain_id")]
    pub default_chain_id: u64,
}

impl Default for ConditionsConfig {
    fn default() -> Self {
        Self {
            default_chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

fn default_chain_id() -> u64 {
    DEFAULT_CHAIN_ID
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

/// Set field from env var if present
fn env_string(key: &str, field: &mut String) {
    if let Ok(v) = env::var(key) {
        *field = v;
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(key: &str, field: &mut T) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

/// Set Option<T> from env var if present and parseable
fn env_parse_option<T: std::str::FromStr>(key: &str, field: &mut Option<T>) {
    if let Ok(v) = env::var(key) {
        match v.parse() {
            Ok(parsed) => *field = Some(parsed),
            Err(_) => log::warn!("Ignoring unparseable {}={}", key, v),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl CbdConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => Self::read_file(&path)?,
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        log::info!("Loading config from: {}", path.display());
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check CBD_CONFIG env var
        if let Ok(path) = env::var("CBD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("CBD_CONFIG points at missing file: {}", path.display());
        }

        // 2. Check ./cbd.toml (current directory)
        let local_path = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.cbd/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Porter
        env_string("CBD_PORTER_URI", &mut self.porter.uri);

        // Cohort
        env_parse("CBD_THRESHOLD", &mut self.cohort.threshold);
        env_parse("CBD_SHARES", &mut self.cohort.shares);

        // Retrieval
        env_parse("CBD_NODE_TIMEOUT_MS", &mut self.retrieval.node_timeout_ms);
        env_parse("CBD_RETRIEVAL_DEADLINE_MS", &mut self.retrieval.deadline_ms);
        env_parse_option("CBD_INITIAL_FANOUT", &mut self.retrieval.initial_fanout);

        // Conditions
        env_parse("CBD_CHAIN_ID", &mut self.conditions.default_chain_id);
    }

    /// Reject settings no policy or retrieval could run under
    pub fn validate(&self) -> Result<()> {
        let CohortConfig { threshold, shares } = self.cohort;
        if threshold == 0 {
            bail!("cohort.threshold must be at least 1");
        }
        if threshold > shares {
            bail!(
                "cohort.threshold ({}) exceeds cohort.shares ({})",
                threshold,
                shares
            );
        }
        if self.retrieval.node_timeout_ms > self.retrieval.deadline_ms {
            bail!(
                "retrieval.node_timeout_ms ({}) exceeds retrieval.deadline_ms ({})",
                self.retrieval.node_timeout_ms,
                self.retrieval.deadline_ms
            );
        }
        if self.retrieval.initial_fanout == Some(0) {
            bail!("retrieval.initial_fanout must be at least 1 when set");
        }
        if self.conditions.default_chain_id == 0 {
            bail!("conditions.default_chain_id must be non-zero");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.retrieval.initial_fanout = Some(DEFAULT_SHARES);
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
