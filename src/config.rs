//! Binding configuration - sizes of the per-connection native buffers
//!
//! Loaded from TOML (`ydbvp.toml`) and/or `YDBVP_*` environment variables.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::plist::MAX_VPARAMS;

/// Maximum length of an engine error message
pub const YDB_MAX_ERRORMSG: u32 = 1024;

/// Maximum length of an engine string value
pub const YDB_MAX_STR: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plist: PlistConfig,

    #[serde(default)]
    pub conn: ConnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlistConfig {
    /// Slots allocated for each connection's parameter list
    #[serde(default = "default_max_params")]
    pub max_params: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnConfig {
    /// Size of the error string buffer handed to every engine call
    #[serde(default = "default_errstr_size")]
    pub errstr_size: u32,

    /// Extra bytes reserved whenever the value buffer grows
    #[serde(default = "default_overalloc")]
    pub value_overalloc: u32,

    /// Largest value the value buffer may grow to
    #[serde(default = "default_max_string")]
    pub max_string: usize,
}

impl Default for PlistConfig {
    fn default() -> Self {
        Self {
            max_params: default_max_params(),
        }
    }
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            errstr_size: default_errstr_size(),
            value_overalloc: default_overalloc(),
            max_string: default_max_string(),
        }
    }
}

fn default_max_params() -> usize { MAX_VPARAMS }
fn default_errstr_size() -> u32 { YDB_MAX_ERRORMSG }
fn default_overalloc() -> u32 { 1024 }
fn default_max_string() -> usize { YDB_MAX_STR }

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `YDBVP_MAX_PARAMS`, `YDBVP_ERRSTR_SIZE`,
    /// `YDBVP_VALUE_OVERALLOC` and `YDBVP_MAX_STRING`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `YDBVP_*` overrides on top of this configuration
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_number("YDBVP_MAX_PARAMS")? {
            self.plist.max_params = v;
        }
        if let Some(v) = env_number("YDBVP_ERRSTR_SIZE")? {
            self.conn.errstr_size = v;
        }
        if let Some(v) = env_number("YDBVP_VALUE_OVERALLOC")? {
            self.conn.value_overalloc = v;
        }
        if let Some(v) = env_number("YDBVP_MAX_STRING")? {
            self.conn.max_string = v;
        }
        self.validate()
    }

    /// Check limits the native side depends on
    pub fn validate(&self) -> Result<()> {
        if self.plist.max_params == 0 || self.plist.max_params > MAX_VPARAMS {
            return Err(Error::Config(format!(
                "plist.max_params must be 1..={}, got {}",
                MAX_VPARAMS, self.plist.max_params
            )));
        }
        if self.conn.errstr_size == 0 {
            return Err(Error::Config("conn.errstr_size must be positive".into()));
        }
        if self.conn.max_string == 0 || self.conn.max_string > YDB_MAX_STR {
            return Err(Error::Config(format!(
                "conn.max_string must be 1..={}, got {}",
                YDB_MAX_STR, self.conn.max_string
            )));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a number: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
