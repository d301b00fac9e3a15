use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatchdogError};

/// Watchdog configuration.
///
/// All fields default to the values a bare deployment expects; the only
/// hard constraint is `max_stale_retries >= 2`, checked by [`validate`]
/// (and by `Watchdog::new`) before any state is bound.
///
/// [`validate`]: WatchdogConfig::validate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Polling interval between check cycles, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Name of the shared hash holding per-lock heartbeat counters.
    #[serde(default = "default_hash_key")]
    pub redlock_hash_key: String,

    /// Name of the companion hash holding per-lock metadata.
    #[serde(default = "default_info_key")]
    pub redlock_info_key: String,

    /// Consecutive unchanged-counter cycles before a lock is declared stale.
    #[serde(default = "default_max_stale_retries")]
    pub max_stale_retries: u32,

    /// Keep this process's own locks alive but skip the staleness scan.
    #[serde(default)]
    pub only_heartbeat: bool,

    /// Emit per-cycle internal state at debug level.
    #[serde(default)]
    pub debug: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            redlock_hash_key: default_hash_key(),
            redlock_info_key: default_info_key(),
            max_stale_retries: default_max_stale_retries(),
            only_heartbeat: false,
            debug: false,
        }
    }
}

impl WatchdogConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| WatchdogError::Config(format!("Failed to read config file: {}", e)))?;

        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        // Substitute environment variables
        let content = substitute_env_vars(content);

        let config: Self = toml::from_str(&content)
            .map_err(|e| WatchdogError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration constraints.
    ///
    /// A threshold below 2 would declare a lock stale on the very first
    /// cycle its counter is observed, before the owner had a chance to
    /// heartbeat even once.
    pub fn validate(&self) -> Result<()> {
        if self.max_stale_retries < 2 {
            return Err(WatchdogError::Config(
                "max_stale_retries must be 2 or more".to_string(),
            ));
        }
        Ok(())
    }

    /// The polling interval as a [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn default_delay_ms() -> u64 {
    60_000 // 1min
}

fn default_hash_key() -> String {
    "redlock_list".to_string()
}

fn default_info_key() -> String {
    "redlock_info".to_string()
}

fn default_max_stale_retries() -> u32 {
    5 // wait 5min until a zombie lock is removed, at the default delay
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
