//! Configuration for the assembly pipeline
//!
//! Values are plain numbers and enums read once at start-up. They can be
//! loaded from a TOML file, overridden through `ASSEMBLY_*` environment
//! variables, or built in code from the defaults.
//!
//! ```toml
//! [decomposition]
//! max_sources = 100
//! max_duration_ms = 3600000
//! policy = "default"
//!
//! [correlation]
//! pivot_size = 64
//!
//! [streams]
//! max_streams = 4
//!
//! [timeout]
//! limit = 30
//! unit = "seconds"
//! cancel_mode = "soft"
//! ```

use crate::decomposition::DecompositionPolicy;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssemblyConfig {
    /// Query decomposition limits
    #[serde(default)]
    pub decomposition: DecompositionConfig,

    /// Correlator concurrency
    #[serde(default)]
    pub correlation: CorrelationConfig,

    /// Parallel fetch streams and hand-off buffer
    #[serde(default)]
    pub streams: StreamConfig,

    /// Overall assembly time limit
    #[serde(default)]
    pub timeout: TimeoutConfig,
}

/// Query decomposition configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecompositionConfig {
    /// Decompose oversized requests into sub-queries
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum sources per sub-query
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,

    /// Maximum time range per sub-query in milliseconds
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,

    /// Strategy selection policy
    #[serde(default)]
    pub policy: DecompositionPolicy,
}

/// Correlator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorrelationConfig {
    /// Allow parallel column insertion
    #[serde(default = "default_true")]
    pub concurrency_enabled: bool,

    /// Column count above which insertion runs in parallel
    #[serde(default = "default_pivot_size")]
    pub pivot_size: usize,

    /// Threads in the insertion pool
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

/// Fetch stream configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Maximum concurrent fetch streams
    #[serde(default = "default_max_streams")]
    pub max_streams: usize,

    /// Capacity of the fragment hand-off buffer
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Poll timeout used to detect producer stalls, in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Maximum fragments handed to the correlator at once
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Time unit of the assembly limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Nanoseconds
    Nanoseconds,
    /// Microseconds
    Microseconds,
    /// Milliseconds
    Milliseconds,
    /// Seconds
    #[default]
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
}

impl TimeUnit {
    /// Convert `amount` of this unit to a `Duration`
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3600)),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ns" | "nanoseconds" => Some(TimeUnit::Nanoseconds),
            "us" | "microseconds" => Some(TimeUnit::Microseconds),
            "ms" | "milliseconds" => Some(TimeUnit::Milliseconds),
            "s" | "seconds" => Some(TimeUnit::Seconds),
            "m" | "minutes" => Some(TimeUnit::Minutes),
            "h" | "hours" => Some(TimeUnit::Hours),
            _ => None,
        }
    }
}

/// How in-flight fetch workers are stopped when the limit expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelMode {
    /// Let each worker finish its current fragment, then stop
    #[default]
    Soft,
    /// Abort workers immediately
    Hard,
}

/// Assembly timeout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Limit, in `unit`s
    #[serde(default = "default_timeout_limit")]
    pub limit: u64,

    /// Unit of `limit`
    #[serde(default)]
    pub unit: TimeUnit,

    /// Worker cancellation on expiry
    #[serde(default)]
    pub cancel_mode: CancelMode,
}

impl TimeoutConfig {
    /// The limit as a `Duration`
    pub fn duration(&self) -> Duration {
        self.unit.to_duration(self.limit)
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_max_sources() -> usize {
    100
}
fn default_max_duration_ms() -> u64 {
    3_600_000
}
fn default_pivot_size() -> usize {
    64
}
fn default_max_threads() -> usize {
    num_cpus::get()
}
fn default_max_streams() -> usize {
    4
}
fn default_buffer_capacity() -> usize {
    1024
}
fn default_poll_timeout_ms() -> u64 {
    500
}
fn default_batch_size() -> usize {
    256
}
fn default_timeout_limit() -> u64 {
    30
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sources: default_max_sources(),
            max_duration_ms: default_max_duration_ms(),
            policy: DecompositionPolicy::default(),
        }
    }
}

impl DecompositionConfig {
    /// Maximum sub-query duration
    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            concurrency_enabled: true,
            pivot_size: default_pivot_size(),
            max_threads: default_max_threads(),
        }
    }
}

impl CorrelationConfig {
    /// Serial-only configuration
    pub fn serial() -> Self {
        Self {
            concurrency_enabled: false,
            ..Self::default()
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_streams: default_max_streams(),
            buffer_capacity: default_buffer_capacity(),
            poll_timeout_ms: default_poll_timeout_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl StreamConfig {
    /// Poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            limit: default_timeout_limit(),
            unit: TimeUnit::default(),
            cancel_mode: CancelMode::default(),
        }
    }
}

impl AssemblyConfig {
    /// Maximum allowed fetch streams
    const MAX_STREAMS: usize = 256;

    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Load configuration from a file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `ASSEMBLY_*` environment variable overrides
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        // Decomposition
        override_parsed("ASSEMBLY_MAX_SOURCES", &mut self.decomposition.max_sources);
        override_parsed(
            "ASSEMBLY_MAX_DURATION_MS",
            &mut self.decomposition.max_duration_ms,
        );
        override_parsed("ASSEMBLY_DECOMPOSITION_ENABLED", &mut self.decomposition.enabled);
        if let Ok(policy) = std::env::var("ASSEMBLY_DECOMPOSITION_POLICY") {
            match policy.to_ascii_lowercase().as_str() {
                "default" => self.decomposition.policy = DecompositionPolicy::Default,
                "preferred" => self.decomposition.policy = DecompositionPolicy::Preferred,
                other => tracing::warn!(value = other, "Ignoring unknown decomposition policy"),
            }
        }

        // Correlation
        override_parsed(
            "ASSEMBLY_CORRELATION_CONCURRENCY",
            &mut self.correlation.concurrency_enabled,
        );
        override_parsed("ASSEMBLY_PIVOT_SIZE", &mut self.correlation.pivot_size);
        override_parsed("ASSEMBLY_MAX_THREADS", &mut self.correlation.max_threads);

        // Streams
        override_parsed("ASSEMBLY_MAX_STREAMS", &mut self.streams.max_streams);
        override_parsed("ASSEMBLY_BUFFER_CAPACITY", &mut self.streams.buffer_capacity);
        override_parsed("ASSEMBLY_POLL_TIMEOUT_MS", &mut self.streams.poll_timeout_ms);

        // Timeout
        override_parsed("ASSEMBLY_TIMEOUT_LIMIT", &mut self.timeout.limit);
        if let Ok(unit) = std::env::var("ASSEMBLY_TIMEOUT_UNIT") {
            match TimeUnit::parse(&unit) {
                Some(u) => self.timeout.unit = u,
                None => tracing::warn!(value = %unit, "Ignoring unknown timeout unit"),
            }
        }
        if let Ok(mode) = std::env::var("ASSEMBLY_CANCEL_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "soft" => self.timeout.cancel_mode = CancelMode::Soft,
                "hard" => self.timeout.cancel_mode = CancelMode::Hard,
                other => tracing::warn!(value = other, "Ignoring unknown cancel mode"),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.decomposition.max_sources == 0 {
            return Err(Error::Configuration("max_sources must be > 0".to_string()));
        }
        if self.decomposition.max_duration_ms == 0 {
            return Err(Error::Configuration(
                "max_duration_ms must be > 0".to_string(),
            ));
        }
        if self.correlation.max_threads == 0 {
            return Err(Error::Configuration("max_threads must be > 0".to_string()));
        }
        if self.streams.max_streams == 0 || self.streams.max_streams > Self::MAX_STREAMS {
            return Err(Error::Configuration(format!(
                "max_streams {} must be between 1 and {}",
                self.streams.max_streams,
                Self::MAX_STREAMS
            )));
        }
        if self.streams.buffer_capacity == 0 {
            return Err(Error::Configuration(
                "buffer_capacity must be > 0".to_string(),
            ));
        }
        if self.streams.poll_timeout_ms == 0 {
            return Err(Error::Configuration(
                "poll_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.streams.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be > 0".to_string()));
        }
        if self.timeout.limit == 0 {
            return Err(Error::Configuration(
                "timeout limit must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))
    }
}

fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(v) => *target = v,
            Err(_) => tracing::warn!(variable = var, value = %raw, "Ignoring unparseable override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AssemblyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.decomposition.max_sources, 100);
        assert_eq!(config.timeout.duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_validation() {
        let mut config = AssemblyConfig::default();
        config.streams.max_streams = 0;
        assert!(config.validate().is_err());

        let mut config = AssemblyConfig::default();
        config.decomposition.max_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config = AssemblyConfig::from_toml_str(
            r#"
            [decomposition]
            max_sources = 25
            policy = "preferred"

            [timeout]
            limit = 1500
            unit = "milliseconds"
            cancel_mode = "hard"
            "#,
        )
        .unwrap();
        assert_eq!(config.decomposition.max_sources, 25);
        assert_eq!(config.decomposition.max_duration_ms, 3_600_000);
        assert_eq!(config.decomposition.policy, DecompositionPolicy::Preferred);
        assert_eq!(config.timeout.duration(), Duration::from_millis(1500));
        assert_eq!(config.timeout.cancel_mode, CancelMode::Hard);
        assert_eq!(config.streams.max_streams, 4);
    }

    #[test]
    fn test_bad_toml() {
        assert!(AssemblyConfig::from_toml_str("[streams]\nmax_streams = \"many\"").is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let mut config = AssemblyConfig::default();
        config.streams.max_streams = 9;
        let text = config.to_toml_string().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let loaded = AssemblyConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.streams.max_streams, 9);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("ASSEMBLY_PIVOT_SIZE", "7");
        std::env::set_var("ASSEMBLY_TIMEOUT_UNIT", "ms");
        let config = AssemblyConfig::from_env();
        std::env::remove_var("ASSEMBLY_PIVOT_SIZE");
        std::env::remove_var("ASSEMBLY_TIMEOUT_UNIT");
        assert_eq!(config.correlation.pivot_size, 7);
        assert_eq!(config.timeout.unit, TimeUnit::Milliseconds);
    }

    #[test]
    fn test_time_units() {
        assert_eq!(TimeUnit::Minutes.to_duration(2), Duration::from_secs(120));
        assert_eq!(TimeUnit::parse("h"), Some(TimeUnit::Hours));
        assert_eq!(TimeUnit::parse("fortnights"), None);
    }
}
