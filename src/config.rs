//! Configuration management for Wayfinder

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Session configuration
///
/// The transition-polling and passive re-validation policies are tuned
/// independently; nothing requires their attempt/interval pairs to match.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL substituted into `{base_url}` in entry URLs and patterns
    pub base_url: Option<String>,

    /// Default element handle caching (per-element policies can override)
    pub cache_elements: bool,

    /// Soft attempts before a page arrival check hard-fails
    pub arrival_attempts: u32,

    /// Bounded wait for each validator element, in milliseconds
    pub validator_wait_ms: u64,

    /// Poll attempts while confirming a page transition
    pub transition_attempts: u32,

    /// Pause between transition poll attempts, in milliseconds
    pub transition_interval_ms: u64,

    /// Sweep attempts while passively re-deriving the active page
    pub revalidate_attempts: u32,

    /// Pause between passive re-validation sweeps, in milliseconds
    pub revalidate_interval_ms: u64,

    /// Full-resolution retries on transient protocol failures
    pub resolve_retries: u32,

    /// Re-read/re-write attempts while converging a value write
    pub set_retries: u32,

    /// Pause between write-convergence attempts, in milliseconds
    pub set_wait_ms: u64,

    /// Poll cadence inside element presence waits, in milliseconds
    pub element_poll_ms: u64,

    /// Debug mode: pause hooks fire and dispatches are captured
    pub debug: bool,

    /// Capture screenshots in replay output
    pub screenshots: bool,

    /// Replay output directory
    pub replay_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            cache_elements: true,
            arrival_attempts: 6,
            validator_wait_ms: 5000,
            transition_attempts: 30,
            transition_interval_ms: 1000,
            revalidate_attempts: 30,
            revalidate_interval_ms: 1000,
            resolve_retries: 3,
            set_retries: 3,
            set_wait_ms: 30000,
            element_poll_ms: 100,
            debug: false,
            screenshots: false,
            replay_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(base_url) = env::var("WAYFINDER_BASE_URL") {
            config.base_url = Some(base_url);
        }

        if let Ok(cache) = env::var("WAYFINDER_CACHE_ELEMENTS") {
            config.cache_elements = cache
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_CACHE_ELEMENTS"))?;
        }

        if let Ok(attempts) = env::var("WAYFINDER_ARRIVAL_ATTEMPTS") {
            config.arrival_attempts = attempts
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_ARRIVAL_ATTEMPTS"))?;
        }

        if let Ok(wait) = env::var("WAYFINDER_VALIDATOR_WAIT_MS") {
            config.validator_wait_ms = wait
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_VALIDATOR_WAIT_MS"))?;
        }

        if let Ok(attempts) = env::var("WAYFINDER_TRANSITION_ATTEMPTS") {
            config.transition_attempts = attempts
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_TRANSITION_ATTEMPTS"))?;
        }

        if let Ok(interval) = env::var("WAYFINDER_TRANSITION_INTERVAL_MS") {
            config.transition_interval_ms = interval
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_TRANSITION_INTERVAL_MS"))?;
        }

        if let Ok(attempts) = env::var("WAYFINDER_REVALIDATE_ATTEMPTS") {
            config.revalidate_attempts = attempts
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_REVALIDATE_ATTEMPTS"))?;
        }

        if let Ok(interval) = env::var("WAYFINDER_REVALIDATE_INTERVAL_MS") {
            config.revalidate_interval_ms = interval
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_REVALIDATE_INTERVAL_MS"))?;
        }

        if let Ok(retries) = env::var("WAYFINDER_RESOLVE_RETRIES") {
            config.resolve_retries = retries
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_RESOLVE_RETRIES"))?;
        }

        if let Ok(retries) = env::var("WAYFINDER_SET_RETRIES") {
            config.set_retries = retries
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_SET_RETRIES"))?;
        }

        if let Ok(wait) = env::var("WAYFINDER_SET_WAIT_MS") {
            config.set_wait_ms = wait
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_SET_WAIT_MS"))?;
        }

        if let Ok(poll) = env::var("WAYFINDER_ELEMENT_POLL_MS") {
            config.element_poll_ms = poll
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_ELEMENT_POLL_MS"))?;
        }

        if let Ok(debug) = env::var("WAYFINDER_DEBUG") {
            config.debug = debug
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_DEBUG"))?;
        }

        if let Ok(screenshots) = env::var("WAYFINDER_SCREENSHOTS") {
            config.screenshots = screenshots
                .parse()
                .map_err(|_| Error::configuration("Invalid WAYFINDER_SCREENSHOTS"))?;
        }

        if let Ok(dir) = env::var("WAYFINDER_REPLAY_DIR") {
            config.replay_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.cache_elements);
        assert_eq!(config.arrival_attempts, 6);
        assert_eq!(config.validator_wait_ms, 5000);
        assert_eq!(config.transition_attempts, 30);
        assert_eq!(config.resolve_retries, 3);
        assert_eq!(config.set_retries, 3);
        assert_eq!(config.set_wait_ms, 30000);
        assert!(!config.debug);
    }

    #[test]
    fn test_from_file_partial() {
        let path = std::env::temp_dir().join("wayfinder_config_test.toml");
        std::fs::write(
            &path,
            "base_url = \"https://example.com\"\ntransition_attempts = 5\ndebug = true\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.base_url.as_deref(), Some("https://example.com"));
        assert_eq!(config.transition_attempts, 5);
        assert!(config.debug);
        // Unspecified keys keep their defaults
        assert_eq!(config.arrival_attempts, 6);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let path = std::env::temp_dir().join("wayfinder_config_bad.toml");
        std::fs::write(&path, "transition_attempts = \"lots\"\n").unwrap();

        let result = Config::from_file(path.to_str().unwrap());
        assert!(matches!(result, Err(Error::Configuration(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_env_override() {
        env::set_var("WAYFINDER_SET_RETRIES", "7");
        env::set_var("WAYFINDER_BASE_URL", "https://env.example.com");

        let config = Config::from_env().unwrap();
        assert_eq!(config.set_retries, 7);
        assert_eq!(config.base_url.as_deref(), Some("https://env.example.com"));

        env::remove_var("WAYFINDER_SET_RETRIES");
        env::remove_var("WAYFINDER_BASE_URL");
    }
}
