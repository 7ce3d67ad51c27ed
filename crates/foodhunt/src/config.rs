//! Run configuration: defaults plus `FOODHUNT_*` environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::capture::{EndpointPattern, SettlePolicy};

/// Default price threshold, in the site's local currency.
pub const DEFAULT_THRESHOLD: f64 = 100.0;

/// Currency label used when a payload does not name one.
pub const DEFAULT_CURRENCY: &str = "₫";

/// How the browser is launched.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Explicit Chromium binary; falls back to discovery when `None`.
    pub chromium_path: Option<PathBuf>,
    /// Headed mode needs a display (e.g. Xvfb) provided by the host.
    pub headless: bool,
    pub window_size: (u32, u32),
    pub navigation_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
            window_size: (1280, 900),
            navigation_timeout: Duration::from_secs(10),
        }
    }
}

/// Which responses are captured and when capture ends.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub patterns: Vec<EndpointPattern>,
    /// Channel capacity between the network listener and the drain reader.
    pub capacity: usize,
    pub settle: SettlePolicy,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            patterns: EndpointPattern::defaults(),
            capacity: 256,
            settle: SettlePolicy::default(),
        }
    }
}

/// Restaurant-page visits for menus the search page did not load.
#[derive(Debug, Clone)]
pub struct FollowSettings {
    pub enabled: bool,
    pub max_concurrent_tabs: usize,
    pub retries: u32,
    pub retry_backoff: Duration,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_tabs: 3,
            retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Full configuration of one run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub threshold: f64,
    pub currency: String,
    pub run_timeout: Duration,
    pub browser: BrowserSettings,
    pub capture: CaptureSettings,
    pub follow: FollowSettings,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            currency: DEFAULT_CURRENCY.to_string(),
            run_timeout: Duration::from_secs(120),
            browser: BrowserSettings::default(),
            capture: CaptureSettings::default(),
            follow: FollowSettings::default(),
        }
    }
}

impl ScrapeConfig {
    /// Defaults overridden by `FOODHUNT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<f64, _>(&lookup, "FOODHUNT_THRESHOLD") {
            if v.is_finite() && v >= 0.0 {
                config.threshold = v;
            } else {
                tracing::warn!(value = v, "ignoring FOODHUNT_THRESHOLD");
            }
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOODHUNT_TIMEOUT") {
            config.browser.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "FOODHUNT_IDLE_MS") {
            config.capture.settle.idle = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOODHUNT_CAPTURE_TIMEOUT") {
            config.capture.settle.overall = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FOODHUNT_RUN_TIMEOUT") {
            config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(tabs) = parse_var::<usize, _>(&lookup, "FOODHUNT_MAX_CONCURRENT_TABS") {
            config.follow.max_concurrent_tabs = tabs.max(1);
        }
        if let Some(headless) = parse_var::<bool, _>(&lookup, "FOODHUNT_HEADLESS") {
            config.browser.headless = headless;
        }
        if let Some(path) = lookup("FOODHUNT_CHROMIUM_PATH").filter(|p| !p.is_empty()) {
            config.browser.chromium_path = Some(PathBuf::from(path));
        }
        if let Some(currency) = lookup("FOODHUNT_CURRENCY").filter(|c| !c.is_empty()) {
            config.currency = currency;
        }

        config
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::from_lookup(|_| None);
        assert_eq!(config.threshold, 100.0);
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(10));
        assert_eq!(config.follow.max_concurrent_tabs, 3);
        assert!(config.browser.headless);
        assert_eq!(config.capture.patterns.len(), 2);
    }

    #[test]
    fn test_env_overrides() {
        let config = ScrapeConfig::from_lookup(lookup_from(&[
            ("FOODHUNT_TIMEOUT", "25"),
            ("FOODHUNT_MAX_CONCURRENT_TABS", "5"),
            ("FOODHUNT_HEADLESS", "false"),
            ("FOODHUNT_IDLE_MS", "750"),
            ("FOODHUNT_CHROMIUM_PATH", "/usr/bin/chromium"),
        ]));
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(25));
        assert_eq!(config.follow.max_concurrent_tabs, 5);
        assert!(!config.browser.headless);
        assert_eq!(config.capture.settle.idle, Duration::from_millis(750));
        assert_eq!(
            config.browser.chromium_path,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        let config = ScrapeConfig::from_lookup(lookup_from(&[
            ("FOODHUNT_TIMEOUT", "soon"),
            ("FOODHUNT_THRESHOLD", "-5"),
            ("FOODHUNT_MAX_CONCURRENT_TABS", "0"),
        ]));
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(10));
        assert_eq!(config.threshold, 100.0);
        assert_eq!(config.follow.max_concurrent_tabs, 1);
    }
}
