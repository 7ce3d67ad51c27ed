//! Command-line overrides layered on top of the environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use foodhunt::ScrapeConfig;

/// Browser and capture flags shared by `scan` and `restaurants`.
#[derive(Debug, Clone, Default, Args)]
pub struct BrowserArgs {
    /// Show the browser window (needs a display, e.g. Xvfb).
    #[arg(long)]
    pub headed: bool,

    /// Navigation timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Quiet period that ends network capture, in milliseconds.
    #[arg(long, value_name = "MS")]
    pub idle_ms: Option<u64>,

    /// Maximum tabs open at once while fetching restaurant menus.
    #[arg(long, value_name = "N")]
    pub max_tabs: Option<usize>,

    /// Chromium or Chrome binary to launch.
    #[arg(long, value_name = "PATH")]
    pub chromium: Option<PathBuf>,
}

impl BrowserArgs {
    /// Apply the flags that were given; everything else keeps its env/default value.
    pub fn apply(&self, mut config: ScrapeConfig) -> ScrapeConfig {
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(secs) = self.timeout {
            config.browser.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.idle_ms {
            config.capture.settle.idle = Duration::from_millis(ms);
        }
        if let Some(tabs) = self.max_tabs {
            config.follow.max_concurrent_tabs = tabs.max(1);
        }
        if let Some(path) = &self.chromium {
            config.browser.chromium_path = Some(path.clone());
        }
        config
    }
}

/// Resolve the configuration for a `scan` run.
pub fn scan_config(
    base: ScrapeConfig,
    browser: &BrowserArgs,
    threshold: Option<f64>,
    no_follow: bool,
) -> anyhow::Result<ScrapeConfig> {
    let mut config = browser.apply(base);
    if let Some(threshold) = threshold {
        anyhow::ensure!(
            threshold.is_finite() && threshold >= 0.0,
            "threshold must be a non-negative number, got {threshold}"
        );
        config.threshold = threshold;
    }
    if no_follow {
        config.follow.enabled = false;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_keep_env_values() {
        let base = ScrapeConfig::from_lookup(|key| match key {
            "FOODHUNT_TIMEOUT" => Some("25".into()),
            "FOODHUNT_IDLE_MS" => Some("750".into()),
            _ => None,
        });
        let config = BrowserArgs::default().apply(base);
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(25));
        assert_eq!(config.capture.settle.idle, Duration::from_millis(750));
        assert!(config.browser.headless);
    }

    #[test]
    fn test_flags_override_env() {
        let base = ScrapeConfig::from_lookup(|key| match key {
            "FOODHUNT_TIMEOUT" => Some("25".into()),
            "FOODHUNT_MAX_CONCURRENT_TABS" => Some("8".into()),
            _ => None,
        });
        let args = BrowserArgs {
            headed: true,
            timeout: Some(5),
            idle_ms: None,
            max_tabs: Some(0),
            chromium: Some(PathBuf::from("/opt/chrome/chrome")),
        };
        let config = args.apply(base);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.navigation_timeout, Duration::from_secs(5));
        assert_eq!(config.follow.max_concurrent_tabs, 1);
        assert_eq!(
            config.browser.chromium_path,
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn test_scan_config_threshold_and_follow() {
        let config =
            scan_config(ScrapeConfig::default(), &BrowserArgs::default(), Some(50.0), true).unwrap();
        assert_eq!(config.threshold, 50.0);
        assert!(!config.follow.enabled);

        let config =
            scan_config(ScrapeConfig::default(), &BrowserArgs::default(), None, false).unwrap();
        assert_eq!(config.threshold, foodhunt::DEFAULT_THRESHOLD);
        assert!(config.follow.enabled);
    }

    #[test]
    fn test_scan_config_rejects_negative_threshold() {
        let result = scan_config(ScrapeConfig::default(), &BrowserArgs::default(), Some(-1.0), false);
        assert!(result.is_err());
    }
}
