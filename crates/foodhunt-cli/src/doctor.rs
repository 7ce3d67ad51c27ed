//! Environment readiness check.

use std::path::PathBuf;

use foodhunt::{find_chromium, ScrapeConfig, ScrapeError};
use serde::Serialize;

/// What `foodhunt doctor` found.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub os: &'static str,
    pub arch: &'static str,
    pub chromium: Option<PathBuf>,
    pub headless: bool,
    pub display: Option<String>,
    pub temp_dir: PathBuf,
    pub temp_dir_writable: bool,
    pub navigation_timeout_secs: u64,
    pub max_concurrent_tabs: usize,
    pub threshold: f64,
}

impl DoctorReport {
    /// A run can start: a browser exists, profiles can be created, and a
    /// headed browser has a display to draw on.
    pub fn ready(&self) -> bool {
        self.chromium.is_some()
            && self.temp_dir_writable
            && (self.headless || self.display.is_some() || !cfg!(target_os = "linux"))
    }
}

/// Inspect the environment without launching anything.
pub fn check(config: &ScrapeConfig) -> DoctorReport {
    let temp_dir = std::env::temp_dir();
    DoctorReport {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        chromium: find_chromium(config.browser.chromium_path.as_ref()),
        headless: config.browser.headless,
        display: std::env::var("DISPLAY").ok().filter(|d| !d.is_empty()),
        temp_dir_writable: is_writable(&temp_dir),
        temp_dir,
        navigation_timeout_secs: config.browser.navigation_timeout.as_secs(),
        max_concurrent_tabs: config.follow.max_concurrent_tabs,
        threshold: config.threshold,
    }
}

/// Print the check. Fails with an environment error when not ready.
pub fn run(config: &ScrapeConfig, json: bool) -> anyhow::Result<()> {
    let report = check(config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.ready() {
        Ok(())
    } else {
        Err(ScrapeError::Environment(not_ready_reason(&report)).into())
    }
}

fn print_report(report: &DoctorReport) {
    println!("foodhunt doctor");
    println!("===============");
    println!();
    println!("OS:   {}", report.os);
    println!("Arch: {}", report.arch);
    println!();

    match &report.chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome/Chromium or set FOODHUNT_CHROMIUM_PATH."
        ),
    }

    if report.temp_dir_writable {
        println!("[OK] Temp dir writable: {}", report.temp_dir.display());
    } else {
        println!("[!!] Temp dir not writable: {}", report.temp_dir.display());
    }

    match (report.headless, &report.display) {
        (true, _) => println!("[OK] Headless mode"),
        (false, Some(display)) => println!("[OK] Headed mode on DISPLAY={display}"),
        (false, None) => println!("[!!] Headed mode but DISPLAY is not set (start Xvfb?)"),
    }

    println!();
    println!("Navigation timeout: {}s", report.navigation_timeout_secs);
    println!("Max tabs:           {}", report.max_concurrent_tabs);
    println!("Threshold:          {}", report.threshold);
    println!();

    if report.ready() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
}

fn not_ready_reason(report: &DoctorReport) -> String {
    if report.chromium.is_none() {
        "no Chromium binary found".to_string()
    } else if !report.temp_dir_writable {
        format!("temp dir {} is not writable", report.temp_dir.display())
    } else {
        "headed mode requested without a display".to_string()
    }
}

fn is_writable(dir: &std::path::Path) -> bool {
    let probe = dir.join(format!(".foodhunt-probe-{}", std::process::id()));
    match std::fs::write(&probe, b"ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_explicit_chromium_is_not_ready() {
        let mut config = ScrapeConfig::default();
        config.browser.chromium_path = Some(PathBuf::from("/nonexistent/foodhunt/chrome"));
        let report = check(&config);
        assert!(report.chromium.is_none());
        assert!(!report.ready());
        assert_eq!(not_ready_reason(&report), "no Chromium binary found");
    }

    #[test]
    fn test_temp_dir_probe() {
        assert!(is_writable(&std::env::temp_dir()));
        assert!(!is_writable(std::path::Path::new("/nonexistent/foodhunt")));
    }
}
