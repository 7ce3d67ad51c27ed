//! tracing-subscriber setup. Logs always go to stderr so stdout stays
//! clean for reports.

use tracing_subscriber::EnvFilter;

const DEFAULT_LEVEL: &str = "info";

/// Filter used when `RUST_LOG` is unset: the flag, then `FOODHUNT_LOG_LEVEL`, then `info`.
pub fn fallback_directive(flag: Option<&str>, env_level: Option<String>) -> String {
    flag.map(str::to_string)
        .or(env_level)
        .map(|level| level.trim().to_string())
        .filter(|level| !level.is_empty())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string())
}

/// Install the global subscriber. `FOODHUNT_LOG_FORMAT=json` emits JSON lines.
pub fn init(flag: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = fallback_directive(flag, std::env::var("FOODHUNT_LOG_LEVEL").ok());
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    });

    let json = std::env::var("FOODHUNT_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_beats_env_level() {
        assert_eq!(fallback_directive(Some("debug"), Some("warn".into())), "debug");
    }

    #[test]
    fn test_env_level_then_default() {
        assert_eq!(fallback_directive(None, Some("warn".into())), "warn");
        assert_eq!(fallback_directive(None, None), "info");
        assert_eq!(fallback_directive(None, Some("  ".into())), "info");
    }
}
