//! Fatal error kinds and their stage / exit-code mapping.

use serde::Serialize;

/// Process exit codes for each failing stage.
pub mod exit_codes {
    pub const OTHER: i32 = 1;
    pub const ENVIRONMENT: i32 = 2;
    pub const NAVIGATION: i32 = 3;
    pub const CAPTURE: i32 = 4;
    pub const RUN_TIMEOUT: i32 = 5;
}

/// The pipeline stage a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Query,
    Session,
    Navigation,
    Capture,
    Run,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Query => "query",
            Stage::Session => "session",
            Stage::Navigation => "navigation",
            Stage::Capture => "capture",
            Stage::Run => "run",
        };
        f.write_str(name)
    }
}

/// Errors that abort a run. Recoverable problems are
/// [`ScrapeWarning`](crate::types::ScrapeWarning)s instead.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Invalid request: {0}")]
    InvalidQuery(String),

    /// Browser binary missing or the process could not be started.
    #[error("Browser environment unavailable: {0}")]
    Environment(String),

    /// The DevTools connection failed after launch.
    #[error("Browser error while {context}: {message}")]
    Browser { context: String, message: String },

    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Network capture for {url} did not settle: {reason}")]
    CaptureTimeout { url: String, reason: String },

    #[error("Run exceeded {timeout_ms}ms and was cancelled")]
    RunTimeout { timeout_ms: u64 },
}

impl ScrapeError {
    pub(crate) fn browser(context: &str, err: impl std::fmt::Display) -> Self {
        ScrapeError::Browser {
            context: context.to_string(),
            message: err.to_string(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            ScrapeError::InvalidQuery(_) => Stage::Query,
            ScrapeError::Environment(_) | ScrapeError::Browser { .. } => Stage::Session,
            ScrapeError::NavigationTimeout { .. } | ScrapeError::Navigation { .. } => {
                Stage::Navigation
            }
            ScrapeError::CaptureTimeout { .. } => Stage::Capture,
            ScrapeError::RunTimeout { .. } => Stage::Run,
        }
    }

    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;
        match self {
            ScrapeError::InvalidQuery(_) => OTHER,
            ScrapeError::Environment(_) | ScrapeError::Browser { .. } => ENVIRONMENT,
            ScrapeError::NavigationTimeout { .. } | ScrapeError::Navigation { .. } => NAVIGATION,
            ScrapeError::CaptureTimeout { .. } => CAPTURE,
            ScrapeError::RunTimeout { .. } => RUN_TIMEOUT,
        }
    }

    /// Whether retrying the same page may succeed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout { .. }
                | ScrapeError::CaptureTimeout { .. }
                | ScrapeError::RunTimeout { .. }
        )
    }
}

/// Convenience result type.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_kinds_have_distinct_exit_codes() {
        let env = ScrapeError::Environment("no chromium".into());
        let nav = ScrapeError::NavigationTimeout {
            url: "https://a".into(),
            timeout_ms: 10,
        };
        let cap = ScrapeError::CaptureTimeout {
            url: "https://a".into(),
            reason: "idle".into(),
        };
        let codes = [env.exit_code(), nav.exit_code(), cap.exit_code()];
        assert_eq!(codes, [2, 3, 4]);
        assert!(codes.iter().all(|c| *c != 0));
    }

    #[test]
    fn test_stage_names() {
        let err = ScrapeError::Navigation {
            url: "https://a".into(),
            message: "net::ERR_NAME_NOT_RESOLVED".into(),
        };
        assert_eq!(err.stage(), Stage::Navigation);
        assert_eq!(err.stage().to_string(), "navigation");
        assert!(!err.is_timeout());
    }
}
