//! foodhunt command-line front end: flag resolution, logging, reporting,
//! environment checks and the optional HTTP endpoint.

pub mod config;
pub mod doctor;
pub mod logging;
pub mod report;
#[cfg(feature = "server")]
pub mod server;

pub use config::BrowserArgs;
pub use report::{exit_code, render_deals, render_error, render_restaurants};
