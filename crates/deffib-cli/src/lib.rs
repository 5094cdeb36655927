//! Consumer side of the deferred fill: configuration and the dispatch-then-poll session used by
//! the `deffib` binary.

mod config;
#[cfg(target_os = "linux")]
mod session;

pub use config::{CliConfig, ConfigError};
#[cfg(target_os = "linux")]
pub use session::{RunOutcome, Session};
