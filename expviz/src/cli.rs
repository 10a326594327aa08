//! Command-line and environment configuration.

use std::net::IpAddr;
use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::poller::{FailurePolicy, PollConfig};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "expviz",
    version,
    about = "Poll a process's /debug/vars and stream every snapshot to browser viewers"
)]
pub struct Cli {
    /// Base URL of the process publishing /debug/vars, e.g. http://localhost:6060
    #[arg(value_name = "TARGET", env = "EXPVIZ_TARGET")]
    pub target: String,

    /// Interface to listen on; the private loopback interface by default
    #[arg(short, long, default_value = "127.0.0.1", env = "EXPVIZ_INTERFACE")]
    pub interface: IpAddr,

    /// Port to listen on (0 picks a free one)
    #[arg(short, long, default_value_t = 0, env = "EXPVIZ_PORT")]
    pub port: u16,

    /// Milliseconds between upstream polls
    #[arg(long, default_value = "1000", env = "EXPVIZ_INTERVAL_MS")]
    pub interval_ms: NonZeroU64,

    /// Snapshots kept for late-joining viewers (600 = 10 minutes at 1/s)
    #[arg(long, default_value = "600", env = "EXPVIZ_BACKLOG")]
    pub backlog: NonZeroUsize,

    /// Upper bound on a single upstream fetch, in milliseconds
    #[arg(long, default_value = "5000", env = "EXPVIZ_FETCH_TIMEOUT_MS")]
    pub fetch_timeout_ms: NonZeroU64,

    /// Directory holding the viewer's static files
    #[arg(long, default_value = "static", env = "EXPVIZ_STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Exit on the first failed poll instead of retrying with backoff
    #[arg(long, env = "EXPVIZ_EXIT_ON_ERROR")]
    pub exit_on_error: bool,

    /// Longest wait between retries after failed polls, in milliseconds
    #[arg(long, default_value_t = 30_000, env = "EXPVIZ_RETRY_MAX_MS")]
    pub retry_max_ms: u64,

    /// Open the viewer in the default browser once the server is listening
    #[arg(long, env = "EXPVIZ_OPEN")]
    pub open: bool,
}

impl Cli {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.get())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.get())
    }

    pub fn poll_config(&self) -> PollConfig {
        let on_failure = if self.exit_on_error {
            FailurePolicy::Exit
        } else {
            FailurePolicy::Retry {
                max_backoff: Duration::from_millis(self.retry_max_ms),
            }
        };
        PollConfig {
            interval: self.interval(),
            on_failure,
        }
    }
}
