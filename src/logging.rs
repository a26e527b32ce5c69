// Tracing subscriber setup for both binaries
// The client owns the terminal, so its logs go to a file and only with --debug

use std::fs::File;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const CLIENT_LOG_PATH: &str = "/tmp/pongmatch-debug.log";

/// Client logging. With `enabled == false` nothing is installed and tracing macros are no-ops.
pub fn init_client(enabled: bool) -> io::Result<()> {
    if !enabled {
        return Ok(());
    }

    // Truncated per run
    let file = File::create(CLIENT_LOG_PATH)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

/// Coordinator logging to stdout, level from RUST_LOG (default info)
pub fn init_server() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
