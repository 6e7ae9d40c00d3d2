use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing with an optional filter directive and JSON output.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_tracing(level: Option<&str>, json: bool) {
    let env = level.unwrap_or("info");
    let filter = EnvFilter::try_new(env).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json { builder.json().try_init() } else { builder.try_init() };
}
