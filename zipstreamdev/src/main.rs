mod application;
mod presentation;

use tracing_subscriber::EnvFilter;
use zipstream_core::error::Result;

fn main() -> Result<()> {
    // Logs go to stderr; `pack --out -` owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    application::run()
}
