pub mod config;
pub mod pipeline;
pub mod prompts;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for embedders and binaries that do not install
/// their own subscriber. Respects `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
