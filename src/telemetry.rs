//! Log output setup
//!
//! Components emit `tracing` events; nothing is printed until a subscriber
//! is installed. Applications and tests call [`init_tracing`] once at
//! startup. The filter comes from `RUST_LOG` (for example
//! `RUST_LOG=rust_concurrent_ledger=debug`), defaulting to `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a formatted subscriber filtered by `RUST_LOG`
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the existing one is kept. Repeated calls are harmless.
pub fn init_tracing() -> bool {
    init_tracing_with("info")
}

/// Like [`init_tracing`], with `default_directive` used when `RUST_LOG` is unset
pub fn init_tracing_with(default_directive: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
        .is_ok()
}
