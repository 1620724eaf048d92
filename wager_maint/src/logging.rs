//! Structured logging setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize the tracing subscriber
///
/// Records emitted through the `log` facade by `wager_engine` are forwarded to
/// the same subscriber. Levels are configurable via `RUST_LOG`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Log the outcome of one sweep
pub fn log_sweep(locked: usize, decayed: usize, elapsed_ms: u64) {
    if locked == 0 && decayed == 0 {
        tracing::debug!(elapsed_ms, "Sweep found nothing to do");
    } else {
        tracing::info!(
            locked_wagers = locked,
            decayed_accounts = decayed,
            elapsed_ms,
            "Sweep completed"
        );
    }

    if elapsed_ms > 10_000 {
        tracing::warn!(elapsed_ms, "Slow sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_sweep() {
        // No subscriber installed; must not panic
        log_sweep(0, 0, 5);
        log_sweep(3, 1, 20_000);
    }
}
