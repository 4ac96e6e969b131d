use paraseq::{Hook, HookRegistry};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use super::WalkInfo;

/// Installs the global subscriber: an `EnvFilter` read from `RUST_LOG`
/// (default `info`) in front of a human-readable `fmt` layer.
pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_file(true),
        )
        .try_init()?;
    Ok(())
}

/// Logs every lifecycle notification raised by enumerators sharing
/// `registry`. Items are logged at `trace`.
pub fn subscribe_logging(registry: &HookRegistry<u64, WalkInfo>) {
    for hook in [
        Hook::BeforeStart,
        Hook::AfterStart,
        Hook::BeforeEnd,
        Hook::AfterEnd,
    ] {
        registry.subscribe(hook, |event| {
            let info = event.metadata();
            tracing::info!(
                hook = ?event.hook(),
                items = info.items,
                workers = info.workers,
                "lifecycle"
            );
        });
    }
    registry.subscribe(Hook::ItemEncountered, |event| {
        if let Some(item) = event.item() {
            tracing::trace!(item, "item encountered");
        }
    });
}
