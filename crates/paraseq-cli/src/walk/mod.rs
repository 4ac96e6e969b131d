pub mod config;
pub mod source;
pub mod telemetry;

use core::{fmt, future, time::Duration};
use std::{sync::Arc, time::Instant};

use anyhow::Context;
use paraseq::{
    ClaimStore, Error, HookRegistry, LockClaimStore, ObservableEnumerator, ParallelEnumerator,
    ShardedClaimStore, TokioTraversal,
};
use portable_atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

use config::{StoreKind, WalkConfig};
use source::{RangeDriver, SourceError};

/// Metadata attached to every lifecycle event of a walk.
#[derive(Debug, Clone, Copy)]
pub struct WalkInfo {
    pub items: u64,
    pub workers: usize,
}

/// Totals over every completed pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passes: u32,
    pub items: u64,
    pub checksum: u64,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "passes:      {}", self.passes)?;
        writeln!(f, "items:       {}", self.items)?;
        writeln!(f, "checksum:    {}", self.checksum)?;
        writeln!(f, "interrupted: {}", self.interrupted)?;
        write!(f, "elapsed:     {:?}", self.elapsed)
    }
}

/// Walks the configured sequence `config.passes` times, stopping early once
/// `cancel` fires.
pub async fn run(
    config: &WalkConfig,
    registry: Arc<HookRegistry<u64, WalkInfo>>,
    cancel: &CancellationToken,
) -> anyhow::Result<Summary> {
    let driver = RangeDriver::new(config.items, config.fetch_latency);
    match config.store {
        StoreKind::Sharded => {
            let store = ShardedClaimStore::with_capacity(config.workers);
            walk(ParallelEnumerator::with_store(driver, store), config, registry, cancel).await
        }
        StoreKind::Lock => {
            let store = LockClaimStore::with_capacity(config.workers);
            walk(ParallelEnumerator::with_store(driver, store), config, registry, cancel).await
        }
    }
}

async fn walk<S>(
    inner: ParallelEnumerator<RangeDriver, S>,
    config: &WalkConfig,
    registry: Arc<HookRegistry<u64, WalkInfo>>,
    cancel: &CancellationToken,
) -> anyhow::Result<Summary>
where
    S: ClaimStore<u64> + Send + Sync + 'static,
{
    let info = WalkInfo {
        items: config.items,
        workers: config.workers,
    };
    let enumerator =
        Arc::new(ObservableEnumerator::from_enumerator(inner, info).with_registry(registry));
    let started = Instant::now();
    let mut summary = Summary::default();

    for pass in 1..=config.passes {
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }

        let checksum = Arc::new(AtomicU64::new(0));
        let pass_started = Instant::now();
        let outcome = TokioTraversal::spawn_for_each(
            Arc::clone(&enumerator),
            config.workers,
            cancel.clone(),
            {
                let checksum = Arc::clone(&checksum);
                move |_token, item| {
                    checksum.fetch_add(item, Ordering::Relaxed);
                    future::ready(())
                }
            },
        )
        .await;

        let consumed = match outcome {
            Ok(consumed) => consumed,
            Err(Error::Driver(SourceError::Cancelled)) => {
                tracing::warn!(pass, "pass interrupted");
                summary.interrupted = true;
                break;
            }
            Err(err) => return Err(err).with_context(|| format!("pass {pass} failed")),
        };

        let checksum = checksum.load(Ordering::Relaxed);
        tracing::info!(pass, consumed, checksum, elapsed = ?pass_started.elapsed(), "pass finished");
        if cancel.is_cancelled() {
            summary.interrupted = true;
            break;
        }
        summary.passes += 1;
        summary.items += consumed as u64;
        summary.checksum = summary.checksum.wrapping_add(checksum);
    }

    summary.elapsed = started.elapsed();
    Ok(summary)
}
