use core::{
    future::{self, Future},
    time::Duration,
};

use paraseq::SequenceDriver;
use portable_atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("fetch cancelled")]
    Cancelled,
}

/// The sequence `0..len`, where every fetch takes `latency`.
///
/// Rewinds when a pass ends, so one driver serves every pass of a walk.
#[derive(Debug)]
pub struct RangeDriver {
    cursor: AtomicU64,
    len: u64,
    latency: Duration,
}

impl RangeDriver {
    pub fn new(len: u64, latency: Duration) -> Self {
        Self {
            cursor: AtomicU64::new(0),
            len,
            latency,
        }
    }
}

impl SequenceDriver for RangeDriver {
    type Item = u64;
    type Handshake = u64;
    type Err = SourceError;

    fn check_next(&self) -> Option<u64> {
        let index = self.cursor.fetch_add(1, Ordering::AcqRel);
        (index < self.len).then_some(index)
    }

    async fn fetch(&self, index: u64, cancel: &CancellationToken) -> Result<u64, SourceError> {
        if !self.latency.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => return Err(SourceError::Cancelled),
                () = tokio::time::sleep(self.latency) => {}
            }
        }
        Ok(index)
    }

    fn on_ended(
        &self,
        abrupt: bool,
        _cancel: &CancellationToken,
    ) -> Option<impl Future<Output = Result<(), SourceError>> + Send> {
        let checked = self.cursor.swap(0, Ordering::AcqRel).min(self.len);
        tracing::debug!(abrupt, checked, "sequence ended, rewinding");
        Some(future::ready(Ok(())))
    }
}
