//! Paging through event logs in bounded block windows.
//!
//! Most nodes cap the block range of a single `eth_getLogs` call. A
//! [`LogCursor`] splits `from_block..=latest` into consecutive windows of at
//! most `window` blocks and fetches them one at a time.

use alloy_provider::Provider;
use alloy_rpc_types_eth::{Filter, Log};
use alloy_transport::TransportResult;
use std::num::NonZeroU64;
use std::ops::RangeInclusive;

/// Consecutive inclusive block ranges covering `from..=latest`.
#[derive(Debug, Clone)]
pub struct BlockWindows {
    next: u64,
    latest: u64,
    window: u64,
    done: bool,
}

impl Iterator for BlockWindows {
    type Item = RangeInclusive<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next > self.latest {
            return None;
        }
        let start = self.next;
        let end = start.saturating_add(self.window - 1).min(self.latest);
        match end.checked_add(1) {
            Some(next) => self.next = next,
            None => self.done = true,
        }
        Some(start..=end)
    }
}

/// Splits `from..=latest` into windows of at most `window` blocks.
///
/// Yields nothing when `from > latest`.
pub fn block_windows(from: u64, latest: u64, window: NonZeroU64) -> BlockWindows {
    BlockWindows {
        next: from,
        latest,
        window: window.get(),
        done: false,
    }
}

/// Fetches the logs matching a filter, one block window per call.
#[derive(Debug)]
pub struct LogCursor<P> {
    provider: P,
    filter: Filter,
    windows: BlockWindows,
    latest_block: u64,
}

impl<P: Provider> LogCursor<P> {
    /// Reads the current block number and prepares windows up to it.
    ///
    /// Block bounds already present in `filter` are replaced per window.
    pub async fn new(
        provider: P,
        filter: Filter,
        from_block: u64,
        window: NonZeroU64,
    ) -> TransportResult<Self> {
        let latest_block = provider.get_block_number().await?;
        Ok(Self {
            provider,
            filter,
            windows: block_windows(from_block, latest_block, window),
            latest_block,
        })
    }

    /// The chain head observed when the cursor was created.
    pub fn latest_block(&self) -> u64 {
        self.latest_block
    }

    /// Logs of the next window, or `None` once every window was fetched.
    pub async fn next_window(
        &mut self,
    ) -> Option<TransportResult<(RangeInclusive<u64>, Vec<Log>)>> {
        let range = self.windows.next()?;
        let filter = self
            .filter
            .clone()
            .from_block(*range.start())
            .to_block(*range.end());
        #[cfg(feature = "telemetry")]
        tracing::debug!(from = range.start(), to = range.end(), "Fetching logs");
        Some(self.provider.get_logs(&filter).await.map(|logs| (range, logs)))
    }

    /// Fetches all remaining windows and concatenates their logs.
    pub async fn collect(mut self) -> TransportResult<Vec<Log>> {
        let mut logs = Vec::new();
        while let Some(window) = self.next_window().await {
            let (_, mut window_logs) = window?;
            logs.append(&mut window_logs);
        }
        Ok(logs)
    }
}
