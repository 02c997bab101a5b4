//! Background flusher for the write-back cache.
//!
//! Flushes every cached path on a fixed interval and on demand. Eviction and
//! explicit close still flush on their own; this only bounds how long dirty
//! bytes can sit in memory on an idle mount.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cache::{ChunkStore, WriteBackCache};

/// Default flush interval (30 seconds).
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic flusher over a shared cache.
///
/// Runs in a tokio task. A flush can be forced through the `flush_now`
/// channel; cancelling the token performs a last flush and stops the loop.
pub struct PeriodicFlusher<S: ChunkStore + 'static> {
    cache: Arc<WriteBackCache<S>>,
    interval: Duration,
    flush_now_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
}

impl<S: ChunkStore + 'static> PeriodicFlusher<S> {
    pub fn new(
        cache: Arc<WriteBackCache<S>>,
        flush_now_rx: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            interval: FLUSH_INTERVAL,
            flush_now_rx,
            cancel,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Main run loop. Call from a spawned tokio task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; nothing can be dirty yet.
        ticker.tick().await;

        log::info!(
            "Periodic flusher started (interval: {}s)",
            self.interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.flush_cycle().await;
                    break;
                }
                _ = ticker.tick() => {
                    self.flush_cycle().await;
                }
                Some(()) = self.flush_now_rx.recv() => {
                    log::info!("Manual flush triggered");
                    self.flush_cycle().await;
                }
            }
        }

        log::info!("Periodic flusher stopped");
    }

    /// Flush all cached paths off the async runtime.
    ///
    /// Returns whether every path flushed. Failed entries stay dirty and are
    /// retried on the next cycle.
    async fn flush_cycle(&self) -> bool {
        if self.cache.is_empty() {
            return true;
        }

        let cache = self.cache.clone();
        match tokio::task::spawn_blocking(move || cache.flush_all()).await {
            Ok(Ok(())) => {
                log::debug!("Flush cycle complete");
                true
            }
            Ok(Err(e)) => {
                log::warn!("Flush cycle failed: {}", e);
                false
            }
            Err(e) => {
                log::error!("Flush task panicked: {}", e);
                false
            }
        }
    }
}

/// Spawn a flusher task, returning the manual trigger sender.
pub fn spawn_flusher<S: ChunkStore + 'static>(
    cache: Arc<WriteBackCache<S>>,
    interval: Duration,
    cancel: CancellationToken,
) -> (mpsc::Sender<()>, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let flusher = PeriodicFlusher::new(cache, rx, cancel).with_interval(interval);
    let handle = tokio::spawn(flusher.run());
    (tx, handle)
}
