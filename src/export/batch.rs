//! Reusable buffering and flush scheduling for batching sinks.
//!
//! Any sink configured with a batch size greater than one buffers records
//! in arrival order and flushes when the buffer reaches the size threshold
//! or when the periodic interval elapses, whichever happens first. With a
//! batch size of one (or less) every export sends immediately and no
//! buffer or timer exists.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Deserializer};
use tokio::task::JoinHandle;

use crate::export::SpanRecord;

fn default_batch_size() -> usize {
    1
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom("flush_interval must be a non-negative number of seconds"));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Buffering configuration shared by all batching sinks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchConfig {
    /// Buffered record count that triggers a flush. A value of one or less
    /// disables buffering entirely.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Interval between timer-driven flushes, in seconds on the wire.
    #[serde(
        default = "default_flush_interval",
        deserialize_with = "deserialize_secs"
    )]
    pub flush_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval: default_flush_interval(),
        }
    }
}

impl BatchConfig {
    /// Config that sends every record immediately.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Config that buffers up to `batch_size` records between flushes.
    pub fn buffered(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size,
            flush_interval,
        }
    }
}

/// The outbound half of a batching sink: one bulk send to the backend.
pub(crate) trait BatchTransport: Send + Sync + fmt::Debug + 'static {
    /// Deliver one batch. Reports `false` and logs on failure.
    fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool>;
}

#[derive(Debug)]
struct BatcherInner<T> {
    transport: T,
    batch_size: usize,
    flush_interval: Duration,
    buffer: Mutex<Vec<SpanRecord>>,
}

impl<T: BatchTransport> BatcherInner<T> {
    /// Drain and send. The buffer is swapped out before the asynchronous
    /// send begins, so records arriving mid-send start a new buffer.
    async fn flush(&self) -> bool {
        let pending = match self.buffer.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => return false,
        };
        if pending.is_empty() {
            return true;
        }
        self.transport.send_batch(pending).await
    }
}

/// Buffer plus flush timer, composed into each batching sink.
#[derive(Debug)]
pub(crate) struct Batcher<T> {
    inner: Arc<BatcherInner<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: BatchTransport> Batcher<T> {
    pub(crate) fn new(transport: T, config: BatchConfig) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                transport,
                batch_size: config.batch_size,
                flush_interval: config.flush_interval,
                buffer: Mutex::new(Vec::new()),
            }),
            timer: Mutex::new(None),
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Send or enqueue one record. Buffered acceptance reports `true`.
    pub(crate) async fn export(&self, record: SpanRecord) -> bool {
        if self.inner.batch_size <= 1 {
            return self.inner.transport.send_batch(vec![record]).await;
        }
        let should_flush = match self.inner.buffer.lock() {
            Ok(mut buffer) => {
                buffer.push(record);
                buffer.len() >= self.inner.batch_size
            }
            Err(_) => return false,
        };
        if should_flush {
            self.inner.flush().await;
        }
        true
    }

    /// Bypass the buffer and deliver a batch now.
    pub(crate) async fn send_now(&self, records: Vec<SpanRecord>) -> bool {
        self.inner.transport.send_batch(records).await
    }

    /// Spawn the periodic flush task. No-op without buffering, when already
    /// started, or outside a tokio runtime.
    pub(crate) fn start(&self) {
        if self.inner.batch_size <= 1 {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no tokio runtime available, periodic flush disabled");
                return;
            }
        };
        if let Ok(mut timer) = self.timer.lock() {
            if timer.is_some() {
                return;
            }
            let inner = Arc::clone(&self.inner);
            *timer = Some(handle.spawn(async move {
                let mut ticker = tokio::time::interval(inner.flush_interval);
                // The first tick of a tokio interval completes immediately.
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    inner.flush().await;
                }
            }));
        }
    }

    /// Cancel the flush timer exactly once and flush whatever remains.
    pub(crate) async fn stop(&self) {
        let handle = match self.timer.lock() {
            Ok(mut timer) => timer.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        self.inner.flush().await;
    }

    pub(crate) async fn flush(&self) {
        self.inner.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::in_memory::test_record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingTransport {
        sends: AtomicUsize,
        records: Mutex<Vec<SpanRecord>>,
    }

    impl BatchTransport for Arc<CountingTransport> {
        fn send_batch(&self, batch: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
            Box::pin(async move {
                self.sends.fetch_add(1, Ordering::SeqCst);
                if let Ok(mut records) = self.records.lock() {
                    records.extend(batch);
                }
                true
            })
        }
    }

    fn buffered_batcher(
        batch_size: usize,
    ) -> (Batcher<Arc<CountingTransport>>, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport::default());
        let batcher = Batcher::new(
            Arc::clone(&transport),
            BatchConfig::buffered(batch_size, Duration::from_secs(5)),
        );
        (batcher, transport)
    }

    #[tokio::test]
    async fn immediate_mode_sends_every_record() {
        let transport = Arc::new(CountingTransport::default());
        let batcher = Batcher::new(Arc::clone(&transport), BatchConfig::immediate());
        assert!(batcher.export(test_record("a")).await);
        assert!(batcher.export(test_record("b")).await);
        assert_eq!(transport.sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn no_send_below_threshold() {
        let (batcher, transport) = buffered_batcher(5);
        for name in ["a", "b", "c"] {
            assert!(batcher.export(test_record(name)).await);
        }
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        batcher.flush().await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
        assert_eq!(transport.records.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn threshold_triggers_flush() {
        let (batcher, transport) = buffered_batcher(2);
        batcher.export(test_record("a")).await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        batcher.export(test_record("b")).await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (batcher, transport) = buffered_batcher(10);
        batcher.start();
        batcher.export(test_record("a")).await;
        batcher.stop().await;
        batcher.stop().await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
        assert_eq!(transport.records.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_drives_flush() {
        let (batcher, transport) = buffered_batcher(100);
        batcher.start();
        batcher.export(test_record("a")).await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(transport.sends.load(Ordering::SeqCst), 1);
        batcher.stop().await;
    }

    #[test]
    fn config_deserializes_interval_seconds() {
        let config: BatchConfig =
            serde_json::from_value(serde_json::json!({"batch_size": 10, "flush_interval": 2.5}))
                .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.flush_interval, Duration::from_millis(2500));
    }

    #[test]
    fn config_defaults_to_immediate() {
        let config: BatchConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.batch_size, 1);
    }
}
