//! Fan-out to several sinks behind a single sink surface.

use futures_util::future::{join_all, BoxFuture};

use crate::export::{Sink, SpanRecord};

/// Distributes every operation to N underlying sinks independently and
/// concurrently.
///
/// `export`, `export_batch` and `health_check` aggregate with a logical OR:
/// one healthy backend is enough, and a single outage never blocks
/// observability through the others. Lifecycle calls apply to every sink
/// unconditionally.
#[derive(Debug)]
pub struct MultiSink {
    sinks: Vec<Box<dyn Sink>>,
}

impl MultiSink {
    /// Compose the given sinks behind one sink surface.
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Number of underlying sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether no sinks are configured.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for MultiSink {
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let sends = self.sinks.iter().map(|sink| sink.export(record.clone()));
            join_all(sends).await.into_iter().any(|ok| ok)
        })
    }

    fn export_batch(&self, records: Vec<SpanRecord>) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let sends = self
                .sinks
                .iter()
                .map(|sink| sink.export_batch(records.clone()));
            join_all(sends).await.into_iter().any(|ok| ok)
        })
    }

    fn start(&self) {
        for sink in &self.sinks {
            sink.start();
        }
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            join_all(self.sinks.iter().map(|sink| sink.stop())).await;
        })
    }

    fn flush(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            join_all(self.sinks.iter().map(|sink| sink.flush())).await;
        })
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let probes = self.sinks.iter().map(|sink| sink.health_check());
            join_all(probes).await.into_iter().any(|ok| ok)
        })
    }
}
