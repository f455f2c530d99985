use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct IndexerTelemetry {
    images_scanned: AtomicU64,
    images_converted: AtomicU64,
    conversion_failures: AtomicU64,
    embeddings_written: AtomicU64,
    extraction_failures: AtomicU64,
    last_run_unix_ms: AtomicU64,
}

impl IndexerTelemetry {
    pub fn inc_images_scanned(&self, count: u64) {
        self.images_scanned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_images_converted(&self, count: u64) {
        self.images_converted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_conversion_failures(&self, count: u64) {
        self.conversion_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_embeddings_written(&self, count: u64) {
        self.embeddings_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn inc_extraction_failures(&self, count: u64) {
        self.extraction_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn mark_run_finished(&self) {
        self.last_run_unix_ms.store(unix_now_ms(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IndexerTelemetrySnapshot {
        IndexerTelemetrySnapshot {
            images_scanned: self.images_scanned.load(Ordering::Relaxed),
            images_converted: self.images_converted.load(Ordering::Relaxed),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            embeddings_written: self.embeddings_written.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            last_run_unix_ms: self.last_run_unix_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerTelemetrySnapshot {
    pub images_scanned: u64,
    pub images_converted: u64,
    pub conversion_failures: u64,
    pub embeddings_written: u64,
    pub extraction_failures: u64,
    pub last_run_unix_ms: u64,
}

fn unix_now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(_) => 0,
    }
}
