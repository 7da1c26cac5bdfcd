//! Bulk prompt ingestion.
//!
//! Large payloads are split into fixed-size sequential batches. A failed
//! batch is recorded and the run moves on; one batch never aborts the rest.
//! A fixed delay between batches keeps the backend from being flooded, and
//! an index-optimization call always closes the run, whatever the per-batch
//! outcomes were.

use async_trait::async_trait;
use opal_core::error::Result;
use opal_transport::http::{HttpClient, PromptRecord};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The network side of bulk ingestion.
#[async_trait]
pub trait IngestBackend: Send + Sync {
    /// Submits one batch of prompts.
    async fn submit_batch(&self, prompts: &[PromptRecord], batch_id: &str) -> Result<()>;
    /// Triggers a search-index optimization pass.
    async fn optimize_index(&self) -> Result<()>;
}

#[async_trait]
impl IngestBackend for HttpClient {
    async fn submit_batch(&self, prompts: &[PromptRecord], batch_id: &str) -> Result<()> {
        self.bulk_ingest(prompts, batch_id).await
    }

    async fn optimize_index(&self) -> Result<()> {
        HttpClient::optimize_index(self).await
    }
}

/// Aggregate outcome of one bulk ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// True iff no batch failed.
    pub success: bool,
    /// Number of items in successfully submitted batches.
    pub processed: usize,
    /// Number of items in failed batches.
    pub failed: usize,
    /// One error string per failed batch.
    pub errors: Vec<String>,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
}

/// Drives batched ingestion against an [`IngestBackend`].
pub struct BulkIngestor {
    backend: Arc<dyn IngestBackend>,
    /// Admission-control pause between batches. Fixed, not adaptive.
    inter_batch_delay: Duration,
}

impl BulkIngestor {
    pub fn new(backend: Arc<dyn IngestBackend>, inter_batch_delay: Duration) -> Self {
        Self {
            backend,
            inter_batch_delay,
        }
    }

    /// Ingests `items` in sequential batches of `batch_size`.
    ///
    /// Never returns an error: per-batch failures are aggregated into the
    /// report, and an index-optimization failure is only logged.
    pub async fn bulk_ingest(&self, items: &[PromptRecord], batch_size: usize) -> IngestReport {
        let started = Instant::now();
        let batch_size = batch_size.max(1);

        let mut processed = 0;
        let mut failed = 0;
        let mut errors = Vec::new();

        let batch_count = items.len().div_ceil(batch_size);
        for (index, batch) in items.chunks(batch_size).enumerate() {
            let batch_number = index + 1;
            let batch_id = format!("batch-{}-of-{}", batch_number, batch_count);
            match self.backend.submit_batch(batch, &batch_id).await {
                Ok(()) => {
                    processed += batch.len();
                    tracing::debug!(batch_number, size = batch.len(), "batch ingested");
                }
                Err(e) => {
                    failed += batch.len();
                    errors.push(format!("batch {}: {}", batch_number, e));
                    tracing::warn!(batch_number, "batch failed: {}", e);
                }
            }

            if batch_number < batch_count {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        // Index optimization runs regardless of per-batch outcome.
        if let Err(e) = self.backend.optimize_index().await {
            tracing::warn!("index optimization after ingest failed: {}", e);
        }

        IngestReport {
            success: failed == 0,
            processed,
            failed,
            errors,
            duration: started.elapsed(),
        }
    }
}
