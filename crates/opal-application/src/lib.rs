//! Application layer of the OPAL engine.
//!
//! Orchestrates the domain and transport layers into client-facing
//! services: cached search, bulk ingestion, pipeline runs, and the engine
//! facade with snapshot persistence.

pub mod cache;
pub mod executor;
pub mod ingest;
pub mod pipeline;
pub mod search;
pub mod service;

pub use cache::TtlCache;
pub use executor::BrokerStageExecutor;
pub use ingest::{BulkIngestor, IngestBackend, IngestReport};
pub use pipeline::{PipelineControls, PipelineOrchestrator, RunSnapshot, RunState};
pub use search::{RemoteSearchBackend, SearchBackend, SearchService};
pub use service::{BrokerPromptBackend, EngineService, PromptBackend, SubmitOutcome};
