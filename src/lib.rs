//! # Symphony
//!
//! An embedded message dispatch and asynchronous task-execution runtime.
//! Producers wrap business actions (campaign sends, reminders, webhook
//! calls) in envelopes; the runtime routes them to a transport,
//! deduplicates them within a rolling idempotency window, and drives
//! registered handlers through a retry- and middleware-governed pipeline.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use symphony::{
//!     DispatcherBuilder, EnqueueOptions, HandlerContext, MessageHandler, MessagePayload,
//!     SymphonyResult, WorkerConfig,
//! };
//!
//! struct AuditLogger;
//!
//! #[async_trait]
//! impl MessageHandler for AuditLogger {
//!     fn name(&self) -> &str {
//!         "audit_logger"
//!     }
//!     async fn handle(&self, _m: &MessagePayload, _ctx: &HandlerContext) -> SymphonyResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> SymphonyResult<()> {
//!     let runtime = DispatcherBuilder::new()
//!         .register_handler("contact_updated", Arc::new(AuditLogger))
//!         .build()
//!         .await?;
//!     runtime.spawn_worker(WorkerConfig::default()).await;
//!
//!     let id = runtime
//!         .enqueue(
//!             MessagePayload::custom("contact_updated", serde_json::json!({"contact_id": 7})),
//!             EnqueueOptions::idempotency_key("contact-7-2024-01-01"),
//!         )
//!         .await?;
//!     println!("enqueued {id}");
//!     runtime.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod logging;

pub use app::{DispatcherBuilder, Symphony};
pub use logging::init_logging;

pub use symphony_core::{
    CampaignStepMessage, ContactUpdatedMessage, CreateOutcome, DedupConfig, DispatcherConfig,
    DuplicateAttempt, DuplicateAttemptStatus, EnvelopeStatus, Environment, EnvelopeStore,
    FailedMessageLedger, FailedMessageRecord, HandlerContext, HandlerError, HandlerErrorKind,
    MessageEnvelope, MessageHandler, MessagePayload, ReminderMessage, RetryStrategyConfig,
    SymphonyError, SymphonyResult, TransportConfig, TransportKind, WebhookMessage,
};
pub use symphony_dispatcher::{
    aggregate_failure, BatchSender, Deduplicator, EnqueueOptions, EnvelopeBatch,
    ExecutionOutcome, FailureDisposition, FailureRouter, HandlerExecutor, HandlerRegistry,
    MessageDispatcher, MetricCallback, PerformanceMetric, PollingWorker, TransportRouter,
    WorkerConfig,
};
pub use symphony_infrastructure::{
    InMemoryEnvelopeStore, InMemoryFailedLedger, PostgresEnvelopeStore, PostgresFailedLedger,
};
