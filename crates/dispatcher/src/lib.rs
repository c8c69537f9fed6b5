//! # Symphony Dispatcher
//!
//! The dispatch runtime proper: transport routing, idempotency-window
//! deduplication, the middleware-governed handler executor, retry and
//! failure routing, batch aggregation, the producer-facing
//! [`MessageDispatcher`], and the consuming [`PollingWorker`].

pub mod batch;
pub mod dedup;
pub mod dispatcher;
pub mod executor;
pub mod middleware;
pub mod registry;
pub mod retry;
pub mod router;
pub mod worker;

pub use batch::{BatchSender, EnvelopeBatch};
pub use dedup::Deduplicator;
pub use dispatcher::{EnqueueOptions, MessageDispatcher};
pub use executor::{
    aggregate_failure, ExecutionOutcome, HandlerExecutor, MetricCallback, PerformanceMetric,
};
pub use middleware::{
    ClassificationMiddleware, LoggingMiddleware, Middleware, Next, ValidationMiddleware,
};
pub use registry::HandlerRegistry;
pub use retry::{FailureDisposition, FailureRouter};
pub use router::TransportRouter;
pub use worker::{PollingWorker, WorkerConfig};
