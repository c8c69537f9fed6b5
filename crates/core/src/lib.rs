//! # Symphony Core
//!
//! Core data models, error types, configuration, and port abstractions for
//! the symphony dispatch runtime. Higher layers depend on this crate only:
//! the dispatcher consumes the ports defined here and the infrastructure
//! crate implements them.

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::{
    DedupConfig, DispatcherConfig, Environment, RetryStrategyConfig, TransportConfig,
    TransportKind,
};
pub use errors::{HandlerError, HandlerErrorKind, SymphonyError, SymphonyResult};
pub use models::{
    CampaignStepMessage, ContactUpdatedMessage, DuplicateAttempt, DuplicateAttemptStatus,
    EnvelopeStatus, HandlerContext, MessageEnvelope, MessagePayload, ReminderMessage,
    WebhookMessage,
};
pub use traits::{
    CreateOutcome, EnvelopeStore, FailedMessageLedger, FailedMessageRecord, MessageHandler,
};
