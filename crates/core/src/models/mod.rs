pub mod context;
pub mod duplicate;
pub mod envelope;
pub mod message;

pub use context::HandlerContext;
pub use duplicate::{DuplicateAttempt, DuplicateAttemptStatus};
pub use envelope::{EnvelopeStatus, MessageEnvelope};
pub use message::{
    CampaignStepMessage, ContactUpdatedMessage, MessagePayload, ReminderMessage, WebhookMessage,
};
