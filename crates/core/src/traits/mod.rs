pub mod handler;
pub mod ledger;
pub mod store;

pub use handler::MessageHandler;
pub use ledger::{FailedMessageLedger, FailedMessageRecord};
pub use store::{CreateOutcome, EnvelopeStore};

#[cfg(feature = "test-util")]
pub use handler::MockMessageHandler;
#[cfg(feature = "test-util")]
pub use ledger::MockFailedMessageLedger;
#[cfg(feature = "test-util")]
pub use store::MockEnvelopeStore;
