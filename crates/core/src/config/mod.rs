pub mod env_loader;
pub mod environment;
pub mod model;

pub use environment::Environment;
pub use model::{
    DedupConfig, DispatcherConfig, RetryStrategyConfig, TransportConfig, TransportKind,
};
