use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

use symphony_core::{
    DispatcherConfig, EnvelopeStore, FailedMessageLedger, MessageHandler, MessagePayload,
    SymphonyResult,
};
use symphony_dispatcher::{
    EnqueueOptions, FailureRouter, HandlerExecutor, HandlerRegistry, MessageDispatcher,
    MetricCallback, PollingWorker, WorkerConfig,
};
use symphony_infrastructure::{InMemoryEnvelopeStore, InMemoryFailedLedger};

/// Wires configuration, storage, and handler registrations into a running
/// dispatch runtime. Defaults to the in-memory store and ledger for
/// embedded deployments; production callers inject the Postgres
/// implementations.
pub struct DispatcherBuilder {
    config: Option<DispatcherConfig>,
    store: Option<Arc<dyn EnvelopeStore>>,
    ledger: Option<Arc<dyn FailedMessageLedger>>,
    handlers: Vec<(String, Arc<dyn MessageHandler>)>,
    metric_callback: Option<MetricCallback>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            ledger: None,
            handlers: Vec::new(),
            metric_callback: None,
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn EnvelopeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn FailedMessageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn register_handler(
        mut self,
        message_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.handlers.push((message_type.into(), handler));
        self
    }

    pub fn on_performance_metric(mut self, callback: MetricCallback) -> Self {
        self.metric_callback = Some(callback);
        self
    }

    pub async fn build(self) -> SymphonyResult<Symphony> {
        let config = match self.config {
            Some(config) => config,
            None => DispatcherConfig::from_env()?,
        };
        let config = Arc::new(config);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryEnvelopeStore::with_window(config.dedup_window())));
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(InMemoryFailedLedger::new()));

        let registry = Arc::new(HandlerRegistry::new());
        for (message_type, handler) in self.handlers {
            registry.register(message_type, handler).await;
        }

        let mut executor = HandlerExecutor::new(registry.clone());
        if let Some(callback) = self.metric_callback {
            executor = executor.with_metric_callback(callback);
        }
        let executor = Arc::new(executor);
        let failure_router = Arc::new(FailureRouter::new(
            store.clone(),
            ledger.clone(),
            config.clone(),
        ));
        let dispatcher = Arc::new(MessageDispatcher::new(
            config.clone(),
            store.clone(),
            executor.clone(),
            failure_router.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        info!(environment = %config.environment, "symphony runtime built");
        Ok(Symphony {
            config,
            store,
            executor,
            failure_router,
            dispatcher,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled dispatch runtime.
pub struct Symphony {
    config: Arc<DispatcherConfig>,
    store: Arc<dyn EnvelopeStore>,
    executor: Arc<HandlerExecutor>,
    failure_router: Arc<FailureRouter>,
    dispatcher: Arc<MessageDispatcher>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Symphony {
    /// Enqueue a message through the dispatch pipeline.
    pub async fn enqueue(
        &self,
        message: MessagePayload,
        options: EnqueueOptions,
    ) -> SymphonyResult<String> {
        self.dispatcher.enqueue(message, options).await
    }

    pub fn dispatcher(&self) -> Arc<MessageDispatcher> {
        self.dispatcher.clone()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Spawn a polling worker consuming due envelopes until shutdown.
    pub async fn spawn_worker(&self, worker_config: WorkerConfig) {
        let worker = Arc::new(PollingWorker::new(
            self.store.clone(),
            self.executor.clone(),
            self.failure_router.clone(),
            worker_config,
        ));
        let shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(worker.run(shutdown_rx));
        self.workers.lock().await.push(handle);
    }

    /// Signal shutdown and wait for all workers to drain.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("symphony runtime stopped");
    }
}
