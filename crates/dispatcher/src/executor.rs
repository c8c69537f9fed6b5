use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use metrics::{counter, histogram};

use symphony_core::{
    HandlerContext, HandlerError, HandlerErrorKind, MessageEnvelope, MessageHandler,
    SymphonyError,
};

use crate::middleware::{
    ClassificationMiddleware, LoggingMiddleware, Middleware, Next, ValidationMiddleware,
};
use crate::registry::HandlerRegistry;

/// Observability record emitted for every execution, success or failure.
#[derive(Debug, Clone)]
pub struct PerformanceMetric {
    pub message_id: String,
    pub message_type: String,
    pub duration: Duration,
    pub retry_count: i32,
}

pub type MetricCallback = Arc<dyn Fn(&PerformanceMetric) + Send + Sync>;

/// Per-handler result of one pipeline pass.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub handler: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<HandlerError>,
}

/// Drives envelopes through the middleware pipeline into their handlers.
///
/// The pipeline is composed once at construction. `execute` invokes the
/// primary handler; `execute_all` fans out to every registered handler
/// concurrently, isolating failures so one handler cannot prevent the
/// others from completing.
pub struct HandlerExecutor {
    registry: Arc<HandlerRegistry>,
    middlewares: Vec<Arc<dyn Middleware>>,
    on_metric: Option<MetricCallback>,
}

impl HandlerExecutor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            middlewares: vec![
                Arc::new(ValidationMiddleware),
                Arc::new(LoggingMiddleware),
                Arc::new(ClassificationMiddleware),
            ],
            on_metric: None,
        }
    }

    pub fn with_metric_callback(mut self, callback: MetricCallback) -> Self {
        self.on_metric = Some(callback);
        self
    }

    pub async fn execute(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
    ) -> ExecutionOutcome {
        match self.registry.handler(envelope.message_type()).await {
            Some(handler) => self.run_one(handler, envelope, ctx).await,
            None => self.missing_handler(envelope, ctx),
        }
    }

    /// Fan out to every registered handler concurrently. Always returns
    /// exactly one outcome per handler.
    pub async fn execute_all(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
    ) -> Vec<ExecutionOutcome> {
        let handlers = self.registry.handlers(envelope.message_type()).await;
        if handlers.is_empty() {
            return vec![self.missing_handler(envelope, ctx)];
        }
        join_all(
            handlers
                .into_iter()
                .map(|handler| self.run_one(handler, envelope, ctx)),
        )
        .await
    }

    async fn run_one(
        &self,
        handler: Arc<dyn MessageHandler>,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let result = Next::new(&self.middlewares, handler.as_ref())
            .run(envelope, ctx)
            .await;
        let duration = start.elapsed();
        self.emit_metric(envelope, ctx, duration, result.is_ok());

        match result {
            Ok(()) => ExecutionOutcome {
                handler: handler.name().to_string(),
                success: true,
                duration,
                error: None,
            },
            Err(error) => ExecutionOutcome {
                handler: handler.name().to_string(),
                success: false,
                duration,
                error: Some(classify(error, envelope, handler.name())),
            },
        }
    }

    fn missing_handler(&self, envelope: &MessageEnvelope, ctx: &HandlerContext) -> ExecutionOutcome {
        let duration = Duration::ZERO;
        self.emit_metric(envelope, ctx, duration, false);
        ExecutionOutcome {
            handler: "unregistered".to_string(),
            success: false,
            duration,
            error: Some(
                HandlerError::non_retryable(
                    &envelope.id,
                    envelope.message_type(),
                    "unregistered",
                    format!(
                        "no handler registered for message type {}",
                        envelope.message_type()
                    ),
                )
                .with_kind(HandlerErrorKind::Configuration),
            ),
        }
    }

    fn emit_metric(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
        duration: Duration,
        success: bool,
    ) {
        let message_type = envelope.message_type().to_string();
        let result_label = if success { "success" } else { "failure" };
        counter!(
            "symphony_handler_executions_total",
            "message_type" => message_type.clone(),
            "result" => result_label,
        )
        .increment(1);
        histogram!(
            "symphony_handler_duration_seconds",
            "message_type" => message_type.clone(),
        )
        .record(duration.as_secs_f64());

        if let Some(callback) = &self.on_metric {
            callback(&PerformanceMetric {
                message_id: envelope.id.clone(),
                message_type,
                duration,
                retry_count: ctx.retry_count,
            });
        }
    }
}

/// Fallback normalization for errors that escaped the classification stage.
fn classify(error: SymphonyError, envelope: &MessageEnvelope, handler: &str) -> HandlerError {
    match error {
        SymphonyError::Handler(error) => error,
        SymphonyError::Configuration(detail) => {
            HandlerError::non_retryable(&envelope.id, envelope.message_type(), handler, detail)
                .with_kind(HandlerErrorKind::Configuration)
        }
        other => HandlerError::retryable(
            &envelope.id,
            envelope.message_type(),
            handler,
            other.to_string(),
        ),
    }
}

/// Aggregate view over fan-out outcomes: the first failure, with the
/// retryable flag widened to "any failing handler is retryable".
pub fn aggregate_failure(outcomes: &[ExecutionOutcome]) -> Option<HandlerError> {
    let mut first: Option<HandlerError> = None;
    let mut any_retryable = false;
    for outcome in outcomes {
        if let Some(error) = &outcome.error {
            any_retryable |= error.retryable;
            if first.is_none() {
                first = Some(error.clone());
            }
        }
    }
    first.map(|mut error| {
        error.retryable = any_retryable;
        error
    })
}
