use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use symphony_core::{
    HandlerContext, HandlerError, HandlerErrorKind, MessageEnvelope, MessageHandler,
    MessagePayload, SymphonyError, SymphonyResult,
};

/// Cross-cutting pipeline stage wrapping handler invocation.
///
/// Stages form a decorator chain composed once at executor construction:
/// validation, then logging, then error classification, terminating in the
/// handler call itself. Each stage receives a [`Next`] continuation.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
        next: Next<'_>,
    ) -> SymphonyResult<()>;
}

/// Continuation into the remaining pipeline stages.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a dyn MessageHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(middlewares: &'a [Arc<dyn Middleware>], handler: &'a dyn MessageHandler) -> Self {
        Self {
            middlewares,
            handler,
        }
    }

    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    pub async fn run(self, envelope: &MessageEnvelope, ctx: &HandlerContext) -> SymphonyResult<()> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    handler: self.handler,
                };
                current.handle(envelope, ctx, next).await
            }
            None => invoke_handler(self.handler, envelope, ctx).await,
        }
    }
}

/// Terminal stage: the handler call, bounded by the context deadline.
async fn invoke_handler(
    handler: &dyn MessageHandler,
    envelope: &MessageEnvelope,
    ctx: &HandlerContext,
) -> SymphonyResult<()> {
    match ctx.remaining(Utc::now()) {
        None => handler.handle(&envelope.message, ctx).await,
        Some(budget) => {
            match tokio::time::timeout(budget, handler.handle(&envelope.message, ctx)).await {
                Ok(result) => result,
                Err(_) => Err(SymphonyError::Handler(
                    HandlerError::retryable(
                        &envelope.id,
                        envelope.message_type(),
                        handler.name(),
                        "context deadline exceeded",
                    )
                    .with_kind(HandlerErrorKind::Timeout),
                )),
            }
        }
    }
}

/// Rejects malformed payloads before the handler runs. Validation failures
/// are non-retryable: resubmitting the same payload cannot succeed.
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    fn validate(payload: &MessagePayload) -> Result<(), String> {
        match payload {
            MessagePayload::SendCampaignStep(msg) => {
                if msg.campaign_id.trim().is_empty() {
                    return Err("campaign_id must not be empty".into());
                }
                if msg.step_id.trim().is_empty() {
                    return Err("step_id must not be empty".into());
                }
                if msg.contact_ids.is_empty() {
                    return Err("contact_ids must not be empty".into());
                }
            }
            MessagePayload::ReminderDue(msg) => {
                if msg.reminder_id <= 0 {
                    return Err("reminder_id must be positive".into());
                }
                if msg.channel.trim().is_empty() {
                    return Err("channel must not be empty".into());
                }
            }
            MessagePayload::WebhookDispatch(msg) => {
                if !msg.url.starts_with("http://") && !msg.url.starts_with("https://") {
                    return Err(format!("webhook url must be http(s): {}", msg.url));
                }
                if msg.event.trim().is_empty() {
                    return Err("event must not be empty".into());
                }
            }
            MessagePayload::ContactUpdated(msg) => {
                if msg.contact_id <= 0 {
                    return Err("contact_id must be positive".into());
                }
            }
            MessagePayload::Custom { name, .. } => {
                if name.trim().is_empty() {
                    return Err("custom message name must not be empty".into());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
        next: Next<'_>,
    ) -> SymphonyResult<()> {
        if let Err(reason) = Self::validate(&envelope.message) {
            return Err(SymphonyError::Handler(
                HandlerError::non_retryable(
                    &envelope.id,
                    envelope.message_type(),
                    next.handler_name(),
                    reason,
                )
                .with_kind(HandlerErrorKind::Validation),
            ));
        }
        next.run(envelope, ctx).await
    }
}

/// Structured entry/exit logging with duration. Sits outside classification
/// so the failure it logs is already normalized.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
        next: Next<'_>,
    ) -> SymphonyResult<()> {
        let handler = next.handler_name().to_string();
        debug!(
            envelope_id = %envelope.id,
            message_type = envelope.message_type(),
            handler = %handler,
            retry_count = ctx.retry_count,
            "handler execution started"
        );
        let start = Instant::now();
        let result = next.run(envelope, ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => info!(
                envelope_id = %envelope.id,
                message_type = envelope.message_type(),
                handler = %handler,
                duration_ms,
                "handler execution completed"
            ),
            Err(error) => warn!(
                envelope_id = %envelope.id,
                message_type = envelope.message_type(),
                handler = %handler,
                duration_ms,
                error = %error,
                "handler execution failed"
            ),
        }
        result
    }
}

/// Normalizes anything thrown downstream into a [`HandlerError`] carrying a
/// retryable flag. Handler failures default to retryable unless the handler
/// signalled otherwise; configuration problems never retry.
pub struct ClassificationMiddleware;

#[async_trait]
impl Middleware for ClassificationMiddleware {
    async fn handle(
        &self,
        envelope: &MessageEnvelope,
        ctx: &HandlerContext,
        next: Next<'_>,
    ) -> SymphonyResult<()> {
        let handler = next.handler_name().to_string();
        match next.run(envelope, ctx).await {
            Ok(()) => Ok(()),
            Err(SymphonyError::Handler(error)) => Err(SymphonyError::Handler(error)),
            Err(SymphonyError::Configuration(detail)) => Err(SymphonyError::Handler(
                HandlerError::non_retryable(&envelope.id, envelope.message_type(), &handler, detail)
                    .with_kind(HandlerErrorKind::Configuration),
            )),
            Err(other) => Err(SymphonyError::Handler(HandlerError::retryable(
                &envelope.id,
                envelope.message_type(),
                &handler,
                other.to_string(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use symphony_core::CampaignStepMessage;

    #[test]
    fn empty_campaign_step_fields_are_rejected() {
        let payload = MessagePayload::SendCampaignStep(CampaignStepMessage {
            campaign_id: "".into(),
            step_id: "s-1".into(),
            contact_ids: vec![1],
            variables: json!({}),
        });
        assert!(ValidationMiddleware::validate(&payload).is_err());
    }

    #[test]
    fn webhook_url_scheme_is_enforced() {
        let payload = MessagePayload::WebhookDispatch(symphony_core::WebhookMessage {
            url: "ftp://example.com".into(),
            event: "deal.won".into(),
            body: json!({}),
        });
        assert!(ValidationMiddleware::validate(&payload).is_err());

        let payload = MessagePayload::WebhookDispatch(symphony_core::WebhookMessage {
            url: "https://example.com/hook".into(),
            event: "deal.won".into(),
            body: json!({}),
        });
        assert!(ValidationMiddleware::validate(&payload).is_ok());
    }

    #[test]
    fn custom_payload_requires_a_name() {
        assert!(ValidationMiddleware::validate(&MessagePayload::custom("", json!({}))).is_err());
        assert!(ValidationMiddleware::validate(&MessagePayload::custom("ok", json!({}))).is_ok());
    }
}
