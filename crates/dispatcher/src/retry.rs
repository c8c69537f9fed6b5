use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use symphony_core::{
    DispatcherConfig, EnvelopeStatus, EnvelopeStore, FailedMessageLedger, FailedMessageRecord,
    HandlerError, MessageEnvelope, SymphonyResult,
};

/// 失败处置结果
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    /// 已按退避延迟重新入队
    Rescheduled {
        retry_count: i32,
        next_attempt_at: DateTime<Utc>,
    },
    /// 重试预算耗尽或错误不可重试，已写入失败账本
    Failed,
}

/// 失败路由器
///
/// 可重试错误在预算内按指数退避重新调度；
/// 其余情况把信封终结为failed并追加失败账本，绝不留在pending。
pub struct FailureRouter {
    store: Arc<dyn EnvelopeStore>,
    ledger: Arc<dyn FailedMessageLedger>,
    config: Arc<DispatcherConfig>,
}

impl FailureRouter {
    pub fn new(
        store: Arc<dyn EnvelopeStore>,
        ledger: Arc<dyn FailedMessageLedger>,
        config: Arc<DispatcherConfig>,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
        }
    }

    pub async fn handle_failure(
        &self,
        envelope: &MessageEnvelope,
        error: &HandlerError,
    ) -> SymphonyResult<FailureDisposition> {
        let strategy = self.config.retry_strategy(envelope.message_type());
        if error.retryable && !strategy.is_exhausted(envelope.retry_count) {
            let delay = strategy.delay_for(envelope.retry_count);
            let next_attempt_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
            let retry_count = envelope.retry_count + 1;
            self.store
                .reschedule(&envelope.id, retry_count, next_attempt_at)
                .await?;
            info!(
                envelope_id = %envelope.id,
                message_type = envelope.message_type(),
                retry_count,
                delay_ms = delay.as_millis() as u64,
                "envelope rescheduled after failure"
            );
            return Ok(FailureDisposition::Rescheduled {
                retry_count,
                next_attempt_at,
            });
        }

        // 先写账本再终结信封。账本写入失败时信封保持processing，
        // 之后会被重新投递，重复账本行无害，缺失账本行不可接受。
        self.ledger
            .record(&FailedMessageRecord {
                envelope_id: envelope.id.clone(),
                transport_name: envelope.transport_name.clone(),
                message_type: envelope.message_type().to_string(),
                error: error.to_string(),
                retry_count: envelope.retry_count,
                failed_at: Utc::now(),
            })
            .await?;
        let transitioned = self
            .store
            .transition_status(&envelope.id, EnvelopeStatus::Processing, EnvelopeStatus::Failed)
            .await?;
        if !transitioned {
            debug!(envelope_id = %envelope.id, "envelope already left processing state");
        }
        warn!(
            envelope_id = %envelope.id,
            message_type = envelope.message_type(),
            retry_count = envelope.retry_count,
            retryable = error.retryable,
            "envelope moved to failed-message ledger"
        );
        Ok(FailureDisposition::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use serde_json::json;
    use symphony_core::traits::{MockEnvelopeStore, MockFailedMessageLedger};
    use symphony_core::{MessagePayload, RetryStrategyConfig, SymphonyError};

    fn campaign_envelope(retry_count: i32) -> MessageEnvelope {
        let mut envelope = MessageEnvelope::new(
            MessagePayload::custom("send_campaign_step", json!({})),
            "supabase",
            "messages",
            5,
        );
        envelope.retry_count = retry_count;
        envelope
    }

    fn campaign_config() -> Arc<DispatcherConfig> {
        let mut config = DispatcherConfig::default();
        config.retry_overrides.insert(
            "send_campaign_step".into(),
            RetryStrategyConfig {
                max_retries: 3,
                delay_ms: 1000,
                multiplier: 2.0,
                max_delay_ms: 30_000,
            },
        );
        Arc::new(config)
    }

    fn retryable_error(envelope: &MessageEnvelope) -> HandlerError {
        HandlerError::retryable(&envelope.id, envelope.message_type(), "sender", "smtp 451")
    }

    #[tokio::test]
    async fn retryable_failure_reschedules_with_backoff() {
        let envelope = campaign_envelope(1);
        let id = envelope.id.clone();

        let mut store = MockEnvelopeStore::new();
        store
            .expect_reschedule()
            .with(eq(id), eq(2), always())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ledger = MockFailedMessageLedger::new();

        let router = FailureRouter::new(Arc::new(store), Arc::new(ledger), campaign_config());
        let before = Utc::now();
        let disposition = router
            .handle_failure(&envelope, &retryable_error(&envelope))
            .await
            .unwrap();
        match disposition {
            FailureDisposition::Rescheduled {
                retry_count,
                next_attempt_at,
            } => {
                assert_eq!(retry_count, 2);
                // retry_count为1时延迟应为 1000 * 2^1 = 2000ms
                let delta = next_attempt_at - before;
                assert!(delta >= chrono::Duration::milliseconds(2000));
                assert!(delta < chrono::Duration::milliseconds(3000));
            }
            other => panic!("expected reschedule, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_budget_moves_envelope_to_ledger() {
        let envelope = campaign_envelope(3);
        let id = envelope.id.clone();

        let mut store = MockEnvelopeStore::new();
        store
            .expect_transition_status()
            .with(
                eq(id.clone()),
                eq(EnvelopeStatus::Processing),
                eq(EnvelopeStatus::Failed),
            )
            .times(1)
            .returning(|_, _, _| Ok(true));
        store.expect_reschedule().never();

        let mut ledger = MockFailedMessageLedger::new();
        ledger
            .expect_record()
            .withf(move |entry| {
                entry.envelope_id == id
                    && entry.message_type == "send_campaign_step"
                    && entry.retry_count == 3
            })
            .times(1)
            .returning(|_| Ok(()));

        let router = FailureRouter::new(Arc::new(store), Arc::new(ledger), campaign_config());
        let disposition = router
            .handle_failure(&envelope, &retryable_error(&envelope))
            .await
            .unwrap();
        assert_eq!(disposition, FailureDisposition::Failed);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let envelope = campaign_envelope(0);

        let mut store = MockEnvelopeStore::new();
        store.expect_reschedule().never();
        store
            .expect_transition_status()
            .times(1)
            .returning(|_, _, _| Ok(true));
        let mut ledger = MockFailedMessageLedger::new();
        ledger.expect_record().times(1).returning(|_| Ok(()));

        let router = FailureRouter::new(Arc::new(store), Arc::new(ledger), campaign_config());
        let error = HandlerError::non_retryable(
            &envelope.id,
            envelope.message_type(),
            "sender",
            "invalid template",
        );
        let disposition = router.handle_failure(&envelope, &error).await.unwrap();
        assert_eq!(disposition, FailureDisposition::Failed);
    }

    #[tokio::test]
    async fn ledger_write_failure_keeps_envelope_out_of_failed() {
        let envelope = campaign_envelope(3);

        let mut store = MockEnvelopeStore::new();
        store.expect_reschedule().never();
        // 账本追加失败时不得终结信封
        store.expect_transition_status().never();
        let mut ledger = MockFailedMessageLedger::new();
        ledger
            .expect_record()
            .times(1)
            .returning(|_| Err(SymphonyError::Internal("ledger unavailable".into())));

        let router = FailureRouter::new(Arc::new(store), Arc::new(ledger), campaign_config());
        let result = router
            .handle_failure(&envelope, &retryable_error(&envelope))
            .await;
        assert!(result.is_err());
    }
}
