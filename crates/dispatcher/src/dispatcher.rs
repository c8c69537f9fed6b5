use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use symphony_core::{
    CreateOutcome, DispatcherConfig, EnvelopeStatus, EnvelopeStore, HandlerContext,
    MessageEnvelope, MessagePayload, SymphonyResult, TransportKind,
};

use crate::dedup::Deduplicator;
use crate::executor::{aggregate_failure, ExecutionOutcome, HandlerExecutor};
use crate::retry::FailureRouter;
use crate::router::TransportRouter;

/// 入队选项
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub idempotency_key: Option<String>,
    pub transport_name: Option<String>,
    pub priority: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl EnqueueOptions {
    pub fn idempotency_key(key: impl Into<String>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// 消息调度器：生产者入口
///
/// 入队流程：路由选择传输和队列 → 去重快路径 → 持久化
/// （存储层唯一约束冲突同样按重复处理）→ 同步传输立即内联执行。
pub struct MessageDispatcher {
    config: Arc<DispatcherConfig>,
    router: TransportRouter,
    dedup: Deduplicator,
    store: Arc<dyn EnvelopeStore>,
    executor: Arc<HandlerExecutor>,
    failure_router: Arc<FailureRouter>,
}

impl MessageDispatcher {
    pub fn new(
        config: Arc<DispatcherConfig>,
        store: Arc<dyn EnvelopeStore>,
        executor: Arc<HandlerExecutor>,
        failure_router: Arc<FailureRouter>,
    ) -> Self {
        Self {
            router: TransportRouter::new(config.clone()),
            dedup: Deduplicator::new(store.clone(), &config),
            config,
            store,
            executor,
            failure_router,
        }
    }

    /// 入队一条消息，返回信封id
    ///
    /// 去重命中时返回原始信封id，调用方可以当作自己的信封已被受理。
    pub async fn enqueue(
        &self,
        message: MessagePayload,
        options: EnqueueOptions,
    ) -> SymphonyResult<String> {
        let transport = match options.transport_name.as_deref() {
            Some(name) => self.router.resolve(name, message.message_type())?,
            None => self.router.route(&message)?,
        };
        let priority = options
            .priority
            .unwrap_or_else(|| self.router.priority_for(&message, transport));

        let mut envelope =
            MessageEnvelope::new(message, &transport.name, &transport.queue, priority)
                .with_metadata(options.metadata);
        if let Some(key) = options.idempotency_key {
            envelope = envelope.with_idempotency_key(key);
        }
        if let Some(at) = options.scheduled_at {
            envelope = envelope.with_scheduled_at(at);
        }

        if let Some(existing_id) = self.dedup.check_duplicate(&envelope).await? {
            debug!(
                envelope_id = %existing_id,
                message_type = envelope.message_type(),
                "enqueue resolved to existing envelope"
            );
            return Ok(existing_id);
        }

        match self.store.create(&envelope).await? {
            CreateOutcome::Created => {}
            // 并发生产者赢得了插入竞争，冲突即重复
            CreateOutcome::Duplicate { existing_id } => {
                return self.dedup.resolve_conflict(&envelope, existing_id).await;
            }
        }

        info!(
            envelope_id = %envelope.id,
            message_type = envelope.message_type(),
            transport = %envelope.transport_name,
            queue = %envelope.queue,
            priority = envelope.priority,
            "envelope enqueued"
        );

        if transport.kind == TransportKind::Sync && envelope.is_due(Utc::now()) {
            self.process_inline(&envelope).await?;
        }
        Ok(envelope.id)
    }

    /// 同步传输的内联执行；延迟投递的信封留给worker
    async fn process_inline(&self, envelope: &MessageEnvelope) -> SymphonyResult<()> {
        let claimed = self
            .store
            .transition_status(
                &envelope.id,
                EnvelopeStatus::Pending,
                EnvelopeStatus::Processing,
            )
            .await?;
        if !claimed {
            return Ok(());
        }
        let ctx = HandlerContext::for_envelope(envelope);
        let outcomes = self.executor.execute_all(envelope, &ctx).await;
        settle_outcomes(&*self.store, &self.failure_router, envelope, &outcomes).await
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

/// 按执行结果终结一个已认领的信封
///
/// 全部处理器成功 → completed；任一失败 → 交给失败路由器
/// 决定重试或写入失败账本。
pub(crate) async fn settle_outcomes(
    store: &dyn EnvelopeStore,
    failure_router: &FailureRouter,
    envelope: &MessageEnvelope,
    outcomes: &[ExecutionOutcome],
) -> SymphonyResult<()> {
    match aggregate_failure(outcomes) {
        None => {
            store
                .transition_status(
                    &envelope.id,
                    EnvelopeStatus::Processing,
                    EnvelopeStatus::Completed,
                )
                .await?;
            Ok(())
        }
        Some(error) => {
            failure_router.handle_failure(envelope, &error).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;
    use serde_json::json;
    use symphony_core::traits::{MockEnvelopeStore, MockFailedMessageLedger};
    use symphony_core::{SymphonyError, TransportConfig};

    use crate::registry::HandlerRegistry;

    fn dispatcher_with(store: MockEnvelopeStore, config: DispatcherConfig) -> MessageDispatcher {
        let config = Arc::new(config);
        let store: Arc<dyn EnvelopeStore> = Arc::new(store);
        let executor = Arc::new(HandlerExecutor::new(Arc::new(HandlerRegistry::new())));
        let failure_router = Arc::new(FailureRouter::new(
            store.clone(),
            Arc::new(MockFailedMessageLedger::new()),
            config.clone(),
        ));
        MessageDispatcher::new(config, store, executor, failure_router)
    }

    #[tokio::test]
    async fn enqueue_persists_a_routed_envelope() {
        let mut store = MockEnvelopeStore::new();
        store
            .expect_create()
            .withf(|envelope| {
                envelope.transport_name == "default"
                    && envelope.queue == "default"
                    && envelope.status == EnvelopeStatus::Pending
            })
            .times(1)
            .returning(|_| Ok(CreateOutcome::Created));

        let dispatcher = dispatcher_with(store, DispatcherConfig::default());
        let id = dispatcher
            .enqueue(
                MessagePayload::custom("send_campaign_step", json!({})),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn dedup_fast_path_short_circuits_before_persistence() {
        let original = MessageEnvelope::new(
            MessagePayload::custom("daily_digest", json!({})),
            "default",
            "default",
            3,
        )
        .with_idempotency_key("digest-2024-01-01");
        let original_id = original.id.clone();

        let mut store = MockEnvelopeStore::new();
        store
            .expect_find_duplicate()
            .return_once(move |_, _, _| Ok(Some(original)));
        store.expect_record_duplicate_attempt().returning(|_| Ok(()));
        store.expect_create().never();

        let dispatcher = dispatcher_with(store, DispatcherConfig::default());
        let id = dispatcher
            .enqueue(
                MessagePayload::custom("daily_digest", json!({})),
                EnqueueOptions::idempotency_key("digest-2024-01-01"),
            )
            .await
            .unwrap();
        assert_eq!(id, original_id);
    }

    #[tokio::test]
    async fn storage_conflict_is_reinterpreted_as_duplicate() {
        let mut store = MockEnvelopeStore::new();
        store.expect_find_duplicate().returning(|_, _, _| Ok(None));
        store.expect_record_duplicate_attempt().returning(|_| Ok(()));
        store.expect_create().return_once(|_| {
            Ok(CreateOutcome::Duplicate {
                existing_id: "winner-id".into(),
            })
        });

        let dispatcher = dispatcher_with(store, DispatcherConfig::default());
        let id = dispatcher
            .enqueue(
                MessagePayload::custom("daily_digest", json!({})),
                EnqueueOptions::idempotency_key("digest-2024-01-01"),
            )
            .await
            .unwrap();
        assert_eq!(id, "winner-id");
    }

    #[tokio::test]
    async fn explicit_unknown_transport_is_rejected() {
        let store = MockEnvelopeStore::new();
        let dispatcher = dispatcher_with(store, DispatcherConfig::default());
        let err = dispatcher
            .enqueue(
                MessagePayload::custom("x", json!({})),
                EnqueueOptions {
                    transport_name: Some("missing".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SymphonyError::Configuration(_)));
    }

    #[tokio::test]
    async fn priority_override_beats_routing_tables() {
        let mut config = DispatcherConfig::default();
        config.priority_routing.insert("urgent".into(), 5);
        config.transports.insert(
            "default".into(),
            TransportConfig {
                name: "default".into(),
                kind: TransportKind::Queued,
                queue: "default".into(),
                priority: 3,
                enabled: true,
            },
        );

        let mut store = MockEnvelopeStore::new();
        store
            .expect_create()
            .with(function(|envelope: &MessageEnvelope| envelope.priority == 9))
            .times(1)
            .returning(|_| Ok(CreateOutcome::Created));

        let dispatcher = dispatcher_with(store, config);
        dispatcher
            .enqueue(
                MessagePayload::custom("urgent", json!({})),
                EnqueueOptions {
                    priority: Some(9),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}
