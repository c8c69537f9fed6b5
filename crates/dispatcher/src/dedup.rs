use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use symphony_core::{
    DispatcherConfig, DuplicateAttempt, EnvelopeStore, MessageEnvelope, SymphonyError,
    SymphonyResult,
};

/// 去重器
///
/// 幂等键是调用方自愿提供的，没有键的信封永远不参与去重。
/// 窗口是滚动的：同一个键在窗口过期后可以合法复用
/// （例如每日摘要任务天然会重复出现）。
///
/// 这里的查询只是快路径优化，权威判定是存储层在
/// (idempotency_key, transport_name, 窗口桶)上的唯一约束；
/// 插入冲突通过[`resolve_conflict`](Deduplicator::resolve_conflict)
/// 走同一套策略。
pub struct Deduplicator {
    store: Arc<dyn EnvelopeStore>,
    window: chrono::Duration,
    reject_duplicates: bool,
    track_attempts: bool,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn EnvelopeStore>, config: &DispatcherConfig) -> Self {
        Self {
            store,
            window: config.dedup_window(),
            reject_duplicates: config.dedup.reject_duplicates,
            track_attempts: config.dedup.track_attempts,
        }
    }

    /// 窗口内查找逻辑重复的信封，命中时返回原始信封id
    ///
    /// 存储查询失败必须向调用方传播：去重正确性本身就是投递保证，
    /// 不能降级为尽力而为。
    pub async fn check_duplicate(
        &self,
        envelope: &MessageEnvelope,
    ) -> SymphonyResult<Option<String>> {
        let Some(key) = envelope.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let since = Utc::now() - self.window;
        let existing = self
            .store
            .find_duplicate(key, &envelope.transport_name, since)
            .await?;
        match existing {
            Some(original) => {
                debug!(
                    idempotency_key = key,
                    original_id = %original.id,
                    duplicate_id = %envelope.id,
                    "duplicate envelope detected"
                );
                self.resolve_conflict(envelope, original.id).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// 按配置策略处置一次重复：记录审计，然后返回原始id或抛错
    ///
    /// 存储层唯一约束冲突也从这里走，保证两条路径行为一致。
    pub async fn resolve_conflict(
        &self,
        envelope: &MessageEnvelope,
        original_id: String,
    ) -> SymphonyResult<String> {
        let key = envelope.idempotency_key.clone().unwrap_or_default();
        if self.track_attempts {
            let attempt = if self.reject_duplicates {
                DuplicateAttempt::rejected(&key, &original_id, &envelope.id)
            } else {
                DuplicateAttempt::returned(&key, &original_id, &envelope.id)
            };
            // 审计是尽力而为，不阻塞调用方
            if let Err(e) = self.store.record_duplicate_attempt(&attempt).await {
                warn!(error = %e, idempotency_key = %key, "failed to record duplicate attempt");
            }
        }
        if self.reject_duplicates {
            return Err(SymphonyError::DuplicateRejected {
                key,
                original_id,
            });
        }
        Ok(original_id)
    }
}
