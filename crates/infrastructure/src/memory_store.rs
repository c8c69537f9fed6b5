use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use symphony_core::{
    CreateOutcome, DuplicateAttempt, EnvelopeStatus, EnvelopeStore, FailedMessageLedger,
    FailedMessageRecord, MessageEnvelope, SymphonyError, SymphonyResult,
};

/// 内存信封存储
///
/// 适用于嵌入式部署和测试场景。与PostgreSQL实现保持同一套语义：
/// (idempotency_key, transport_name)在去重窗口内唯一，
/// 插入冲突显式返回而不是静默成功。
#[derive(Debug)]
pub struct InMemoryEnvelopeStore {
    window: chrono::Duration,
    envelopes: RwLock<HashMap<String, MessageEnvelope>>,
    attempts: RwLock<Vec<DuplicateAttempt>>,
}

impl InMemoryEnvelopeStore {
    /// 默认24小时去重窗口
    pub fn new() -> Self {
        Self::with_window(chrono::Duration::hours(24))
    }

    pub fn with_window(window: chrono::Duration) -> Self {
        Self {
            window,
            envelopes: RwLock::new(HashMap::new()),
            attempts: RwLock::new(Vec::new()),
        }
    }

    /// 审计记录，测试和诊断用
    pub async fn duplicate_attempts(&self) -> Vec<DuplicateAttempt> {
        self.attempts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.envelopes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.envelopes.read().await.is_empty()
    }

    fn most_recent_match(
        envelopes: &HashMap<String, MessageEnvelope>,
        idempotency_key: &str,
        transport_name: &str,
        since: DateTime<Utc>,
    ) -> Option<MessageEnvelope> {
        envelopes
            .values()
            .filter(|e| {
                e.idempotency_key.as_deref() == Some(idempotency_key)
                    && e.transport_name == transport_name
                    && e.created_at >= since
            })
            .max_by_key(|e| e.created_at)
            .cloned()
    }
}

impl Default for InMemoryEnvelopeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvelopeStore for InMemoryEnvelopeStore {
    async fn create(&self, envelope: &MessageEnvelope) -> SymphonyResult<CreateOutcome> {
        let mut envelopes = self.envelopes.write().await;
        if let Some(key) = envelope.idempotency_key.as_deref() {
            let since = envelope.created_at - self.window;
            if let Some(existing) =
                Self::most_recent_match(&envelopes, key, &envelope.transport_name, since)
            {
                debug!(
                    existing_id = %existing.id,
                    idempotency_key = key,
                    "unique constraint conflict on insert"
                );
                return Ok(CreateOutcome::Duplicate {
                    existing_id: existing.id,
                });
            }
        }
        envelopes.insert(envelope.id.clone(), envelope.clone());
        Ok(CreateOutcome::Created)
    }

    async fn get(&self, id: &str) -> SymphonyResult<Option<MessageEnvelope>> {
        Ok(self.envelopes.read().await.get(id).cloned())
    }

    async fn find_duplicate(
        &self,
        idempotency_key: &str,
        transport_name: &str,
        since: DateTime<Utc>,
    ) -> SymphonyResult<Option<MessageEnvelope>> {
        let envelopes = self.envelopes.read().await;
        Ok(Self::most_recent_match(
            &envelopes,
            idempotency_key,
            transport_name,
            since,
        ))
    }

    async fn transition_status(
        &self,
        id: &str,
        from: EnvelopeStatus,
        to: EnvelopeStatus,
    ) -> SymphonyResult<bool> {
        let mut envelopes = self.envelopes.write().await;
        match envelopes.get_mut(id) {
            Some(envelope) if envelope.status == from => {
                envelope.status = to;
                if to.is_terminal() {
                    envelope.processed_at = Some(Utc::now());
                }
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SymphonyError::EnvelopeNotFound { id: id.to_string() }),
        }
    }

    async fn reschedule(
        &self,
        id: &str,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
    ) -> SymphonyResult<()> {
        let mut envelopes = self.envelopes.write().await;
        let envelope = envelopes
            .get_mut(id)
            .ok_or_else(|| SymphonyError::EnvelopeNotFound { id: id.to_string() })?;
        envelope.status = EnvelopeStatus::Pending;
        envelope.retry_count = retry_count;
        envelope.scheduled_at = Some(scheduled_at);
        Ok(())
    }

    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SymphonyResult<Vec<MessageEnvelope>> {
        let mut envelopes = self.envelopes.write().await;
        let mut due: Vec<(i32, DateTime<Utc>, String)> = envelopes
            .values()
            .filter(|e| e.status == EnvelopeStatus::Pending && e.is_due(now))
            .map(|e| (e.priority, e.created_at, e.id.clone()))
            .collect();
        // 高优先级先出，同优先级按创建时间先来先服务
        due.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut claimed = Vec::new();
        for (_, _, id) in due.into_iter().take(limit) {
            if let Some(envelope) = envelopes.get_mut(&id) {
                envelope.status = EnvelopeStatus::Processing;
                claimed.push(envelope.clone());
            }
        }
        Ok(claimed)
    }

    async fn record_duplicate_attempt(&self, attempt: &DuplicateAttempt) -> SymphonyResult<()> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }
}

/// 内存失败消息账本
#[derive(Debug, Default)]
pub struct InMemoryFailedLedger {
    entries: RwLock<Vec<FailedMessageRecord>>,
}

impl InMemoryFailedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<FailedMessageRecord> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl FailedMessageLedger for InMemoryFailedLedger {
    async fn record(&self, entry: &FailedMessageRecord) -> SymphonyResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
