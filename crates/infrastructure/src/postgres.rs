use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use symphony_core::{
    CreateOutcome, DuplicateAttempt, EnvelopeStatus, EnvelopeStore, FailedMessageLedger,
    FailedMessageRecord, MessageEnvelope, SymphonyError, SymphonyResult,
};

/// PostgreSQL信封存储
///
/// 去重的权威判定是`(idempotency_key, transport_name, window_bucket)`
/// 上的部分唯一索引；窗口桶由应用按配置的窗口长度计算写入。
/// 认领使用`FOR UPDATE SKIP LOCKED`加条件更新，并发worker互不阻塞。
pub struct PostgresEnvelopeStore {
    pool: PgPool,
    window_ms: i64,
}

impl PostgresEnvelopeStore {
    pub fn new(pool: PgPool, window: chrono::Duration) -> Self {
        Self {
            pool,
            window_ms: window.num_milliseconds().max(1),
        }
    }

    fn window_bucket(&self, created_at: DateTime<Utc>) -> i64 {
        created_at.timestamp_millis() / self.window_ms
    }

    fn row_to_envelope(row: &sqlx::postgres::PgRow) -> SymphonyResult<MessageEnvelope> {
        let message: serde_json::Value = row.try_get("message")?;
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let status: String = row.try_get("status")?;
        Ok(MessageEnvelope {
            id: row.try_get("id")?,
            message: serde_json::from_value(message)
                .map_err(|e| SymphonyError::Serialization(e.to_string()))?,
            transport_name: row.try_get("transport_name")?,
            queue: row.try_get("queue")?,
            priority: row.try_get("priority")?,
            idempotency_key: row.try_get("idempotency_key")?,
            status: status.parse()?,
            retry_count: row.try_get("retry_count")?,
            created_at: row.try_get("created_at")?,
            scheduled_at: row.try_get("scheduled_at")?,
            processed_at: row.try_get("processed_at")?,
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        })
    }
}

#[async_trait]
impl EnvelopeStore for PostgresEnvelopeStore {
    #[instrument(skip(self, envelope), fields(
        envelope_id = %envelope.id,
        message_type = envelope.message_type(),
        transport = %envelope.transport_name,
    ))]
    async fn create(&self, envelope: &MessageEnvelope) -> SymphonyResult<CreateOutcome> {
        let message = serde_json::to_value(&envelope.message)
            .map_err(|e| SymphonyError::Serialization(e.to_string()))?;
        let window_bucket = envelope
            .idempotency_key
            .as_ref()
            .map(|_| self.window_bucket(envelope.created_at));

        let result = sqlx::query(
            r#"
            INSERT INTO message_envelopes
                (id, message, message_type, transport_name, queue, priority,
                 idempotency_key, window_bucket, status, retry_count,
                 created_at, scheduled_at, processed_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (idempotency_key, transport_name, window_bucket)
                WHERE idempotency_key IS NOT NULL
                DO NOTHING
            "#,
        )
        .bind(&envelope.id)
        .bind(&message)
        .bind(envelope.message_type())
        .bind(&envelope.transport_name)
        .bind(&envelope.queue)
        .bind(envelope.priority)
        .bind(&envelope.idempotency_key)
        .bind(window_bucket)
        .bind(envelope.status.as_str())
        .bind(envelope.retry_count)
        .bind(envelope.created_at)
        .bind(envelope.scheduled_at)
        .bind(envelope.processed_at)
        .bind(serde_json::Value::Object(envelope.metadata.clone()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(CreateOutcome::Created);
        }

        // 唯一索引冲突：找回赢得插入竞争的原始信封
        let key = envelope.idempotency_key.as_deref().ok_or_else(|| {
            SymphonyError::Internal("insert conflict without idempotency key".into())
        })?;
        let since = envelope.created_at - chrono::Duration::milliseconds(self.window_ms);
        let existing = self
            .find_duplicate(key, &envelope.transport_name, since)
            .await?
            .ok_or_else(|| {
                SymphonyError::Internal(format!(
                    "insert conflict for key {key} but no original envelope found"
                ))
            })?;
        debug!(existing_id = %existing.id, "insert conflict resolved to existing envelope");
        Ok(CreateOutcome::Duplicate {
            existing_id: existing.id,
        })
    }

    async fn get(&self, id: &str) -> SymphonyResult<Option<MessageEnvelope>> {
        let row = sqlx::query("SELECT * FROM message_envelopes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_envelope).transpose()
    }

    #[instrument(skip(self))]
    async fn find_duplicate(
        &self,
        idempotency_key: &str,
        transport_name: &str,
        since: DateTime<Utc>,
    ) -> SymphonyResult<Option<MessageEnvelope>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM message_envelopes
            WHERE idempotency_key = $1 AND transport_name = $2 AND created_at >= $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(idempotency_key)
        .bind(transport_name)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_envelope).transpose()
    }

    async fn transition_status(
        &self,
        id: &str,
        from: EnvelopeStatus,
        to: EnvelopeStatus,
    ) -> SymphonyResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE message_envelopes
            SET status = $3,
                processed_at = CASE WHEN $4 THEN NOW() ELSE processed_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(to.is_terminal())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reschedule(
        &self,
        id: &str,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
    ) -> SymphonyResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE message_envelopes
            SET status = 'pending', retry_count = $2, scheduled_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retry_count)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SymphonyError::EnvelopeNotFound { id: id.to_string() });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SymphonyResult<Vec<MessageEnvelope>> {
        let rows = sqlx::query(
            r#"
            WITH due AS (
                SELECT id FROM message_envelopes
                WHERE status = 'pending'
                  AND (scheduled_at IS NULL OR scheduled_at <= $1)
                ORDER BY priority DESC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE message_envelopes e
            SET status = 'processing'
            FROM due
            WHERE e.id = due.id
            RETURNING e.*
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_envelope).collect()
    }

    async fn record_duplicate_attempt(&self, attempt: &DuplicateAttempt) -> SymphonyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO duplicate_attempts
                (idempotency_key, original_message_id, duplicate_message_id, attempted_at, status)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&attempt.idempotency_key)
        .bind(&attempt.original_message_id)
        .bind(&attempt.duplicate_message_id)
        .bind(attempt.attempted_at)
        .bind(match attempt.status {
            symphony_core::DuplicateAttemptStatus::Rejected => "rejected",
            symphony_core::DuplicateAttemptStatus::Returned => "returned",
        })
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// PostgreSQL失败消息账本（追加写）
pub struct PostgresFailedLedger {
    pool: PgPool,
}

impl PostgresFailedLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 最近的失败记录，供运维检查
    pub async fn recent(&self, limit: i64) -> SymphonyResult<Vec<FailedMessageRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT envelope_id, transport_name, message_type, error, retry_count, failed_at
            FROM failed_messages
            ORDER BY failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(FailedMessageRecord {
                    envelope_id: row.try_get("envelope_id")?,
                    transport_name: row.try_get("transport_name")?,
                    message_type: row.try_get("message_type")?,
                    error: row.try_get("error")?,
                    retry_count: row.try_get("retry_count")?,
                    failed_at: row.try_get("failed_at")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl FailedMessageLedger for PostgresFailedLedger {
    #[instrument(skip(self, entry), fields(envelope_id = %entry.envelope_id))]
    async fn record(&self, entry: &FailedMessageRecord) -> SymphonyResult<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_messages
                (envelope_id, transport_name, message_type, error, retry_count, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&entry.envelope_id)
        .bind(&entry.transport_name)
        .bind(&entry.message_type)
        .bind(&entry.error)
        .bind(entry.retry_count)
        .bind(entry.failed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
