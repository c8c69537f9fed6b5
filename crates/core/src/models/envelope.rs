use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::SymphonyError;

use super::MessagePayload;

/// 信封状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl EnvelopeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeStatus::Pending => "pending",
            EnvelopeStatus::Processing => "processing",
            EnvelopeStatus::Completed => "completed",
            EnvelopeStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnvelopeStatus::Completed | EnvelopeStatus::Failed)
    }
}

impl FromStr for EnvelopeStatus {
    type Err = SymphonyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnvelopeStatus::Pending),
            "processing" => Ok(EnvelopeStatus::Processing),
            "completed" => Ok(EnvelopeStatus::Completed),
            "failed" => Ok(EnvelopeStatus::Failed),
            other => Err(SymphonyError::Serialization(format!(
                "unknown envelope status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EnvelopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 消息信封
///
/// 调度器的工作单元：业务负载加上路由与重试元数据。
/// id在创建后不可变，状态只由调度器推进。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub message: MessagePayload,
    pub transport_name: String,
    pub queue: String,
    pub priority: i32,
    pub idempotency_key: Option<String>,
    pub status: EnvelopeStatus,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MessageEnvelope {
    pub fn new(
        message: MessagePayload,
        transport_name: impl Into<String>,
        queue: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message,
            transport_name: transport_name.into(),
            queue: queue.into(),
            priority,
            idempotency_key: None,
            status: EnvelopeStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            scheduled_at: None,
            processed_at: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn message_type(&self) -> &str {
        self.message.message_type()
    }

    /// 到达执行时刻：未设置scheduled_at或已到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map(|at| at <= now).unwrap_or(true)
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn sample_payload() -> MessagePayload {
        MessagePayload::custom("nightly_cleanup", json!({}))
    }

    #[test]
    fn new_envelope_starts_pending_with_zero_retries() {
        let envelope = MessageEnvelope::new(sample_payload(), "supabase", "default", 3);
        assert_eq!(envelope.status, EnvelopeStatus::Pending);
        assert_eq!(envelope.retry_count, 0);
        assert!(envelope.idempotency_key.is_none());
        assert!(envelope.processed_at.is_none());
    }

    #[test]
    fn envelope_without_schedule_is_immediately_due() {
        let envelope = MessageEnvelope::new(sample_payload(), "supabase", "default", 3);
        assert!(envelope.is_due(Utc::now()));
    }

    #[test]
    fn scheduled_envelope_is_due_only_after_its_time() {
        let now = Utc::now();
        let envelope = MessageEnvelope::new(sample_payload(), "supabase", "default", 3)
            .with_scheduled_at(now + Duration::minutes(5));
        assert!(!envelope.is_due(now));
        assert!(envelope.is_due(now + Duration::minutes(6)));
    }

    #[test]
    fn status_parses_from_storage_representation() {
        for status in [
            EnvelopeStatus::Pending,
            EnvelopeStatus::Processing,
            EnvelopeStatus::Completed,
            EnvelopeStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<EnvelopeStatus>().unwrap(), status);
        }
        assert!("unknown".parse::<EnvelopeStatus>().is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(EnvelopeStatus::Completed.is_terminal());
        assert!(EnvelopeStatus::Failed.is_terminal());
        assert!(!EnvelopeStatus::Pending.is_terminal());
        assert!(!EnvelopeStatus::Processing.is_terminal());
    }
}
