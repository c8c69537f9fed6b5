use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 重复入队尝试的审计记录
///
/// 仅用于观察和排查，不参与去重判定本身。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateAttempt {
    pub idempotency_key: String,
    pub original_message_id: String,
    pub duplicate_message_id: String,
    pub attempted_at: DateTime<Utc>,
    pub status: DuplicateAttemptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAttemptStatus {
    /// 调用方收到了错误
    Rejected,
    /// 调用方透明地拿到了原始信封id
    Returned,
}

impl DuplicateAttempt {
    pub fn returned(
        idempotency_key: impl Into<String>,
        original_message_id: impl Into<String>,
        duplicate_message_id: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            original_message_id: original_message_id.into(),
            duplicate_message_id: duplicate_message_id.into(),
            attempted_at: Utc::now(),
            status: DuplicateAttemptStatus::Returned,
        }
    }

    pub fn rejected(
        idempotency_key: impl Into<String>,
        original_message_id: impl Into<String>,
        duplicate_message_id: impl Into<String>,
    ) -> Self {
        Self {
            status: DuplicateAttemptStatus::Rejected,
            ..Self::returned(idempotency_key, original_message_id, duplicate_message_id)
        }
    }
}
