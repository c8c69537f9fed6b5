use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SymphonyResult;

/// 失败消息账本条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMessageRecord {
    pub envelope_id: String,
    pub transport_name: String,
    pub message_type: String,
    pub error: String,
    pub retry_count: i32,
    pub failed_at: DateTime<Utc>,
}

/// 失败消息账本
///
/// 耗尽重试预算的信封追加到这里，供运维检查或手工重放，
/// 与在线队列隔离。
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait FailedMessageLedger: Send + Sync {
    async fn record(&self, entry: &FailedMessageRecord) -> SymphonyResult<()>;
}
