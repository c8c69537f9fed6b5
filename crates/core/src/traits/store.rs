use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::SymphonyResult;
use crate::models::{DuplicateAttempt, EnvelopeStatus, MessageEnvelope};

/// 信封持久化结果
///
/// 存储层在(idempotency_key, transport_name, 窗口桶)上持有唯一约束，
/// 插入冲突在这里显式暴露，由调度器解释为"发现重复"。
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    Duplicate { existing_id: String },
}

/// 信封存储抽象接口
///
/// 信封状态的唯一事实来源。状态迁移必须是条件更新，
/// 两个worker不可能同时认领同一个信封。
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// 持久化新信封；唯一约束冲突返回 [`CreateOutcome::Duplicate`]
    async fn create(&self, envelope: &MessageEnvelope) -> SymphonyResult<CreateOutcome>;

    /// 按id读取信封
    async fn get(&self, id: &str) -> SymphonyResult<Option<MessageEnvelope>>;

    /// 查找去重窗口内相同幂等键和传输的最近一个信封
    async fn find_duplicate(
        &self,
        idempotency_key: &str,
        transport_name: &str,
        since: DateTime<Utc>,
    ) -> SymphonyResult<Option<MessageEnvelope>>;

    /// 乐观并发状态迁移；仅当当前状态等于`from`时生效，返回是否成功
    async fn transition_status(
        &self,
        id: &str,
        from: EnvelopeStatus,
        to: EnvelopeStatus,
    ) -> SymphonyResult<bool>;

    /// 以新的重试次数把信封重新放回pending，并设置下次执行时间
    async fn reschedule(
        &self,
        id: &str,
        retry_count: i32,
        scheduled_at: DateTime<Utc>,
    ) -> SymphonyResult<()>;

    /// 原子认领到期的pending信封并将其置为processing
    async fn claim_due(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SymphonyResult<Vec<MessageEnvelope>>;

    /// 记录一次重复入队尝试（审计用途）
    async fn record_duplicate_attempt(&self, attempt: &DuplicateAttempt) -> SymphonyResult<()>;
}
