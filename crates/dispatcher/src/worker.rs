use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use symphony_core::{
    EnvelopeStatus, EnvelopeStore, HandlerContext, MessageEnvelope, SymphonyResult,
};

use crate::dispatcher::settle_outcomes;
use crate::executor::HandlerExecutor;
use crate::retry::FailureRouter;

/// Worker轮询配置
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// 单个信封的处理时限，worker据此设置上下文deadline
    pub handler_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 10,
            handler_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// 轮询worker：消费端
///
/// 通过存储层的条件更新认领到期的pending信封，
/// 同一个信封不可能被两个worker同时认领。
/// 每个信封内部对全部注册处理器并发扇出。
pub struct PollingWorker {
    store: Arc<dyn EnvelopeStore>,
    executor: Arc<HandlerExecutor>,
    failure_router: Arc<FailureRouter>,
    config: WorkerConfig,
}

impl PollingWorker {
    pub fn new(
        store: Arc<dyn EnvelopeStore>,
        executor: Arc<HandlerExecutor>,
        failure_router: Arc<FailureRouter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            failure_router,
            config,
        }
    }

    /// 轮询直到shutdown信号
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "polling worker started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // 发送端关闭同样视为shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        info!("polling worker shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "worker poll failed");
                    }
                }
            }
        }
    }

    /// 认领并处理一批到期信封，返回处理数量
    pub async fn poll_once(&self) -> SymphonyResult<usize> {
        let due = self.store.claim_due(self.config.batch_size, Utc::now()).await?;
        let count = due.len();
        if count > 0 {
            debug!(count, "claimed due envelopes");
        }
        for envelope in due {
            let envelope_id = envelope.id.clone();
            if let Err(e) = self.process(envelope).await {
                // 单个信封落盘失败不得连累同批其余已认领的信封
                error!(envelope_id = %envelope_id, error = %e, "envelope settlement failed");
                self.release(&envelope_id).await;
            }
        }
        Ok(count)
    }

    /// 落盘失败的信封退回pending，等待下一轮重新认领；
    /// 否则它会卡在processing且永远不被`claim_due`选中
    async fn release(&self, envelope_id: &str) {
        match self
            .store
            .transition_status(envelope_id, EnvelopeStatus::Processing, EnvelopeStatus::Pending)
            .await
        {
            Ok(true) => debug!(envelope_id, "claimed envelope released back to pending"),
            Ok(false) => {}
            Err(e) => error!(envelope_id, error = %e, "failed to release claimed envelope"),
        }
    }

    async fn process(&self, envelope: MessageEnvelope) -> SymphonyResult<()> {
        let mut ctx = HandlerContext::for_envelope(&envelope);
        if let Some(timeout) = self.config.handler_timeout {
            let timeout = chrono::Duration::from_std(timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
            ctx = ctx.with_deadline(Utc::now() + timeout);
        }
        let outcomes = self.executor.execute_all(&envelope, &ctx).await;
        settle_outcomes(&*self.store, &self.failure_router, &envelope, &outcomes).await
    }
}
