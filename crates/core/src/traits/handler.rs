use async_trait::async_trait;

use crate::errors::SymphonyResult;
use crate::models::{HandlerContext, MessagePayload};

/// 消息处理器抽象接口
///
/// 业务侧按消息类型注册实现；同一类型可注册多个处理器做扇出
/// （例如contact_updated同时驱动审计日志和CRM同步）。
#[cfg_attr(feature = "test-util", mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 处理器名称，用于日志和执行结果归属
    fn name(&self) -> &str;

    /// 处理一条消息
    ///
    /// 返回错误默认视为可重试；处理器可以通过
    /// [`SymphonyError::Handler`](crate::SymphonyError::Handler)
    /// 携带`retryable=false`显式标记永久失败。
    async fn handle(&self, message: &MessagePayload, ctx: &HandlerContext) -> SymphonyResult<()>;
}
