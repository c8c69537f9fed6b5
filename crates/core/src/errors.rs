use thiserror::Error;

/// 调度运行时错误类型定义
#[derive(Debug, Error)]
pub enum SymphonyError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("传输层错误: {0}")]
    Transport(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("信封未找到: {id}")]
    EnvelopeNotFound { id: String },

    #[error("重复消息被拒绝: idempotency_key={key}, 原始信封={original_id}")]
    DuplicateRejected { key: String, original_id: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SymphonyResult<T> = std::result::Result<T, SymphonyError>;

/// Classified failure raised by (or on behalf of) a message handler.
///
/// Every failure that escapes the middleware pipeline is normalized into
/// this shape so callers can decide on retry without inspecting the source.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("handler {handler} failed for {message_type} ({message_id}): {detail}")]
pub struct HandlerError {
    pub message_id: String,
    pub message_type: String,
    pub handler: String,
    pub kind: HandlerErrorKind,
    pub retryable: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// Missing handler or unroutable type. Operator error, never retried.
    Configuration,
    /// Malformed payload rejected before the handler ran.
    Validation,
    /// Handler exceeded the context deadline.
    Timeout,
    /// Failure raised by the handler itself.
    Execution,
}

impl HandlerError {
    pub fn retryable(
        message_id: impl Into<String>,
        message_type: impl Into<String>,
        handler: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            message_type: message_type.into(),
            handler: handler.into(),
            kind: HandlerErrorKind::Execution,
            retryable: true,
            detail: detail.into(),
        }
    }

    pub fn non_retryable(
        message_id: impl Into<String>,
        message_type: impl Into<String>,
        handler: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind: HandlerErrorKind::Execution,
            retryable: false,
            ..Self::retryable(message_id, message_type, handler, detail)
        }
    }

    pub fn with_kind(mut self, kind: HandlerErrorKind) -> Self {
        self.kind = kind;
        self
    }
}
