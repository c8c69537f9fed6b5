use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use symphony_core::MessageHandler;

/// 处理器注册表
///
/// 一个消息类型可以挂多个处理器；主处理器是最先注册的那个，
/// 扇出执行按注册顺序返回全部处理器。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let message_type = message_type.into();
        debug!(message_type = %message_type, handler = handler.name(), "handler registered");
        self.handlers
            .write()
            .await
            .entry(message_type)
            .or_default()
            .push(handler);
    }

    /// 主处理器（最先注册）
    pub async fn handler(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .await
            .get(message_type)
            .and_then(|handlers| handlers.first().cloned())
    }

    /// 该类型的全部处理器，按注册顺序
    pub async fn handlers(&self, message_type: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .await
            .get(message_type)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn registered_types(&self) -> Vec<String> {
        self.handlers.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use symphony_core::{HandlerContext, MessagePayload, SymphonyResult};

    struct NamedHandler(&'static str);

    #[async_trait]
    impl MessageHandler for NamedHandler {
        fn name(&self) -> &str {
            self.0
        }
        async fn handle(
            &self,
            _message: &MessagePayload,
            _ctx: &HandlerContext,
        ) -> SymphonyResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn primary_handler_is_first_registered() {
        let registry = HandlerRegistry::new();
        registry
            .register("contact_updated", Arc::new(NamedHandler("audit_logger")))
            .await;
        registry
            .register("contact_updated", Arc::new(NamedHandler("crm_sync")))
            .await;

        let primary = registry.handler("contact_updated").await.unwrap();
        assert_eq!(primary.name(), "audit_logger");

        let all = registry.handlers("contact_updated").await;
        assert_eq!(
            all.iter().map(|h| h.name()).collect::<Vec<_>>(),
            vec!["audit_logger", "crm_sync"]
        );
    }

    #[tokio::test]
    async fn unknown_type_has_no_handlers() {
        let registry = HandlerRegistry::new();
        assert!(registry.handler("nope").await.is_none());
        assert!(registry.handlers("nope").await.is_empty());
    }
}
