use std::sync::Arc;

use tracing::debug;

use symphony_core::{
    DispatcherConfig, MessagePayload, SymphonyError, SymphonyResult, TransportConfig,
};

/// 传输路由器
///
/// 解析顺序：按消息类型的显式路由表，其次进程默认传输。
/// 无法路由的类型是配置错误，绝不静默丢弃。
pub struct TransportRouter {
    config: Arc<DispatcherConfig>,
}

impl TransportRouter {
    pub fn new(config: Arc<DispatcherConfig>) -> Self {
        Self { config }
    }

    pub fn route(&self, message: &MessagePayload) -> SymphonyResult<&TransportConfig> {
        let message_type = message.message_type();
        let transport_name = self
            .config
            .routing
            .get(message_type)
            .unwrap_or(&self.config.default_transport);
        self.resolve(transport_name, message_type)
    }

    /// 调用方显式指定传输时走这里，同样校验存在性和启用状态
    pub fn resolve(
        &self,
        transport_name: &str,
        message_type: &str,
    ) -> SymphonyResult<&TransportConfig> {
        let transport = self.config.transport(transport_name).ok_or_else(|| {
            SymphonyError::Configuration(format!(
                "message type {message_type} routes to unknown transport {transport_name}"
            ))
        })?;
        if !transport.enabled {
            return Err(SymphonyError::Configuration(format!(
                "transport {transport_name} is disabled (message type {message_type})"
            )));
        }
        debug!(message_type, transport = %transport.name, queue = %transport.queue, "route resolved");
        Ok(transport)
    }

    /// 消息优先级：按类型的覆盖表优先，否则用传输默认值
    pub fn priority_for(&self, message: &MessagePayload, transport: &TransportConfig) -> i32 {
        self.config
            .priority_routing
            .get(message.message_type())
            .copied()
            .unwrap_or(transport.priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use symphony_core::{TransportConfig, TransportKind};

    fn config_with_routes() -> Arc<DispatcherConfig> {
        let mut config = DispatcherConfig::default();
        config.transports.insert(
            "supabase".into(),
            TransportConfig {
                name: "supabase".into(),
                kind: TransportKind::Queued,
                queue: "messages".into(),
                priority: 5,
                enabled: true,
            },
        );
        config.transports.insert(
            "dark".into(),
            TransportConfig {
                name: "dark".into(),
                kind: TransportKind::Queued,
                queue: "dark".into(),
                priority: 1,
                enabled: false,
            },
        );
        config
            .routing
            .insert("send_campaign_step".into(), "supabase".into());
        config.priority_routing.insert("reminder_due".into(), 9);
        Arc::new(config)
    }

    #[test]
    fn explicit_route_wins_over_default() {
        let router = TransportRouter::new(config_with_routes());
        let message = MessagePayload::custom("send_campaign_step", json!({}));
        let transport = router.route(&message).unwrap();
        assert_eq!(transport.name, "supabase");
    }

    #[test]
    fn unrouted_type_falls_back_to_default_transport() {
        let router = TransportRouter::new(config_with_routes());
        let message = MessagePayload::custom("reminder_due", json!({}));
        assert_eq!(router.route(&message).unwrap().name, "default");
    }

    #[test]
    fn unknown_transport_is_a_configuration_error() {
        let mut config = DispatcherConfig::default();
        config.routing.insert("orphan".into(), "missing".into());
        let router = TransportRouter::new(Arc::new(config));
        let err = router
            .route(&MessagePayload::custom("orphan", json!({})))
            .unwrap_err();
        assert!(matches!(err, SymphonyError::Configuration(_)));
    }

    #[test]
    fn disabled_transport_is_a_configuration_error() {
        let mut config = DispatcherConfig::default();
        config.routing.insert("x".into(), "dark".into());
        config.transports.insert(
            "dark".into(),
            TransportConfig {
                name: "dark".into(),
                kind: TransportKind::Queued,
                queue: "dark".into(),
                priority: 1,
                enabled: false,
            },
        );
        let router = TransportRouter::new(Arc::new(config));
        let err = router
            .route(&MessagePayload::custom("x", json!({})))
            .unwrap_err();
        assert!(matches!(err, SymphonyError::Configuration(_)));
    }

    #[test]
    fn priority_routing_overrides_transport_default() {
        let config = config_with_routes();
        let router = TransportRouter::new(config.clone());
        let transport = config.transport("supabase").unwrap();

        let reminder = MessagePayload::custom("reminder_due", json!({}));
        assert_eq!(router.priority_for(&reminder, transport), 9);

        let campaign = MessagePayload::custom("send_campaign_step", json!({}));
        assert_eq!(router.priority_for(&campaign, transport), 5);
    }
}
