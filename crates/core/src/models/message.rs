use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息负载类型
///
/// 业务生产者构造其中一个变体并交给调度器入队，
/// 处理器按类型标签注册并消费。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    SendCampaignStep(CampaignStepMessage),
    ReminderDue(ReminderMessage),
    WebhookDispatch(WebhookMessage),
    ContactUpdated(ContactUpdatedMessage),
    Custom {
        name: String,
        data: serde_json::Value,
    },
}

/// 营销活动步骤消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignStepMessage {
    pub campaign_id: String,
    pub step_id: String,
    pub contact_ids: Vec<i64>,
    #[serde(default)]
    pub variables: serde_json::Value,
}

/// 提醒到期消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub reminder_id: i64,
    pub contact_id: i64,
    pub due_at: DateTime<Utc>,
    pub channel: String,
}

/// Webhook调用消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    pub url: String,
    pub event: String,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// 联系人更新消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactUpdatedMessage {
    pub contact_id: i64,
    pub changed_fields: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl MessagePayload {
    /// 返回用于路由和处理器注册的类型标签
    pub fn message_type(&self) -> &str {
        match self {
            MessagePayload::SendCampaignStep(_) => "send_campaign_step",
            MessagePayload::ReminderDue(_) => "reminder_due",
            MessagePayload::WebhookDispatch(_) => "webhook_dispatch",
            MessagePayload::ContactUpdated(_) => "contact_updated",
            MessagePayload::Custom { name, .. } => name.as_str(),
        }
    }

    pub fn custom(name: impl Into<String>, data: serde_json::Value) -> Self {
        MessagePayload::Custom {
            name: name.into(),
            data,
        }
    }
}
