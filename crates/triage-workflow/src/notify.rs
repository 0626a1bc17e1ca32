//! 通知接口
//!
//! 核心只决定是否通知和通知内容；投递由外部传输实现。
//! 投递失败按放行策略处理，绝不回滚或阻塞已做出的临床决策。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_core::{Result, Urgency};
use uuid::Uuid;

/// 通知事件载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub event_type: String,
    pub urgency: Urgency,
    pub message: String,
    pub patient_id: Uuid,
    pub triage_event_id: Uuid,
    pub queue_id: Option<Uuid>,
    pub department: String,
    pub metadata: serde_json::Value,
}

/// 单渠道投递状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Skipped,
    Failed,
}

/// 单渠道投递记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDelivery {
    pub channel: String,
    pub status: DeliveryStatus,
    pub detail: String,
}

/// 外发通知传输接口
#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    fn label(&self) -> &str;

    /// 投递一条通知，返回各渠道的投递记录
    async fn dispatch(&self, event: &NotificationEvent) -> Result<Vec<NotificationDelivery>>;
}

/// 空实现：仅记录日志，不做任何投递
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn label(&self) -> &str {
        "disabled"
    }

    async fn dispatch(&self, event: &NotificationEvent) -> Result<Vec<NotificationDelivery>> {
        info!(
            "Notification noop for event={} urgency={} triage_event_id={}",
            event.event_type, event.urgency, event.triage_event_id
        );
        Ok(vec![NotificationDelivery {
            channel: "noop".to_string(),
            status: DeliveryStatus::Skipped,
            detail: "Disabled.".to_string(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_notifier_skips() {
        let notifier = NoopNotifier;
        let event = NotificationEvent {
            event_type: "TRIAGE_ESCALATION".to_string(),
            urgency: Urgency::Emergency,
            message: "test".to_string(),
            patient_id: Uuid::new_v4(),
            triage_event_id: Uuid::new_v4(),
            queue_id: None,
            department: "Cardiology".to_string(),
            metadata: serde_json::json!({}),
        };
        let deliveries = notifier.dispatch(&event).await.unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Skipped);
    }
}
