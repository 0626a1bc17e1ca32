//! Webhook通知传输
//!
//! 将引擎产出的通知事件以HTTP POST推送到外部系统，支持：
//! - 多端点配置与紧急程度过滤
//! - 安全的Webhook签名
//! - 放行式错误处理：失败只记录投递结果，不回滚决策

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use triage_core::{Result, TriageConfig, TriageError, Urgency};
use triage_workflow::notify::{
    DeliveryStatus, NotificationDelivery, NotificationEvent, Notifier,
};
use uuid::Uuid;

/// Webhook端点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: String,
    pub url: String,
    pub secret: Option<String>,
    /// 低于该紧急程度的事件不向此端点投递
    pub min_urgency: Urgency,
    pub active: bool,
}

impl WebhookEndpoint {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            secret,
            min_urgency: Urgency::Routine,
            active: true,
        }
    }

    /// 检查是否对指定紧急程度的事件感兴趣
    pub fn is_interested_in(&self, urgency: Urgency) -> bool {
        self.active && urgency >= self.min_urgency
    }

    /// 生成签名
    pub fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        if let Some(secret) = &self.secret {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            Some(format!("sha256={:x}", hasher.finalize()))
        } else {
            None
        }
    }
}

/// Webhook通知器
///
/// 实现工作流层的 [`Notifier`] 接口，按端点逐个投递并返回投递记录。
#[derive(Debug)]
pub struct WebhookNotifier {
    endpoints: Vec<WebhookEndpoint>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// 创建新的Webhook通知器
    pub fn new(endpoints: Vec<WebhookEndpoint>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { endpoints, client }
    }

    /// 从运行时配置构建；未配置Webhook地址时返回None
    pub fn from_config(config: &TriageConfig) -> Option<Self> {
        if config.notification_webhook_url.trim().is_empty() {
            return None;
        }
        let endpoint = WebhookEndpoint::new(config.notification_webhook_url.trim(), None);
        Some(Self::new(
            vec![endpoint],
            Duration::from_secs(config.notification_timeout_seconds),
        ))
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// 发送单个Webhook请求
    async fn send_to_endpoint(
        &self,
        endpoint: &WebhookEndpoint,
        event: &NotificationEvent,
        payload: &str,
    ) -> NotificationDelivery {
        let mut request = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "Triage-Webhook/1.0")
            .header("X-Triage-Event", event.event_type.clone())
            .body(payload.to_string());

        // 添加签名头
        if let Some(signature) = endpoint.generate_signature(payload) {
            request = request.header("X-Triage-Signature", signature);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!("Webhook delivered to {}", endpoint.url);
                NotificationDelivery {
                    channel: endpoint.url.clone(),
                    status: DeliveryStatus::Sent,
                    detail: format!("HTTP {}", response.status()),
                }
            }
            Ok(response) => {
                error!(
                    "Webhook to {} rejected with status {}",
                    endpoint.url,
                    response.status()
                );
                NotificationDelivery {
                    channel: endpoint.url.clone(),
                    status: DeliveryStatus::Failed,
                    detail: format!("HTTP {}", response.status()),
                }
            }
            Err(err) => {
                error!("Webhook to {} failed: {}", endpoint.url, err);
                NotificationDelivery {
                    channel: endpoint.url.clone(),
                    status: DeliveryStatus::Failed,
                    detail: err.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn label(&self) -> &str {
        "webhook"
    }

    /// 向所有感兴趣的端点投递事件
    ///
    /// 部分失败返回Ok并在记录中标记；全部失败时返回错误，
    /// 由调用方按放行策略处理。
    async fn dispatch(&self, event: &NotificationEvent) -> Result<Vec<NotificationDelivery>> {
        let interested: Vec<&WebhookEndpoint> = self
            .endpoints
            .iter()
            .filter(|ep| ep.is_interested_in(event.urgency))
            .collect();

        if interested.is_empty() {
            debug!(
                "No webhook endpoint interested in event={} urgency={}",
                event.event_type, event.urgency
            );
            return Ok(vec![NotificationDelivery {
                channel: "webhook".to_string(),
                status: DeliveryStatus::Skipped,
                detail: "No interested endpoint.".to_string(),
            }]);
        }

        let payload = serde_json::to_string(event)?;

        let mut deliveries = Vec::with_capacity(interested.len());
        for endpoint in interested {
            deliveries
                .push(self.send_to_endpoint(endpoint, event, &payload).await);
        }

        if deliveries
            .iter()
            .all(|d| d.status == DeliveryStatus::Failed)
        {
            return Err(TriageError::Notification(format!(
                "all {} webhook endpoints failed",
                deliveries.len()
            )));
        }

        Ok(deliveries)
    }
}
