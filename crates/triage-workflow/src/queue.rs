//! 人工审核队列
//!
//! 等待护士决策的病例积压。稳定优先级排序：
//! 优先级降序，同优先级按入队时间先后，不重排。

use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use triage_core::{QueueItem, QueueItemStatus, Result, TriageError, Urgency};
use uuid::Uuid;

/// 人工审核队列
#[derive(Debug, Default)]
pub struct ReviewQueue {
    items: RwLock<HashMap<Uuid, QueueItem>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队一个待人工处理的病例
    pub async fn enqueue(
        &self,
        triage_event_id: Uuid,
        patient_id: Uuid,
        urgency: Urgency,
        reason: impl Into<String>,
        priority: u8,
    ) -> QueueItem {
        let item = QueueItem {
            id: Uuid::new_v4(),
            triage_event_id,
            patient_id,
            status: QueueItemStatus::Pending,
            reason: reason.into(),
            priority,
            urgency,
            created_at: Utc::now(),
            resolved_at: None,
            assigned_to: None,
            resolution_note: None,
        };
        let mut items = self.items.write().await;
        items.insert(item.id, item.clone());
        info!(
            "Enqueued review case {} (priority {}, urgency {})",
            item.id, item.priority, item.urgency
        );
        item
    }

    pub async fn get(&self, queue_id: Uuid) -> Option<QueueItem> {
        let items = self.items.read().await;
        items.get(&queue_id).cloned()
    }

    /// 按状态列出队列项，分页返回
    pub async fn list(
        &self,
        status: QueueItemStatus,
        offset: usize,
        limit: usize,
    ) -> Vec<QueueItem> {
        let items = self.items.read().await;
        let mut selected: Vec<QueueItem> = items
            .values()
            .filter(|item| item.status == status)
            .cloned()
            .collect();
        selected.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            std::cmp::Ordering::Equal => a.created_at.cmp(&b.created_at),
            other => other,
        });

        let start = offset.min(selected.len());
        let end = start.saturating_add(limit).min(selected.len());
        selected[start..end].to_vec()
    }

    /// 所有待处理项，排序同 [`Self::list`]
    pub async fn pending(&self) -> Vec<QueueItem> {
        self.list(QueueItemStatus::Pending, 0, usize::MAX).await
    }

    pub async fn pending_count(&self) -> usize {
        let items = self.items.read().await;
        items
            .values()
            .filter(|item| item.status == QueueItemStatus::Pending)
            .count()
    }

    /// 将队列项标记为已处理
    ///
    /// 项不存在报 NotFound，已处理项重复操作报 Conflict。
    /// 查找与状态变更在同一把写锁内完成，杜绝双重处理竞争。
    pub async fn mark_resolved(
        &self,
        queue_id: Uuid,
        assigned_to: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<QueueItem> {
        let mut items = self.items.write().await;
        let item = items.get_mut(&queue_id).ok_or_else(|| {
            TriageError::NotFound(format!("Queue item {} not found", queue_id))
        })?;
        if item.status == QueueItemStatus::Resolved {
            return Err(TriageError::Conflict(format!(
                "Queue item {} already resolved",
                queue_id
            )));
        }
        item.status = QueueItemStatus::Resolved;
        item.resolved_at = Some(Utc::now());
        item.assigned_to = Some(assigned_to.into());
        item.resolution_note = Some(note.into());
        info!("Resolved review case {}", queue_id);
        Ok(item.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use triage_core::ESCALATION_PRIORITY;

    #[tokio::test]
    async fn test_priority_ordering_is_stable() {
        let queue = ReviewQueue::new();
        let routine = queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Routine,
                "low acuity",
                Urgency::Routine.rank(),
            )
            .await;
        let urgent_a = queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Urgent,
                "first urgent",
                Urgency::Urgent.rank(),
            )
            .await;
        let urgent_b = queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Urgent,
                "second urgent",
                Urgency::Urgent.rank(),
            )
            .await;
        // 显式拉开入队时间，避免同一毫秒内的并列
        {
            let mut items = queue.items.write().await;
            items.get_mut(&urgent_a.id).unwrap().created_at =
                Utc::now() - Duration::minutes(2);
            items.get_mut(&urgent_b.id).unwrap().created_at =
                Utc::now() - Duration::minutes(1);
        }

        let pending = queue.pending().await;
        let ids: Vec<Uuid> = pending.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![urgent_a.id, urgent_b.id, routine.id]);
    }

    #[tokio::test]
    async fn test_escalation_priority_tops_queue() {
        let queue = ReviewQueue::new();
        queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Emergency,
                "emergency review",
                Urgency::Emergency.rank(),
            )
            .await;
        let escalated = queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Emergency,
                "hard escalation",
                ESCALATION_PRIORITY,
            )
            .await;

        let pending = queue.pending().await;
        assert_eq!(pending[0].id, escalated.id);
    }

    #[tokio::test]
    async fn test_double_resolve_is_a_conflict() {
        let queue = ReviewQueue::new();
        let item = queue
            .enqueue(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Soon,
                "needs review",
                Urgency::Soon.rank(),
            )
            .await;

        let resolved = queue
            .mark_resolved(item.id, "Nurse Chen", "booked")
            .await
            .unwrap();
        assert_eq!(resolved.status, QueueItemStatus::Resolved);
        assert!(resolved.resolved_at.is_some());

        let again = queue.mark_resolved(item.id, "Nurse Chen", "again").await;
        assert!(matches!(again, Err(TriageError::Conflict(_))));

        let missing = queue
            .mark_resolved(Uuid::new_v4(), "Nurse Chen", "missing")
            .await;
        assert!(matches!(missing, Err(TriageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let queue = ReviewQueue::new();
        for i in 0..5 {
            queue
                .enqueue(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    Urgency::Routine,
                    format!("case {}", i),
                    Urgency::Routine.rank(),
                )
                .await;
        }
        let page = queue.list(QueueItemStatus::Pending, 2, 2).await;
        assert_eq!(page.len(), 2);
        let tail = queue.list(QueueItemStatus::Pending, 4, 10).await;
        assert_eq!(tail.len(), 1);
        // 偏移与不限条数组合不得溢出
        let rest = queue.list(QueueItemStatus::Pending, 1, usize::MAX).await;
        assert_eq!(rest.len(), 4);
        let past_end = queue.list(QueueItemStatus::Pending, 9, usize::MAX).await;
        assert!(past_end.is_empty());
    }
}
