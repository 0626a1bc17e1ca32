//! 审计日志
//!
//! 只写日志接口：核心只向其追加，从不读取自身历史做决策。

use std::sync::RwLock;
use tracing::debug;
use triage_core::AuditLogEntry;

/// 审计动作名
pub mod actions {
    pub const TRIAGE_CREATED: &str = "TRIAGE_CREATED";
    pub const ROUTING_DECIDED: &str = "ROUTING_DECIDED";
    pub const APPOINTMENT_BOOKED: &str = "APPOINTMENT_BOOKED";
    pub const APPOINTMENT_PREEMPTED: &str = "APPOINTMENT_PREEMPTED";
    pub const APPOINTMENT_CANCELLED: &str = "APPOINTMENT_CANCELLED";
    pub const QUEUE_ENQUEUED: &str = "QUEUE_ENQUEUED";
    pub const QUEUE_RESOLVED: &str = "QUEUE_RESOLVED";
    pub const NOTIFICATION_DISPATCHED: &str = "NOTIFICATION_DISPATCHED";
    pub const NOTIFICATION_FAILED: &str = "NOTIFICATION_FAILED";
    pub const INTAKE_AUDITED: &str = "INTAKE_AUDITED";
}

/// 审计落库接口
///
/// 实现方负责持久化；写入须在分诊结果返回调用方之前完成。
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    fn record(&self, entry: AuditLogEntry);
}

/// 内存审计日志
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 当前全部条目的快照
    pub fn snapshot(&self) -> Vec<AuditLogEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// 指定动作的条目数
    pub fn count_action(&self, action: &str) -> usize {
        self.entries
            .read()
            .map(|entries| entries.iter().filter(|e| e.action == action).count())
            .unwrap_or(0)
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: AuditLogEntry) {
        debug!(
            "Audit: {} {} on {} {}",
            entry.action, entry.entity_type, entry.entity_id, entry.created_at
        );
        if let Ok(mut entries) = self.entries.write() {
            entries.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_append_only_log() {
        let log = MemoryAuditLog::new();
        assert!(log.is_empty());

        log.record(AuditLogEntry::new(
            "appointment",
            Uuid::new_v4(),
            actions::APPOINTMENT_BOOKED,
            serde_json::json!({"slot": "s1"}),
        ));
        log.record(AuditLogEntry::new(
            "appointment",
            Uuid::new_v4(),
            actions::APPOINTMENT_PREEMPTED,
            serde_json::json!({}),
        ));

        assert_eq!(log.len(), 2);
        assert_eq!(log.count_action(actions::APPOINTMENT_BOOKED), 1);
        let snapshot = log.snapshot();
        assert_eq!(snapshot[0].action, actions::APPOINTMENT_BOOKED);
    }
}
