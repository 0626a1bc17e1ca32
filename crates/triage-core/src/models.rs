//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 临床紧急程度
///
/// 变体按紧急程度升序声明，派生的 `Ord` 依赖该顺序。
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Routine,   // 常规
    Soon,      // 尽快
    Urgent,    // 急
    Emergency, // 紧急
}

/// 人工升级队列项使用的最高优先级，高于任何紧急程度对应的优先级
pub const ESCALATION_PRIORITY: u8 = 5;

impl Urgency {
    /// 序数优先级，用于队列排序和抢占比较
    pub fn rank(&self) -> u8 {
        match self {
            Self::Routine => 1,
            Self::Soon => 2,
            Self::Urgent => 3,
            Self::Emergency => 4,
        }
    }

    /// 是否属于高紧急程度（允许自动预约和抢占）
    pub fn is_high(&self) -> bool {
        matches!(self, Self::Emergency | Self::Urgent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::Urgent => "URGENT",
            Self::Soon => "SOON",
            Self::Routine => "ROUTINE",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Urgency {
    type Error = crate::TriageError;

    fn try_from(value: &str) -> crate::Result<Self> {
        match value.trim().to_uppercase().as_str() {
            "EMERGENCY" => Ok(Self::Emergency),
            "URGENT" => Ok(Self::Urgent),
            "SOON" => Ok(Self::Soon),
            "ROUTINE" => Ok(Self::Routine),
            other => Err(crate::TriageError::Validation(format!(
                "Unknown urgency: {}",
                other
            ))),
        }
    }
}

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Other,
}

/// 患者基本信息
///
/// 首次就诊时按手机号创建或匿名创建，手机号用于识别复诊患者。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub phone: Option<String>,
    pub age: i32,
    pub sex: Sex,
    pub created_at: DateTime<Utc>,
}

/// 科室候选及其置信分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentScore {
    pub department: String,
    pub score: f64,
}

/// 分类器输出（外部协作方，此处仅消费）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub redacted_symptoms: String,
    pub urgency: Urgency,
    pub confidence: f64,
    pub red_flags: Vec<String>,
    pub department_candidates: Vec<DepartmentScore>,
    pub suggested_department: String,
    pub rationale: String,
    pub recommended_timeframe_minutes: i64,
    pub human_routing_flag: bool,
}

impl TriageResult {
    /// 首选科室的置信分，无候选时为 0
    pub fn top_department_score(&self) -> f64 {
        self.department_candidates
            .first()
            .map(|candidate| candidate.score)
            .unwrap_or(0.0)
    }
}

/// 一次分类器调用的不可变记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageEvent {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub result: TriageResult,
    pub created_at: DateTime<Utc>,
}

/// 路由动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingAction {
    AutoBook,    // 自动预约
    QueueReview, // 转人工审核队列
    Escalate,    // 升级处理
}

impl RoutingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoBook => "AUTO_BOOK",
            Self::QueueReview => "QUEUE_REVIEW",
            Self::Escalate => "ESCALATE",
        }
    }
}

impl std::fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 路由决策记录，与 TriageEvent 一对一
///
/// 同时记录决策时生效的阈值，便于事后审计。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub reason: String,
    pub confidence_threshold: f64,
    pub department_threshold: f64,
}

/// 可预约时段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub department: String,
    pub provider: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    /// 当前占用该时段的活跃预约，最多一个
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn is_available(&self) -> bool {
        self.appointment_id.is_none()
    }
}

/// 预约状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Booked,    // 已预约
    Preempted, // 被抢占
    Cancelled, // 已取消
}

/// 预约记录
///
/// 被抢占或取消后保留记录，不删除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub triage_event_id: Uuid,
    pub urgency: Urgency,
    pub department: String,
    pub provider: String,
    pub slot_id: Uuid,
    pub status: AppointmentStatus,
    pub note: String,
    pub booked_at: DateTime<Utc>,
    /// 抢占本预约的新预约ID
    pub preempted_by: Option<Uuid>,
}

/// 预约操作结果状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,         // 预约成功
    BookedFallback, // 超出理想时间窗的兜底预约
    QueuedNoSlot,   // 无可用时段，需回落到人工队列
    Declined,       // 护士拒绝预约
}

/// 预约操作结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentResult {
    pub status: BookingStatus,
    pub appointment_id: Option<Uuid>,
    pub slot_id: Option<Uuid>,
    pub slot_start: Option<DateTime<Utc>>,
    pub note: String,
    pub preempted_appointment_id: Option<Uuid>,
}

impl AppointmentResult {
    pub fn booked(appointment: &Appointment, slot: &Slot, note: impl Into<String>) -> Self {
        Self {
            status: BookingStatus::Booked,
            appointment_id: Some(appointment.id),
            slot_id: Some(slot.id),
            slot_start: Some(slot.start_at),
            note: note.into(),
            preempted_appointment_id: None,
        }
    }

    pub fn queued_no_slot(note: impl Into<String>) -> Self {
        Self {
            status: BookingStatus::QueuedNoSlot,
            appointment_id: None,
            slot_id: None,
            slot_start: None,
            note: note.into(),
            preempted_appointment_id: None,
        }
    }

    pub fn is_booked(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::Booked | BookingStatus::BookedFallback
        )
    }
}

/// 人工审核队列项状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueItemStatus {
    Pending,  // 待处理
    Resolved, // 已处理
}

/// 人工审核队列项
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub triage_event_id: Uuid,
    pub patient_id: Uuid,
    pub status: QueueItemStatus,
    pub reason: String,
    /// 队列优先级，来自紧急程度序数，升级项为 [`ESCALATION_PRIORITY`]
    pub priority: u8,
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub assigned_to: Option<String>,
    pub resolution_note: Option<String>,
}

/// 审计日志条目，只追加，不修改不删除
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: Uuid,
        action: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// 护士对队列项的处理输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NurseAction {
    pub nurse_name: String,
    pub department_override: Option<String>,
    pub urgency_override: Option<Urgency>,
    pub note: String,
    /// 拒绝预约：队列项直接标记已处理，不调用调度器
    pub decline: bool,
}

/// 患者自述就诊请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    pub phone: Option<String>,
    pub age: i32,
    pub sex: Sex,
    pub symptoms: String,
}

/// 一次完整分诊流程的输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub patient_id: Uuid,
    pub triage_event_id: Uuid,
    pub routing_decision: RoutingDecision,
    pub appointment_result: Option<AppointmentResult>,
    pub queue_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgency_ordering() {
        assert!(Urgency::Emergency > Urgency::Urgent);
        assert!(Urgency::Urgent > Urgency::Soon);
        assert!(Urgency::Soon > Urgency::Routine);
        assert!(Urgency::Emergency.rank() < ESCALATION_PRIORITY);
    }

    #[test]
    fn test_urgency_parse() {
        assert_eq!(Urgency::try_from("emergency").unwrap(), Urgency::Emergency);
        assert_eq!(Urgency::try_from(" ROUTINE ").unwrap(), Urgency::Routine);
        assert!(Urgency::try_from("whenever").is_err());
    }

    #[test]
    fn test_top_department_score() {
        let mut result = TriageResult {
            redacted_symptoms: "chest pain".to_string(),
            urgency: Urgency::Urgent,
            confidence: 0.9,
            red_flags: vec![],
            department_candidates: vec![],
            suggested_department: "Cardiology".to_string(),
            rationale: String::new(),
            recommended_timeframe_minutes: 240,
            human_routing_flag: false,
        };
        assert_eq!(result.top_department_score(), 0.0);

        result.department_candidates = vec![
            DepartmentScore {
                department: "Cardiology".to_string(),
                score: 0.82,
            },
            DepartmentScore {
                department: "General Medicine".to_string(),
                score: 0.4,
            },
        ];
        assert_eq!(result.top_department_score(), 0.82);
    }
}
