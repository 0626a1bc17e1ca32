//! 分诊引擎
//!
//! 按请求协调路由策略、调度器、人工队列与审计通知的核心引擎。
//! 每次就诊请求走完整状态机：
//! RECEIVED → DECIDED → {BOOKED | QUEUED | ESCALATED} → AUDITED

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use triage_core::{
    utils, AppointmentResult, AuditLogEntry, BookingStatus, IntakeRequest, NurseAction,
    Patient, ProcessOutcome, QueueItem, QueueItemStatus, Result, RoutingAction,
    RoutingDecision, TriageConfig, TriageError, TriageEvent, TriageResult, Urgency,
    ESCALATION_PRIORITY,
};
use uuid::Uuid;

use crate::audit::{actions, AuditSink};
use crate::notify::{NotificationEvent, Notifier};
use crate::policy::{PolicyThresholds, RoutingPolicy};
use crate::queue::ReviewQueue;
use crate::scheduler::{BookingRequest, Scheduler};
use crate::state_machine::{IntakeEvent, IntakeState, IntakeStateMachine};

/// 运营概览指标
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DashboardMetrics {
    pub pending_review: usize,
    pub booked: usize,
    pub preempted: usize,
    pub cancelled: usize,
    pub free_slots: usize,
    pub total_slots: usize,
}

/// 分诊引擎
///
/// 协调所有分诊组件，提供统一的就诊处理接口。
#[derive(Debug)]
pub struct TriageEngine {
    config: TriageConfig,
    policy: RoutingPolicy,
    state_machine: IntakeStateMachine,
    scheduler: Arc<Scheduler>,
    queue: Arc<ReviewQueue>,
    patients: RwLock<HashMap<Uuid, Patient>>,
    phone_index: RwLock<HashMap<String, Uuid>>,
    triage_events: RwLock<HashMap<Uuid, TriageEvent>>,
    decisions: RwLock<HashMap<Uuid, RoutingDecision>>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn Notifier>,
}

impl TriageEngine {
    pub fn new(
        config: TriageConfig,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let scheduler = Arc::new(Scheduler::new(config.clone()));
        Self {
            config,
            policy: RoutingPolicy::new(),
            state_machine: IntakeStateMachine::new(),
            scheduler,
            queue: Arc::new(ReviewQueue::new()),
            patients: RwLock::new(HashMap::new()),
            phone_index: RwLock::new(HashMap::new()),
            triage_events: RwLock::new(HashMap::new()),
            decisions: RwLock::new(HashMap::new()),
            audit,
            notifier,
        }
    }

    /// 获取调度器实例（排班日历写入口）
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 处理一次就诊请求
    ///
    /// 调用方传入外部分类器的输出；本方法返回前审计已落库，
    /// 通知投递不阻塞决策结果。
    pub async fn process_intake(
        &self,
        request: IntakeRequest,
        triage: TriageResult,
    ) -> Result<ProcessOutcome> {
        utils::validate_age(request.age)?;
        utils::validate_symptoms(&request.symptoms)?;
        let mut triage = triage;
        triage.confidence = utils::clamp_confidence(triage.confidence);

        let mut state = IntakeState::Received;
        let patient = self.find_or_create_patient(&request).await;

        let event = TriageEvent {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            result: triage.clone(),
            created_at: Utc::now(),
        };
        {
            let mut events = self.triage_events.write().await;
            events.insert(event.id, event.clone());
        }
        self.audit.record(AuditLogEntry::new(
            "triage_event",
            event.id,
            actions::TRIAGE_CREATED,
            json!({
                "patient_id": patient.id,
                "urgency": triage.urgency,
                "confidence": triage.confidence,
                "suggested_department": triage.suggested_department,
                "human_routing_flag": triage.human_routing_flag,
            }),
        ));

        let thresholds = PolicyThresholds::from(&self.config);
        let decision = self.policy.decide(&triage, &thresholds);
        state = self.state_machine.transition(&state, &IntakeEvent::Decided)?;
        {
            let mut decisions = self.decisions.write().await;
            decisions.insert(event.id, decision.clone());
        }
        self.audit.record(AuditLogEntry::new(
            "triage_event",
            event.id,
            actions::ROUTING_DECIDED,
            json!({
                "action": decision.action,
                "reason": decision.reason,
                "confidence_threshold": decision.confidence_threshold,
                "department_threshold": decision.department_threshold,
            }),
        ));
        info!(
            "Routing decision for triage event {}: {} ({})",
            event.id, decision.action, decision.reason
        );

        let mut appointment_result: Option<AppointmentResult> = None;
        let mut queue_id: Option<Uuid> = None;

        match decision.action {
            RoutingAction::AutoBook => {
                let result = self
                    .scheduler
                    .book(BookingRequest {
                        patient_id: patient.id,
                        triage_event_id: event.id,
                        urgency: triage.urgency,
                        department: triage.suggested_department.clone(),
                        note: "Auto-booked from intake.".to_string(),
                        allow_preemption: true,
                    })
                    .await?;

                if result.status == BookingStatus::QueuedNoSlot {
                    // 无时段可用：降级入人工队列，而不是丢弃病例
                    let item = self
                        .enqueue_audited(
                            &event,
                            patient.id,
                            triage.urgency,
                            format!("Auto-book failed: {}", result.note),
                            triage.urgency.rank(),
                        )
                        .await;
                    queue_id = Some(item.id);
                    state = self.state_machine.transition(&state, &IntakeEvent::Queued)?;
                } else {
                    self.record_booking_audit(event.id, &result);
                    state = self.state_machine.transition(&state, &IntakeEvent::Booked)?;
                }
                appointment_result = Some(result);
            }
            RoutingAction::QueueReview => {
                let item = self
                    .enqueue_audited(
                        &event,
                        patient.id,
                        triage.urgency,
                        decision.reason.clone(),
                        triage.urgency.rank(),
                    )
                    .await;
                queue_id = Some(item.id);
                state = self.state_machine.transition(&state, &IntakeEvent::Queued)?;
            }
            RoutingAction::Escalate => {
                let item = self
                    .enqueue_audited(
                        &event,
                        patient.id,
                        triage.urgency,
                        decision.reason.clone(),
                        ESCALATION_PRIORITY,
                    )
                    .await;
                queue_id = Some(item.id);
                state = self
                    .state_machine
                    .transition(&state, &IntakeEvent::Escalated)?;
            }
        }

        let state = self.state_machine.transition(&state, &IntakeEvent::Audited)?;
        self.audit.record(AuditLogEntry::new(
            "triage_event",
            event.id,
            actions::INTAKE_AUDITED,
            json!({
                "state": format!("{:?}", state),
                "action": decision.action,
                "booking_status": appointment_result.as_ref().map(|r| r.status),
                "queue_id": queue_id,
                "patient_phone": utils::mask_phone(patient.phone.as_deref()),
            }),
        ));

        // 升级绕过紧急程度过滤，其余按配置的通知集合
        let escalated = decision.action == RoutingAction::Escalate;
        if escalated || self.config.should_notify(triage.urgency) {
            let event_type = if escalated {
                "TRIAGE_ESCALATION"
            } else {
                "TRIAGE_INTAKE"
            };
            self.emit_notification(
                event_type,
                triage.urgency,
                patient.id,
                event.id,
                queue_id,
                &triage.suggested_department,
                &decision.reason,
            )
            .await;
        }

        Ok(ProcessOutcome {
            patient_id: patient.id,
            triage_event_id: event.id,
            routing_decision: decision,
            appointment_result,
            queue_id,
        })
    }

    /// 护士处理队列项：预约（可覆盖科室/紧急程度）或拒绝
    ///
    /// 队列项代表"需要人工决策"而非"需要时段"：决策一旦做出即标记
    /// 已处理，即使预约结果为 QUEUED_NO_SLOT 患者仍未预约。
    pub async fn resolve_queue_item(
        &self,
        queue_id: Uuid,
        action: NurseAction,
    ) -> Result<AppointmentResult> {
        let item = self.queue.get(queue_id).await.ok_or_else(|| {
            TriageError::NotFound(format!("Queue item {} not found", queue_id))
        })?;
        let triage_event = self
            .triage_event(item.triage_event_id)
            .await
            .ok_or_else(|| {
                TriageError::NotFound("Associated triage event not found".to_string())
            })?;

        let resolved = self
            .queue
            .mark_resolved(queue_id, action.nurse_name.clone(), action.note.clone())
            .await?;
        self.audit.record(AuditLogEntry::new(
            "queue_item",
            resolved.id,
            actions::QUEUE_RESOLVED,
            json!({
                "nurse": action.nurse_name,
                "declined": action.decline,
                "note": action.note,
                "triage_event_id": resolved.triage_event_id,
            }),
        ));

        if action.decline {
            info!(
                "Queue item {} declined by {}",
                queue_id, action.nurse_name
            );
            return Ok(AppointmentResult {
                status: BookingStatus::Declined,
                appointment_id: None,
                slot_id: None,
                slot_start: None,
                note: format!("Declined by {}.", action.nurse_name),
                preempted_appointment_id: None,
            });
        }

        let urgency = action
            .urgency_override
            .unwrap_or(triage_event.result.urgency);
        let department = action
            .department_override
            .clone()
            .unwrap_or_else(|| triage_event.result.suggested_department.clone());
        let note = format!(
            "Nurse booked from queue by {}. {}",
            action.nurse_name, action.note
        )
        .trim()
        .to_string();

        let result = self
            .scheduler
            .book(BookingRequest {
                patient_id: item.patient_id,
                triage_event_id: item.triage_event_id,
                urgency,
                department: department.clone(),
                note,
                allow_preemption: true,
            })
            .await?;

        if result.status == BookingStatus::QueuedNoSlot {
            warn!(
                "Queue item {} resolved but patient remains unbooked: {}",
                queue_id, result.note
            );
            if self.config.should_notify(urgency) {
                self.emit_notification(
                    "TRIAGE_ESCALATION",
                    urgency,
                    item.patient_id,
                    item.triage_event_id,
                    Some(queue_id),
                    &department,
                    &result.note,
                )
                .await;
            }
        } else {
            self.record_booking_audit(item.triage_event_id, &result);
        }

        Ok(result)
    }

    /// 取消预约并释放时段
    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> Result<()> {
        let appointment = self.scheduler.cancel(appointment_id).await?;
        self.audit.record(AuditLogEntry::new(
            "appointment",
            appointment.id,
            actions::APPOINTMENT_CANCELLED,
            json!({
                "slot_id": appointment.slot_id,
                "department": appointment.department,
            }),
        ));
        Ok(())
    }

    /// 按状态分页列出队列项
    pub async fn list_queue(
        &self,
        status: QueueItemStatus,
        offset: usize,
        limit: usize,
    ) -> Vec<QueueItem> {
        self.queue.list(status, offset, limit).await
    }

    /// 全部待处理队列项
    pub async fn pending_queue(&self) -> Vec<QueueItem> {
        self.queue.pending().await
    }

    pub async fn triage_event(&self, triage_event_id: Uuid) -> Option<TriageEvent> {
        let events = self.triage_events.read().await;
        events.get(&triage_event_id).cloned()
    }

    pub async fn routing_decision(&self, triage_event_id: Uuid) -> Option<RoutingDecision> {
        let decisions = self.decisions.read().await;
        decisions.get(&triage_event_id).cloned()
    }

    pub async fn find_patient_by_phone(&self, phone: &str) -> Option<Patient> {
        let index = self.phone_index.read().await;
        let patient_id = index.get(phone)?;
        let patients = self.patients.read().await;
        patients.get(patient_id).cloned()
    }

    /// 运营概览
    pub async fn metrics(&self) -> DashboardMetrics {
        let stats = self.scheduler.stats().await;
        DashboardMetrics {
            pending_review: self.queue.pending_count().await,
            booked: stats.booked,
            preempted: stats.preempted,
            cancelled: stats.cancelled,
            free_slots: stats.free_slots,
            total_slots: stats.total_slots,
        }
    }

    /// 按手机号识别复诊患者，无手机号则匿名建档
    async fn find_or_create_patient(&self, request: &IntakeRequest) -> Patient {
        if let Some(phone) = &request.phone {
            if let Some(existing) = self.find_patient_by_phone(phone).await {
                info!("Repeat patient {} matched by phone", existing.id);
                return existing;
            }
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            phone: request.phone.clone(),
            age: request.age,
            sex: request.sex,
            created_at: Utc::now(),
        };
        {
            let mut patients = self.patients.write().await;
            patients.insert(patient.id, patient.clone());
        }
        if let Some(phone) = &patient.phone {
            let mut index = self.phone_index.write().await;
            index.insert(phone.clone(), patient.id);
        }
        patient
    }

    async fn enqueue_audited(
        &self,
        event: &TriageEvent,
        patient_id: Uuid,
        urgency: Urgency,
        reason: String,
        priority: u8,
    ) -> QueueItem {
        let item = self
            .queue
            .enqueue(event.id, patient_id, urgency, reason.clone(), priority)
            .await;
        self.audit.record(AuditLogEntry::new(
            "queue_item",
            item.id,
            actions::QUEUE_ENQUEUED,
            json!({
                "triage_event_id": event.id,
                "priority": priority,
                "urgency": urgency,
                "reason": reason,
            }),
        ));
        item
    }

    fn record_booking_audit(&self, triage_event_id: Uuid, result: &AppointmentResult) {
        if let Some(appointment_id) = result.appointment_id {
            self.audit.record(AuditLogEntry::new(
                "appointment",
                appointment_id,
                actions::APPOINTMENT_BOOKED,
                json!({
                    "triage_event_id": triage_event_id,
                    "slot_id": result.slot_id,
                    "slot_start": result.slot_start,
                    "status": result.status,
                    "note": result.note,
                }),
            ));
        }
        if let Some(victim_id) = result.preempted_appointment_id {
            warn!(
                "Recording preemption of appointment {} for triage event {}",
                victim_id, triage_event_id
            );
            self.audit.record(AuditLogEntry::new(
                "appointment",
                victim_id,
                actions::APPOINTMENT_PREEMPTED,
                json!({
                    "preempted_by": result.appointment_id,
                    "slot_id": result.slot_id,
                }),
            ));
        }
    }

    /// 投递通知并审计结果；失败按放行策略处理，不影响已返回的决策
    async fn emit_notification(
        &self,
        event_type: &str,
        urgency: Urgency,
        patient_id: Uuid,
        triage_event_id: Uuid,
        queue_id: Option<Uuid>,
        department: &str,
        reason: &str,
    ) {
        let event = NotificationEvent {
            event_type: event_type.to_string(),
            urgency,
            message: format!(
                "{} triage event for patient {}; department={}; reason={}",
                urgency, patient_id, department, reason
            ),
            patient_id,
            triage_event_id,
            queue_id,
            department: department.to_string(),
            metadata: json!({"source": "triage_engine", "notifier": self.notifier.label()}),
        };

        match self.notifier.dispatch(&event).await {
            Ok(deliveries) => {
                self.audit.record(AuditLogEntry::new(
                    "triage_event",
                    triage_event_id,
                    actions::NOTIFICATION_DISPATCHED,
                    json!({
                        "event_type": event.event_type,
                        "urgency": urgency,
                        "queue_id": queue_id,
                        "deliveries": deliveries,
                    }),
                ));
            }
            Err(err) => {
                if self.config.notification_fail_open {
                    warn!("Notification delivery failed (fail-open): {}", err);
                } else {
                    error!("Notification delivery failed: {}", err);
                }
                self.audit.record(AuditLogEntry::new(
                    "triage_event",
                    triage_event_id,
                    actions::NOTIFICATION_FAILED,
                    json!({
                        "event_type": event.event_type,
                        "urgency": urgency,
                        "queue_id": queue_id,
                        "error": err.to_string(),
                    }),
                ));
            }
        }
    }
}
