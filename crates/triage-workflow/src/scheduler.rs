//! 调度器
//!
//! 时段分配、预约与抢占，是 Slot/Appointment 状态的唯一写入方。
//! 每次查找加变更序列都在同一把锁内完成，外部观察不到中间状态。

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};
use triage_core::{
    Appointment, AppointmentResult, BookingStatus, Result, Slot, TriageConfig, TriageError,
    Urgency,
};
use uuid::Uuid;

use crate::slot_pool::{SlotPool, SlotPoolStats};

/// 一次预约请求
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub patient_id: Uuid,
    pub triage_event_id: Uuid,
    pub urgency: Urgency,
    pub department: String,
    pub note: String,
    pub allow_preemption: bool,
}

/// 时段调度器
#[derive(Debug)]
pub struct Scheduler {
    pool: Mutex<SlotPool>,
    config: TriageConfig,
}

impl Scheduler {
    pub fn new(config: TriageConfig) -> Self {
        Self {
            pool: Mutex::new(SlotPool::new()),
            config,
        }
    }

    /// 新增可预约时段（外部排班日历写入口）
    pub async fn add_slot(
        &self,
        department: impl Into<String>,
        provider: impl Into<String>,
        start_at: chrono::DateTime<Utc>,
        end_at: chrono::DateTime<Utc>,
    ) -> Slot {
        let mut pool = self.pool.lock().await;
        pool.insert_slot(department, provider, start_at, end_at)
    }

    /// 预约：查找最早可用时段，必要时抢占低优先级预约
    ///
    /// 无法分配时段时返回 `QUEUED_NO_SLOT`，由调用方回落到人工队列。
    pub async fn book(&self, request: BookingRequest) -> Result<AppointmentResult> {
        let now = Utc::now();
        let window_end =
            now + Duration::minutes(self.config.urgency_window_minutes(request.urgency));
        let fallback_end = now + Duration::minutes(self.config.fallback_window_minutes);

        let mut pool = self.pool.lock().await;

        if let Some(slot_id) =
            pool.find_available_slot(&request.department, now, window_end)
        {
            let appointment = pool.create_appointment(
                request.patient_id,
                request.triage_event_id,
                request.urgency,
                slot_id,
                request.note.clone(),
            )?;
            let slot = self.slot_snapshot(&pool, slot_id)?;
            info!(
                "Booked appointment {} in slot {} ({} / {})",
                appointment.id, slot.id, slot.department, slot.provider
            );
            return Ok(AppointmentResult::booked(&appointment, &slot, request.note));
        }

        if !request.urgency.is_high() {
            // SOON/ROUTINE 允许超出理想时间窗兜底预约，不参与抢占
            if let Some(slot_id) =
                pool.find_available_slot(&request.department, window_end, fallback_end)
            {
                let note = format!("{} | booked outside ideal urgency window", request.note);
                let appointment = pool.create_appointment(
                    request.patient_id,
                    request.triage_event_id,
                    request.urgency,
                    slot_id,
                    note.clone(),
                )?;
                let slot = self.slot_snapshot(&pool, slot_id)?;
                info!(
                    "Fallback-booked appointment {} in slot {}",
                    appointment.id, slot.id
                );
                let mut result = AppointmentResult::booked(&appointment, &slot, note);
                result.status = BookingStatus::BookedFallback;
                return Ok(result);
            }
            return Ok(AppointmentResult::queued_no_slot(
                "No available slots within fallback window.",
            ));
        }

        if !(request.allow_preemption && self.config.preemption_enabled) {
            return Ok(AppointmentResult::queued_no_slot(
                "No free slot in urgency window and preemption disabled.",
            ));
        }

        let Some(victim_id) =
            pool.find_preemption_victim(&request.department, request.urgency)
        else {
            return Ok(AppointmentResult::queued_no_slot(
                "No lower-priority appointment eligible for preemption.",
            ));
        };

        let freed_slot_id = pool.preempt(victim_id)?;
        let appointment = pool.create_appointment(
            request.patient_id,
            request.triage_event_id,
            request.urgency,
            freed_slot_id,
            format!("{} | preemption applied", request.note),
        )?;
        pool.link_preemption(victim_id, appointment.id);
        let slot = self.slot_snapshot(&pool, freed_slot_id)?;

        warn!(
            "Appointment {} preempted by {} ({} case in {})",
            victim_id, appointment.id, request.urgency, request.department
        );
        Ok(AppointmentResult {
            status: BookingStatus::Booked,
            appointment_id: Some(appointment.id),
            slot_id: Some(slot.id),
            slot_start: Some(slot.start_at),
            note: "Booked by preempting a lower-priority case.".to_string(),
            preempted_appointment_id: Some(victim_id),
        })
    }

    /// 取消预约并释放时段
    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment> {
        let mut pool = self.pool.lock().await;
        let appointment = pool.cancel(appointment_id)?;
        info!("Cancelled appointment {}", appointment_id);
        Ok(appointment)
    }

    pub async fn appointment(&self, appointment_id: Uuid) -> Option<Appointment> {
        let pool = self.pool.lock().await;
        pool.appointment(appointment_id).cloned()
    }

    pub async fn stats(&self) -> SlotPoolStats {
        let pool = self.pool.lock().await;
        pool.stats()
    }

    /// 校验时段占用不变量
    pub async fn verify_invariant(&self) -> bool {
        let pool = self.pool.lock().await;
        pool.invariant_holds()
    }

    fn slot_snapshot(&self, pool: &SlotPool, slot_id: Uuid) -> Result<Slot> {
        pool.slot(slot_id).cloned().ok_or_else(|| {
            TriageError::Internal(format!("Slot {} vanished mid-booking", slot_id))
        })
    }
}
