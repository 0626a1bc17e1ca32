//! 时段池
//!
//! 调度器独占持有的时段与预约存储。
//! 不变量：一个时段同一时刻最多被一个 BOOKED 预约占用。

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use triage_core::{
    Appointment, AppointmentStatus, Result, Slot, TriageError, Urgency,
};
use uuid::Uuid;

/// 时段池统计
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SlotPoolStats {
    pub total_slots: usize,
    pub free_slots: usize,
    pub booked: usize,
    pub preempted: usize,
    pub cancelled: usize,
}

/// 时段与预约存储
#[derive(Debug, Default)]
pub struct SlotPool {
    slots: HashMap<Uuid, Slot>,
    appointments: HashMap<Uuid, Appointment>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增可预约时段
    pub fn insert_slot(
        &mut self,
        department: impl Into<String>,
        provider: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Slot {
        let slot = Slot {
            id: Uuid::new_v4(),
            department: department.into(),
            provider: provider.into(),
            start_at,
            end_at,
            appointment_id: None,
            created_at: Utc::now(),
        };
        self.slots.insert(slot.id, slot.clone());
        slot
    }

    pub fn slot(&self, slot_id: Uuid) -> Option<&Slot> {
        self.slots.get(&slot_id)
    }

    pub fn appointment(&self, appointment_id: Uuid) -> Option<&Appointment> {
        self.appointments.get(&appointment_id)
    }

    /// 按开始时间查找指定时间窗内最早的空闲时段
    ///
    /// 开始时间相同的时段按ID取定，不依赖存储迭代顺序。
    pub fn find_available_slot(
        &self,
        department: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Option<Uuid> {
        self.slots
            .values()
            .filter(|slot| {
                slot.department == department
                    && slot.is_available()
                    && slot.start_at >= from
                    && slot.start_at <= until
            })
            .min_by_key(|slot| (slot.start_at, slot.id))
            .map(|slot| slot.id)
    }

    /// 在指定时段上创建预约并占用时段
    ///
    /// 时段已被占用时报告冲突，而不是静默覆盖。
    pub fn create_appointment(
        &mut self,
        patient_id: Uuid,
        triage_event_id: Uuid,
        urgency: Urgency,
        slot_id: Uuid,
        note: impl Into<String>,
    ) -> Result<Appointment> {
        let slot = self
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| TriageError::NotFound(format!("Slot {} not found", slot_id)))?;
        if let Some(existing) = slot.appointment_id {
            return Err(TriageError::Conflict(format!(
                "Slot {} already occupied by appointment {}",
                slot_id, existing
            )));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            triage_event_id,
            urgency,
            department: slot.department.clone(),
            provider: slot.provider.clone(),
            slot_id,
            status: AppointmentStatus::Booked,
            note: note.into(),
            booked_at: Utc::now(),
            preempted_by: None,
        };
        slot.appointment_id = Some(appointment.id);
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    /// 查找可被抢占的预约
    ///
    /// 候选为本科室紧急程度严格低于来诊病例的 BOOKED 预约；
    /// 取紧急程度最低者，相同紧急程度取预约时间最早者。
    pub fn find_preemption_victim(
        &self,
        department: &str,
        incoming: Urgency,
    ) -> Option<Uuid> {
        self.appointments
            .values()
            .filter(|appt| {
                appt.status == AppointmentStatus::Booked
                    && appt.department == department
                    && appt.urgency < incoming
            })
            .min_by_key(|appt| (appt.urgency.rank(), appt.booked_at))
            .map(|appt| appt.id)
    }

    /// 抢占指定预约：标记 PREEMPTED 并释放其时段，返回释放的时段ID
    ///
    /// 抢占方预约此时尚未创建，创建后由 [`Self::link_preemption`] 回填。
    pub fn preempt(&mut self, victim_id: Uuid) -> Result<Uuid> {
        let victim = self.appointments.get_mut(&victim_id).ok_or_else(|| {
            TriageError::NotFound(format!("Appointment {} not found", victim_id))
        })?;
        if victim.status != AppointmentStatus::Booked {
            return Err(TriageError::Conflict(format!(
                "Appointment {} is not active",
                victim_id
            )));
        }
        victim.status = AppointmentStatus::Preempted;
        let slot_id = victim.slot_id;

        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.appointment_id = None;
        }
        Ok(slot_id)
    }

    /// 回填抢占方预约ID
    pub fn link_preemption(&mut self, victim_id: Uuid, preempted_by: Uuid) {
        if let Some(victim) = self.appointments.get_mut(&victim_id) {
            victim.preempted_by = Some(preempted_by);
        }
    }

    /// 取消预约并释放时段，记录保留
    pub fn cancel(&mut self, appointment_id: Uuid) -> Result<Appointment> {
        let appointment = self.appointments.get_mut(&appointment_id).ok_or_else(|| {
            TriageError::NotFound(format!("Appointment {} not found", appointment_id))
        })?;
        if appointment.status != AppointmentStatus::Booked {
            return Err(TriageError::Conflict(format!(
                "Appointment {} is not active",
                appointment_id
            )));
        }
        appointment.status = AppointmentStatus::Cancelled;
        let slot_id = appointment.slot_id;
        let snapshot = appointment.clone();

        if let Some(slot) = self.slots.get_mut(&slot_id) {
            slot.appointment_id = None;
        }
        Ok(snapshot)
    }

    pub fn stats(&self) -> SlotPoolStats {
        let mut stats = SlotPoolStats {
            total_slots: self.slots.len(),
            free_slots: self.slots.values().filter(|s| s.is_available()).count(),
            booked: 0,
            preempted: 0,
            cancelled: 0,
        };
        for appointment in self.appointments.values() {
            match appointment.status {
                AppointmentStatus::Booked => stats.booked += 1,
                AppointmentStatus::Preempted => stats.preempted += 1,
                AppointmentStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// 校验占用不变量：BOOKED 预约与时段占用一一对应
    pub fn invariant_holds(&self) -> bool {
        let mut seen_slots = std::collections::HashSet::new();
        for appointment in self.appointments.values() {
            if appointment.status != AppointmentStatus::Booked {
                continue;
            }
            if !seen_slots.insert(appointment.slot_id) {
                return false;
            }
            match self.slots.get(&appointment.slot_id) {
                Some(slot) if slot.appointment_id == Some(appointment.id) => {}
                _ => return false,
            }
        }
        self.slots
            .values()
            .filter_map(|slot| slot.appointment_id)
            .all(|appointment_id| {
                self.appointments
                    .get(&appointment_id)
                    .map(|appt| appt.status == AppointmentStatus::Booked)
                    .unwrap_or(false)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pool_with_slot(department: &str) -> (SlotPool, Slot) {
        let mut pool = SlotPool::new();
        let now = Utc::now();
        let slot = pool.insert_slot(
            department,
            "Dr. Shah",
            now + Duration::hours(1),
            now + Duration::hours(2),
        );
        (pool, slot)
    }

    #[test]
    fn test_double_occupancy_is_a_conflict() {
        let (mut pool, slot) = pool_with_slot("Cardiology");
        pool.create_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Urgency::Urgent,
            slot.id,
            "first",
        )
        .unwrap();
        let second = pool.create_appointment(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Urgency::Urgent,
            slot.id,
            "second",
        );
        assert!(matches!(second, Err(TriageError::Conflict(_))));
        assert!(pool.invariant_holds());
    }

    #[test]
    fn test_same_start_slot_choice_is_deterministic() {
        let mut pool = SlotPool::new();
        let now = Utc::now();
        let start = now + Duration::hours(1);
        let end = now + Duration::hours(2);
        let a = pool.insert_slot("Cardiology", "Dr. Shah", start, end);
        let b = pool.insert_slot("Cardiology", "Dr. Park", start, end);

        let expected = a.id.min(b.id);
        for _ in 0..10 {
            assert_eq!(
                pool.find_available_slot("Cardiology", now, now + Duration::hours(3)),
                Some(expected)
            );
        }
    }

    #[test]
    fn test_victim_is_lowest_urgency() {
        let mut pool = SlotPool::new();
        let now = Utc::now();
        let mut booked = Vec::new();
        for (offset, urgency) in [
            (1, Urgency::Urgent),
            (2, Urgency::Soon),
            (3, Urgency::Routine),
        ] {
            let slot = pool.insert_slot(
                "Cardiology",
                "Dr. Shah",
                now + Duration::hours(offset),
                now + Duration::hours(offset + 1),
            );
            let appt = pool
                .create_appointment(Uuid::new_v4(), Uuid::new_v4(), urgency, slot.id, "")
                .unwrap();
            booked.push((urgency, appt.id));
        }

        let victim = pool
            .find_preemption_victim("Cardiology", Urgency::Emergency)
            .unwrap();
        let routine = booked
            .iter()
            .find(|(urgency, _)| *urgency == Urgency::Routine)
            .unwrap()
            .1;
        assert_eq!(victim, routine);
    }

    #[test]
    fn test_victim_tie_break_is_oldest_booking() {
        let mut pool = SlotPool::new();
        let now = Utc::now();
        let mut ids = Vec::new();
        for offset in [1, 2] {
            let slot = pool.insert_slot(
                "Cardiology",
                "Dr. Shah",
                now + Duration::hours(offset),
                now + Duration::hours(offset + 1),
            );
            let appt = pool
                .create_appointment(
                    Uuid::new_v4(),
                    Uuid::new_v4(),
                    Urgency::Routine,
                    slot.id,
                    "",
                )
                .unwrap();
            ids.push(appt.id);
        }
        // 显式拉开预约时间，避免同一毫秒内的并列
        pool.appointments.get_mut(&ids[0]).unwrap().booked_at = now - Duration::minutes(10);
        pool.appointments.get_mut(&ids[1]).unwrap().booked_at = now - Duration::minutes(5);

        let victim = pool
            .find_preemption_victim("Cardiology", Urgency::Urgent)
            .unwrap();
        assert_eq!(victim, ids[0]);
    }

    #[test]
    fn test_no_victim_at_equal_or_higher_urgency() {
        let (mut pool, slot) = pool_with_slot("Cardiology");
        pool.create_appointment(Uuid::new_v4(), Uuid::new_v4(), Urgency::Urgent, slot.id, "")
            .unwrap();
        assert!(pool
            .find_preemption_victim("Cardiology", Urgency::Urgent)
            .is_none());
        assert!(pool
            .find_preemption_victim("Cardiology", Urgency::Emergency)
            .is_some());
    }

    #[test]
    fn test_preempt_frees_slot_and_keeps_record() {
        let (mut pool, slot) = pool_with_slot("Cardiology");
        let victim = pool
            .create_appointment(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Routine,
                slot.id,
                "",
            )
            .unwrap();
        let incoming = Uuid::new_v4();
        let freed = pool.preempt(victim.id).unwrap();
        pool.link_preemption(victim.id, incoming);
        assert_eq!(freed, slot.id);
        assert!(pool.slot(slot.id).unwrap().is_available());

        let record = pool.appointment(victim.id).unwrap();
        assert_eq!(record.status, AppointmentStatus::Preempted);
        assert_eq!(record.preempted_by, Some(incoming));
        assert!(pool.invariant_holds());
    }

    #[test]
    fn test_cancel_releases_slot() {
        let (mut pool, slot) = pool_with_slot("Dermatology");
        let appt = pool
            .create_appointment(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Urgency::Routine,
                slot.id,
                "",
            )
            .unwrap();
        pool.cancel(appt.id).unwrap();
        assert!(pool.slot(slot.id).unwrap().is_available());
        assert!(matches!(
            pool.cancel(appt.id),
            Err(TriageError::Conflict(_))
        ));
        assert_eq!(pool.stats().cancelled, 1);
    }
}
