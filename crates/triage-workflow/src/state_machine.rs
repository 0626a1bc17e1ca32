//! 就诊流程状态机
//!
//! 管理单次分诊请求的生命周期状态转换：
//! RECEIVED → DECIDED → {BOOKED | QUEUED | ESCALATED} → AUDITED

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use triage_core::{Result, TriageError};

/// 分诊请求状态
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeState {
    Received,  // 已接收
    Decided,   // 已决策
    Booked,    // 已预约
    Queued,    // 已入队
    Escalated, // 已升级
    Audited,   // 已审计（终态）
}

/// 状态转换事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IntakeEvent {
    Decided,
    Booked,
    Queued,
    Escalated,
    Audited,
}

/// 就诊流程状态机
#[derive(Debug)]
pub struct IntakeStateMachine {
    transitions: HashMap<(IntakeState, IntakeEvent), IntakeState>,
}

impl IntakeStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert(
            (IntakeState::Received, IntakeEvent::Decided),
            IntakeState::Decided,
        );
        transitions.insert(
            (IntakeState::Decided, IntakeEvent::Booked),
            IntakeState::Booked,
        );
        transitions.insert(
            (IntakeState::Decided, IntakeEvent::Queued),
            IntakeState::Queued,
        );
        transitions.insert(
            (IntakeState::Decided, IntakeEvent::Escalated),
            IntakeState::Escalated,
        );
        transitions.insert(
            (IntakeState::Booked, IntakeEvent::Audited),
            IntakeState::Audited,
        );
        transitions.insert(
            (IntakeState::Queued, IntakeEvent::Audited),
            IntakeState::Audited,
        );
        transitions.insert(
            (IntakeState::Escalated, IntakeEvent::Audited),
            IntakeState::Audited,
        );

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: &IntakeState, event: &IntakeEvent) -> bool {
        self.transitions.contains_key(&(from.clone(), event.clone()))
    }

    /// 执行状态转换
    pub fn transition(&self, from: &IntakeState, event: &IntakeEvent) -> Result<IntakeState> {
        match self.transitions.get(&(from.clone(), event.clone())) {
            Some(to) => Ok(to.clone()),
            None => Err(TriageError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }
}

impl Default for IntakeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = IntakeStateMachine::new();

        assert!(sm.can_transition(&IntakeState::Received, &IntakeEvent::Decided));
        assert!(sm.can_transition(&IntakeState::Decided, &IntakeEvent::Booked));
        assert!(sm.can_transition(&IntakeState::Queued, &IntakeEvent::Audited));
    }

    #[test]
    fn test_invalid_transitions() {
        let sm = IntakeStateMachine::new();

        // 终态后不再转换，决策前不能预约
        assert!(!sm.can_transition(&IntakeState::Audited, &IntakeEvent::Booked));
        assert!(!sm.can_transition(&IntakeState::Received, &IntakeEvent::Booked));
        assert!(!sm.can_transition(&IntakeState::Booked, &IntakeEvent::Queued));
    }

    #[test]
    fn test_full_lifecycle() {
        let sm = IntakeStateMachine::new();

        let state = sm
            .transition(&IntakeState::Received, &IntakeEvent::Decided)
            .unwrap();
        let state = sm.transition(&state, &IntakeEvent::Booked).unwrap();
        let state = sm.transition(&state, &IntakeEvent::Audited).unwrap();
        assert_eq!(state, IntakeState::Audited);

        let result = sm.transition(&IntakeState::Audited, &IntakeEvent::Decided);
        assert!(matches!(
            result,
            Err(TriageError::InvalidStateTransition { .. })
        ));
    }
}
