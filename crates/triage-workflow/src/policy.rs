//! 路由策略
//!
//! 将分类器输出映射为路由动作的纯决策函数。
//! 无网络和存储访问，阈值显式传入，同一输入必然产生同一决策。

use serde::{Deserialize, Serialize};
use triage_core::{RoutingAction, RoutingDecision, TriageConfig, TriageResult};

/// 决策时生效的策略阈值
///
/// 独立于全局配置传入，调用方可用不同阈值对同一分类结果做模拟评估。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyThresholds {
    pub confidence_threshold: f64,
    pub department_threshold: f64,
    /// EMERGENCY 强制升级的置信度硬下限
    pub emergency_confidence_floor: f64,
    pub always_route_when_model_requests_human: bool,
    pub auto_book_high_urgency: bool,
}

impl From<&TriageConfig> for PolicyThresholds {
    fn from(config: &TriageConfig) -> Self {
        Self {
            confidence_threshold: config.auto_book_confidence_threshold,
            department_threshold: config.department_score_threshold,
            emergency_confidence_floor: config.emergency_confidence_floor,
            always_route_when_model_requests_human: config
                .always_route_when_model_requests_human,
            auto_book_high_urgency: config.auto_book_high_urgency,
        }
    }
}

/// 路由策略
#[derive(Debug, Default)]
pub struct RoutingPolicy;

impl RoutingPolicy {
    pub fn new() -> Self {
        Self
    }

    /// 为一次分类结果做出路由决策
    pub fn decide(
        &self,
        triage: &TriageResult,
        thresholds: &PolicyThresholds,
    ) -> RoutingDecision {
        use triage_core::Urgency;

        let decision = |action: RoutingAction, reason: &str| RoutingDecision {
            action,
            reason: reason.to_string(),
            confidence_threshold: thresholds.confidence_threshold,
            department_threshold: thresholds.department_threshold,
        };

        if triage.urgency == Urgency::Emergency
            && triage.confidence < thresholds.emergency_confidence_floor
        {
            return decision(
                RoutingAction::Escalate,
                "Emergency confidence below hard floor.",
            );
        }

        if triage.urgency == Urgency::Emergency && !thresholds.auto_book_high_urgency {
            return decision(
                RoutingAction::Escalate,
                "Emergency cases are configured for mandatory human escalation.",
            );
        }

        if thresholds.always_route_when_model_requests_human && triage.human_routing_flag {
            let action = if triage.urgency == Urgency::Emergency {
                RoutingAction::Escalate
            } else {
                RoutingAction::QueueReview
            };
            return decision(action, "Model requested human routing.");
        }

        if triage.confidence < thresholds.confidence_threshold {
            if triage.urgency == Urgency::Emergency && !triage.red_flags.is_empty() {
                return decision(
                    RoutingAction::Escalate,
                    "Unresolved red flags on a sub-threshold emergency case.",
                );
            }
            return decision(
                RoutingAction::QueueReview,
                "Confidence below policy threshold.",
            );
        }

        if triage.top_department_score() < thresholds.department_threshold {
            return decision(
                RoutingAction::QueueReview,
                "Department certainty below policy threshold.",
            );
        }

        if !triage.urgency.is_high() {
            return decision(
                RoutingAction::QueueReview,
                "Low-acuity cases are scheduled by human review.",
            );
        }

        decision(
            RoutingAction::AutoBook,
            "All routing policy thresholds satisfied.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{DepartmentScore, Urgency};

    fn triage(urgency: Urgency, confidence: f64) -> TriageResult {
        TriageResult {
            redacted_symptoms: "chest pain and shortness of breath".to_string(),
            urgency,
            confidence,
            red_flags: vec![],
            department_candidates: vec![DepartmentScore {
                department: "Cardiology".to_string(),
                score: 0.85,
            }],
            suggested_department: "Cardiology".to_string(),
            rationale: "test".to_string(),
            recommended_timeframe_minutes: 240,
            human_routing_flag: false,
        }
    }

    fn thresholds() -> PolicyThresholds {
        PolicyThresholds {
            confidence_threshold: 0.6,
            department_threshold: 0.75,
            emergency_confidence_floor: 0.35,
            always_route_when_model_requests_human: true,
            auto_book_high_urgency: true,
        }
    }

    #[test]
    fn test_emergency_auto_book() {
        let policy = RoutingPolicy::new();
        let decision = policy.decide(&triage(Urgency::Emergency, 0.95), &thresholds());
        assert_eq!(decision.action, RoutingAction::AutoBook);
    }

    #[test]
    fn test_low_confidence_queues() {
        let policy = RoutingPolicy::new();
        let decision = policy.decide(&triage(Urgency::Urgent, 0.40), &thresholds());
        assert_eq!(decision.action, RoutingAction::QueueReview);
        assert_eq!(decision.reason, "Confidence below policy threshold.");
    }

    #[test]
    fn test_emergency_below_hard_floor_escalates() {
        let policy = RoutingPolicy::new();
        let decision = policy.decide(&triage(Urgency::Emergency, 0.2), &thresholds());
        assert_eq!(decision.action, RoutingAction::Escalate);
    }

    #[test]
    fn test_emergency_red_flags_escalate() {
        let policy = RoutingPolicy::new();
        let mut case = triage(Urgency::Emergency, 0.5);
        case.red_flags = vec!["crushing chest pain".to_string()];
        let decision = policy.decide(&case, &thresholds());
        assert_eq!(decision.action, RoutingAction::Escalate);
    }

    #[test]
    fn test_human_routing_flag() {
        let policy = RoutingPolicy::new();
        let mut case = triage(Urgency::Urgent, 0.9);
        case.human_routing_flag = true;
        let decision = policy.decide(&case, &thresholds());
        assert_eq!(decision.action, RoutingAction::QueueReview);

        let mut emergency = triage(Urgency::Emergency, 0.9);
        emergency.human_routing_flag = true;
        let decision = policy.decide(&emergency, &thresholds());
        assert_eq!(decision.action, RoutingAction::Escalate);
    }

    #[test]
    fn test_low_acuity_always_reviewed() {
        let policy = RoutingPolicy::new();
        let decision = policy.decide(&triage(Urgency::Routine, 0.99), &thresholds());
        assert_eq!(decision.action, RoutingAction::QueueReview);
    }

    #[test]
    fn test_department_uncertainty_queues() {
        let policy = RoutingPolicy::new();
        let mut case = triage(Urgency::Urgent, 0.9);
        case.department_candidates[0].score = 0.3;
        let decision = policy.decide(&case, &thresholds());
        assert_eq!(decision.action, RoutingAction::QueueReview);
    }

    #[test]
    fn test_decision_is_deterministic() {
        let policy = RoutingPolicy::new();
        let case = triage(Urgency::Urgent, 0.7);
        let first = policy.decide(&case, &thresholds());
        let second = policy.decide(&case, &thresholds());
        assert_eq!(first.action, second.action);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.confidence_threshold, second.confidence_threshold);
    }
}
