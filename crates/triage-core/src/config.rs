//! 运行时配置
//!
//! 所有策略阈值和通知开关均通过该结构显式注入，
//! 决策代码内部不读取任何环境或全局状态。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::Urgency;

/// 分诊系统运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// 自动预约的最低分类置信度
    pub auto_book_confidence_threshold: f64,
    /// 自动预约的最低科室置信分
    pub department_score_threshold: f64,
    /// EMERGENCY 强制升级的置信度硬下限，独立于自动预约阈值
    pub emergency_confidence_floor: f64,
    /// 分类器请求人工路由时是否总是转人工
    pub always_route_when_model_requests_human: bool,
    /// 是否允许高紧急程度病例自动预约
    pub auto_book_high_urgency: bool,
    /// 是否启用抢占
    pub preemption_enabled: bool,
    /// 是否启用外发通知
    pub notifications_enabled: bool,
    /// 触发通知的紧急程度集合
    pub notify_on_urgencies: Vec<Urgency>,
    /// 通知失败时是否放行（失败不影响已做出的决策）
    pub notification_fail_open: bool,
    /// 通知 Webhook 地址，为空表示未配置
    pub notification_webhook_url: String,
    /// 通知请求超时秒数
    pub notification_timeout_seconds: u64,
    /// 各紧急程度的理想预约时间窗（分钟）
    pub urgency_windows_minutes: HashMap<Urgency, i64>,
    /// SOON/ROUTINE 兜底预约的最大时间窗（分钟）
    pub fallback_window_minutes: i64,
    /// 日历预生成天数
    pub seed_days: i64,
    /// 科室与出诊医生
    pub department_providers: HashMap<String, Vec<String>>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        let mut urgency_windows = HashMap::new();
        urgency_windows.insert(Urgency::Emergency, 60 * 4);
        urgency_windows.insert(Urgency::Urgent, 60 * 48);
        urgency_windows.insert(Urgency::Soon, 60 * 24 * 7);
        urgency_windows.insert(Urgency::Routine, 60 * 24 * 28);

        let mut providers = HashMap::new();
        providers.insert(
            "General Medicine".to_string(),
            vec!["Dr. Patel".to_string(), "Dr. Reed".to_string()],
        );
        providers.insert(
            "Cardiology".to_string(),
            vec!["Dr. Shah".to_string(), "Dr. Park".to_string()],
        );
        providers.insert(
            "Pulmonology".to_string(),
            vec!["Dr. Khan".to_string(), "Dr. Evans".to_string()],
        );
        providers.insert(
            "Neurology".to_string(),
            vec!["Dr. Li".to_string(), "Dr. Garcia".to_string()],
        );
        providers.insert(
            "Orthopedics".to_string(),
            vec!["Dr. Smith".to_string(), "Dr. Rao".to_string()],
        );
        providers.insert("Dermatology".to_string(), vec!["Dr. Kim".to_string()]);
        providers.insert(
            "Gastroenterology".to_string(),
            vec!["Dr. Brown".to_string()],
        );

        Self {
            auto_book_confidence_threshold: 0.80,
            department_score_threshold: 0.75,
            emergency_confidence_floor: 0.35,
            always_route_when_model_requests_human: true,
            auto_book_high_urgency: true,
            preemption_enabled: true,
            notifications_enabled: true,
            notify_on_urgencies: vec![Urgency::Emergency, Urgency::Urgent],
            notification_fail_open: true,
            notification_webhook_url: String::new(),
            notification_timeout_seconds: 6,
            urgency_windows_minutes: urgency_windows,
            fallback_window_minutes: 60 * 24 * 90,
            seed_days: 30,
            department_providers: providers,
        }
    }
}

impl TriageConfig {
    /// 从环境变量加载配置，未设置或非法的值保留默认
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.auto_book_confidence_threshold = env_f64(
            "TRIAGE_CONFIDENCE_THRESHOLD",
            cfg.auto_book_confidence_threshold,
        );
        cfg.department_score_threshold = env_f64(
            "TRIAGE_DEPARTMENT_THRESHOLD",
            cfg.department_score_threshold,
        );
        cfg.emergency_confidence_floor = env_f64(
            "TRIAGE_EMERGENCY_CONFIDENCE_FLOOR",
            cfg.emergency_confidence_floor,
        );
        cfg.always_route_when_model_requests_human = env_bool(
            "TRIAGE_ALWAYS_ROUTE_MODEL_HUMAN",
            cfg.always_route_when_model_requests_human,
        );
        cfg.auto_book_high_urgency =
            env_bool("TRIAGE_AUTO_BOOK_HIGH_URGENCY", cfg.auto_book_high_urgency);
        cfg.preemption_enabled = env_bool("TRIAGE_PREEMPTION_ENABLED", cfg.preemption_enabled);
        cfg.notifications_enabled =
            env_bool("TRIAGE_NOTIFICATIONS_ENABLED", cfg.notifications_enabled);
        cfg.notification_fail_open =
            env_bool("TRIAGE_NOTIFICATION_FAIL_OPEN", cfg.notification_fail_open);
        cfg.notification_webhook_url = env_str(
            "TRIAGE_NOTIFICATION_WEBHOOK_URL",
            &cfg.notification_webhook_url,
        );
        cfg.notification_timeout_seconds = env_u64(
            "TRIAGE_NOTIFICATION_TIMEOUT_SECONDS",
            cfg.notification_timeout_seconds,
        );
        cfg.fallback_window_minutes = env_i64(
            "TRIAGE_FALLBACK_WINDOW_MINUTES",
            cfg.fallback_window_minutes,
        );
        cfg.seed_days = env_i64("TRIAGE_SEED_DAYS", cfg.seed_days);

        if let Ok(raw) = std::env::var("TRIAGE_NOTIFY_ON_URGENCIES") {
            let parsed: Vec<Urgency> = raw
                .split(',')
                .filter(|item| !item.trim().is_empty())
                .filter_map(|item| match Urgency::try_from(item) {
                    Ok(urgency) => Some(urgency),
                    Err(_) => {
                        tracing::warn!("Ignoring unknown urgency in notify set: {}", item);
                        None
                    }
                })
                .collect();
            if !parsed.is_empty() {
                cfg.notify_on_urgencies = parsed;
            }
        }

        cfg
    }

    /// 指定紧急程度的理想预约时间窗（分钟）
    pub fn urgency_window_minutes(&self, urgency: Urgency) -> i64 {
        self.urgency_windows_minutes
            .get(&urgency)
            .copied()
            .unwrap_or(self.fallback_window_minutes)
    }

    /// 该紧急程度是否在通知集合中
    pub fn should_notify(&self, urgency: Urgency) -> bool {
        self.notifications_enabled && self.notify_on_urgencies.contains(&urgency)
    }
}

fn env_str(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(
            raw.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid float in {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_i64(name: &str, default: i64) -> i64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid integer in {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid integer in {}: {:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}
