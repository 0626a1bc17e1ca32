//! # 分诊工作流模块
//!
//! 提供完整的分诊路由与调度功能，包括：
//! - 路由策略：将分类器输出映射为路由动作的纯决策函数
//! - 调度器与时段池：时段分配、预约与抢占的唯一写入方
//! - 人工审核队列：等待护士决策的稳定优先级积压
//! - 就诊状态机：单次分诊请求的生命周期
//! - 审计与通知：只追加审计日志和放行式外发通知

pub mod audit;
pub mod engine;
pub mod notify;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod slot_pool;
pub mod state_machine;

// 重新导出主要类型
pub use audit::{AuditSink, MemoryAuditLog};
pub use engine::{DashboardMetrics, TriageEngine};
pub use notify::{
    DeliveryStatus, NoopNotifier, NotificationDelivery, NotificationEvent, Notifier,
};
pub use policy::{PolicyThresholds, RoutingPolicy};
pub use queue::ReviewQueue;
pub use scheduler::{BookingRequest, Scheduler};
pub use slot_pool::{SlotPool, SlotPoolStats};
pub use state_machine::{IntakeEvent, IntakeState, IntakeStateMachine};
