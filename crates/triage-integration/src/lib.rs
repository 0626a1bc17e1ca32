//! # 分诊集成模块
//!
//! 提供与外部系统的集成功能，包括：
//! - Webhook事件通知，将升级与高紧急程度事件推送到值班系统

pub mod webhook;

pub use webhook::{WebhookEndpoint, WebhookNotifier};
