//! 错误定义模块

use thiserror::Error;

/// 分诊系统统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("状态冲突: {0}")]
    Conflict(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 分诊系统统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;
