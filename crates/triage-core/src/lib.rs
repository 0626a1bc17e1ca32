//! # Triage Core
//!
//! 分诊系统的核心模块，提供基础数据结构、错误定义、配置和通用工具。

pub mod config;
pub mod error;
pub mod models;
pub mod utils;

pub use config::TriageConfig;
pub use error::{Result, TriageError};
pub use models::*;
