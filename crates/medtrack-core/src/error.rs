//! 错误定义模块

use chrono::{DateTime, Utc};
use thiserror::Error;

/// 用药追踪系统统一错误类型
#[derive(Error, Debug)]
pub enum MedError {
    #[error("无效时间窗口: from {from} 晚于 to {to}")]
    InvalidWindow {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("无效剂量标识: {0}")]
    InvalidDoseId(String),

    #[error("剂量未找到")]
    DoseNotFound,

    #[error("药品未找到")]
    MedicationNotFound,

    #[error("药品已停用: 剂量时间 {scheduled_for} 晚于停用时间 {inactive_at:?}")]
    InactiveMedication {
        scheduled_for: DateTime<Utc>,
        inactive_at: Option<DateTime<Utc>>,
    },

    #[error("无效用药计划: {0}")]
    InvalidSchedule(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("配置错误: {0}")]
    Config(String),
}

impl MedError {
    /// 是否为调用方可修正的预期错误（而非基础设施故障）
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            MedError::InvalidWindow { .. }
                | MedError::InvalidDoseId(_)
                | MedError::DoseNotFound
                | MedError::MedicationNotFound
                | MedError::InactiveMedication { .. }
                | MedError::InvalidSchedule(_)
        )
    }
}

/// 用药追踪系统统一结果类型
pub type Result<T> = std::result::Result<T, MedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_errors() {
        assert!(MedError::DoseNotFound.is_caller_error());
        assert!(MedError::InvalidDoseId("v2:abc".to_string()).is_caller_error());
        assert!(!MedError::Database("connection reset".to_string()).is_caller_error());
        assert!(!MedError::Config("unknown timezone".to_string()).is_caller_error());
    }
}
