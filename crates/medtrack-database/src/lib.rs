//! # Medtrack数据库模块
//!
//! 基于PostgreSQL的协作接口实现：计划/药品查询按 `recipient_access` 授权过滤，
//! 已服用记录依靠 `(schedule_id, scheduled_for)` 唯一约束保证幂等。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
