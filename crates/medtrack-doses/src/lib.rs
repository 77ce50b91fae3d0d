//! # Medtrack剂量模块
//!
//! 剂量计算与已服用追踪的核心逻辑，包括：
//! - 剂量时间展开：将每日/每周重复规则展开为UTC时刻（含夏令时处理）
//! - 剂量标识：计划ID与剂量时刻的可逆URL安全编码
//! - 剂量引擎：合并计划展开结果与已服用记录，应用药品停用截止
//! - 标记/取消标记已服用：幂等的状态转换

pub mod dose_id;
pub mod engine;
pub mod memory;
pub mod occurrence;
pub mod store;
pub mod validation;

// 重新导出主要类型
pub use dose_id::{decode_dose_id, encode_dose_id};
pub use engine::{DoseEngine, DoseEngineConfig, DoseQuery};
pub use memory::InMemoryStore;
pub use occurrence::{generate_occurrences, generate_occurrences_in};
pub use store::{MedicationLookup, ScheduleLookup, TakenMap, TakenStore};
pub use validation::validate_schedule;
