//! 外部协作接口
//!
//! 授权只在计划/药品查询这一层完成：两者都按调用用户过滤，
//! 对无权访问的记录与不存在的记录一样返回“未找到”。
//! 已服用记录存储不做授权判断，调用方只会传入已经确认可见的计划ID，
//! 因此多个照护人看到的是同一份已服用记录。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medtrack_core::{DoseTaken, Medication, MedicationSchedule, NewDoseTaken, Result, TakenInfo, TakenKey};
use std::collections::HashMap;

/// 已服用记录映射
pub type TakenMap = HashMap<TakenKey, TakenInfo>;

/// 用药计划查询
#[async_trait]
pub trait ScheduleLookup: Send + Sync {
    /// 按ID查询调用用户可见的计划
    async fn find_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<MedicationSchedule>>;

    /// 查询被照护人名下调用用户可见的全部计划
    async fn list_schedules(&self, user_id: &str, recipient_id: &str) -> Result<Vec<MedicationSchedule>>;
}

/// 药品查询
#[async_trait]
pub trait MedicationLookup: Send + Sync {
    /// 按ID查询调用用户可见的药品（包含已停用药品）
    async fn find_medication(&self, user_id: &str, medication_id: &str) -> Result<Option<Medication>>;

    /// 查询被照护人名下的药品，`include_inactive` 为 false 时排除已停用药品
    async fn list_medications(
        &self,
        user_id: &str,
        recipient_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<Medication>>;
}

/// 已服用记录存储
#[async_trait]
pub trait TakenStore: Send + Sync {
    /// 幂等写入：(schedule_id, scheduled_for) 已存在时返回已有记录
    async fn mark_taken(&self, user_id: &str, record: NewDoseTaken) -> Result<DoseTaken>;

    /// 删除记录，不存在时返回 false
    async fn unmark_taken(
        &self,
        user_id: &str,
        schedule_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool>;

    /// 查询给定计划在 `[from, to)` 内的全部已服用记录，不区分记录人
    ///
    /// `user_id` 不参与过滤。
    async fn get_taken_map(
        &self,
        user_id: &str,
        schedule_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TakenMap>;
}
