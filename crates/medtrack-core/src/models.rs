//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MedError;

/// 药品信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medication {
    pub id: String,
    pub recipient_id: String,              // 被照护人ID
    pub name: String,                      // 药品名称
    pub instructions: Option<String>,      // 用药说明
    pub is_active: bool,
    pub inactive_at: Option<DateTime<Utc>>, // 停用时间，仅在 is_active 为 false 时存在
}

impl Medication {
    /// 判断某个时刻的剂量在当前药品生命周期下是否可见
    ///
    /// 启用中的药品所有剂量可见；停用药品仅 `scheduled_for <= inactive_at` 的剂量可见。
    /// 停用但缺少停用时间的药品视为没有可见剂量。
    pub fn is_dose_visible(&self, scheduled_for: DateTime<Utc>) -> bool {
        if self.is_active {
            return true;
        }
        self.inactive_at
            .map(|inactive_at| scheduled_for <= inactive_at)
            .unwrap_or(false)
    }
}

/// 重复规则
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,  // 每天
    Weekly, // 每周指定星期
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = MedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            other => Err(MedError::InvalidSchedule(format!("unknown recurrence: {}", other))),
        }
    }
}

/// 用药计划：某个药品的一条重复规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicationSchedule {
    pub id: String,
    pub medication_id: String,
    pub recurrence: Recurrence,
    pub time_of_day: String,               // 本地时间 "HH:mm"
    pub timezone: String,                  // IANA时区，为空时使用系统默认时区
    pub days_of_week: Option<Vec<u8>>,     // ISO星期 1(周一)-7(周日)，仅 weekly 使用
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,       // 含当天，为空表示无结束
    pub dosage_notes: Option<String>,
}

/// 剂量状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DoseStatus {
    Scheduled, // 待服用
    Taken,     // 已服用
}

/// 计算得到的剂量事件（不持久化）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoseOccurrence {
    pub dose_id: String,
    pub schedule_id: String,
    pub medication_id: String,
    pub recipient_id: String,
    pub medication_name: String,
    pub instructions: Option<String>,
    pub dosage_notes: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub time_of_day: String,
    pub recurrence: Recurrence,
    pub days_of_week: Option<Vec<u8>>,
    pub status: DoseStatus,
    pub taken_at: Option<DateTime<Utc>>,
    pub taken_by_user_id: Option<String>,
}

/// 已服用记录（持久化），每个 (schedule_id, scheduled_for) 至多一条
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoseTaken {
    pub id: String,
    pub recipient_id: String,
    pub medication_id: String,
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub taken_by_user_id: String,
}

/// 新已服用记录插入模型
#[derive(Debug, Clone)]
pub struct NewDoseTaken {
    pub schedule_id: String,
    pub medication_id: String,
    pub recipient_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

/// 已服用记录的查找键
///
/// 文本形式为 `"{schedule_id}|{scheduled_for ISO}"`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TakenKey {
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
}

impl TakenKey {
    pub fn new(schedule_id: impl Into<String>, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            schedule_id: schedule_id.into(),
            scheduled_for,
        }
    }
}

impl fmt::Display for TakenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}",
            self.schedule_id,
            self.scheduled_for.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

/// 已服用信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TakenInfo {
    pub taken_at: DateTime<Utc>,
    pub taken_by_user_id: String,
}

impl From<&DoseTaken> for TakenInfo {
    fn from(taken: &DoseTaken) -> Self {
        TakenInfo {
            taken_at: taken.taken_at,
            taken_by_user_id: taken.taken_by_user_id.clone(),
        }
    }
}
