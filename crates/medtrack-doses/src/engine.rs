//! 剂量引擎
//!
//! 协调计划展开、已服用记录合并和药品生命周期截止，
//! 对外提供剂量列表查询以及标记/取消标记已服用。

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use medtrack_core::utils::DEFAULT_TIMEZONE;
use medtrack_core::{
    DoseOccurrence, DoseStatus, MedError, Medication, MedicationSchedule, NewDoseTaken, Result,
    TakenInfo, TakenKey,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::dose_id::{decode_dose_id, encode_dose_id};
use crate::occurrence::generate_occurrences_in;
use crate::store::{MedicationLookup, ScheduleLookup, TakenStore};

/// 剂量引擎配置
#[derive(Debug, Clone)]
pub struct DoseEngineConfig {
    /// 计划未指定时区时使用的时区
    pub default_timezone: Tz,
    /// 未指定 `to` 时的查询窗口长度
    pub default_window: Duration,
}

impl DoseEngineConfig {
    /// 由时区名称和窗口天数构建配置
    pub fn from_settings(timezone: &str, window_days: i64) -> Result<Self> {
        let default_timezone: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| MedError::Config(format!("unknown timezone: {}", timezone)))?;

        let default_window = Duration::try_days(window_days)
            .filter(|window| *window > Duration::zero())
            .ok_or_else(|| {
                MedError::Config(format!("default window must be positive, got {} days", window_days))
            })?;

        Ok(Self {
            default_timezone,
            default_window,
        })
    }
}

impl Default for DoseEngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: DEFAULT_TIMEZONE,
            default_window: Duration::days(7),
        }
    }
}

/// 剂量查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoseQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub include_inactive: bool,
}

/// 剂量引擎
pub struct DoseEngine {
    schedules: Arc<dyn ScheduleLookup>,
    medications: Arc<dyn MedicationLookup>,
    taken: Arc<dyn TakenStore>,
    config: DoseEngineConfig,
}

impl DoseEngine {
    /// 创建剂量引擎
    pub fn new(
        schedules: Arc<dyn ScheduleLookup>,
        medications: Arc<dyn MedicationLookup>,
        taken: Arc<dyn TakenStore>,
    ) -> Self {
        Self {
            schedules,
            medications,
            taken,
            config: DoseEngineConfig::default(),
        }
    }

    /// 使用指定配置
    pub fn with_config(mut self, config: DoseEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 计算查询窗口：`from` 默认为当前时间，`to` 默认为 `from + default_window`，
    /// 超出可表示范围时截至最大时刻
    pub fn resolve_window(
        &self,
        now: DateTime<Utc>,
        query: &DoseQuery,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let from = query.from.unwrap_or(now);
        let to = query.to.unwrap_or_else(|| {
            from.checked_add_signed(self.config.default_window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        if from > to {
            return Err(MedError::InvalidWindow { from, to });
        }
        Ok((from, to))
    }

    /// 列出被照护人在查询窗口内的剂量，按时间升序
    pub async fn list_upcoming_doses(
        &self,
        user_id: &str,
        recipient_id: &str,
        query: DoseQuery,
    ) -> Result<Vec<DoseOccurrence>> {
        let (from, to) = self.resolve_window(Utc::now(), &query)?;

        // 计划和药品互不依赖，并发获取
        let (schedules, medications) = tokio::try_join!(
            self.schedules.list_schedules(user_id, recipient_id),
            self.medications
                .list_medications(user_id, recipient_id, query.include_inactive),
        )?;

        let medications_by_id: HashMap<&str, &Medication> = medications
            .iter()
            .map(|medication| (medication.id.as_str(), medication))
            .collect();

        let mut candidates: Vec<(&MedicationSchedule, &Medication, DateTime<Utc>)> = Vec::new();
        let mut schedule_ids = Vec::new();

        for schedule in &schedules {
            let Some(medication) = medications_by_id.get(schedule.medication_id.as_str()) else {
                debug!(
                    "Skipping schedule {} without visible medication {}",
                    schedule.id, schedule.medication_id
                );
                continue;
            };

            let instants = generate_occurrences_in(schedule, from, to, self.config.default_timezone)?;
            if instants.is_empty() {
                continue;
            }

            schedule_ids.push(schedule.id.clone());
            candidates.extend(instants.into_iter().map(|instant| (schedule, *medication, instant)));
        }

        let taken_map = if schedule_ids.is_empty() {
            HashMap::new()
        } else {
            self.taken
                .get_taken_map(user_id, &schedule_ids, from, to)
                .await?
        };

        let mut doses: Vec<DoseOccurrence> = candidates
            .into_iter()
            .filter(|(_, medication, instant)| medication.is_dose_visible(*instant))
            .map(|(schedule, medication, instant)| {
                let taken = taken_map.get(&TakenKey::new(schedule.id.clone(), instant));
                build_occurrence(schedule, medication, instant, taken)
            })
            .collect();

        doses.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.schedule_id.cmp(&b.schedule_id))
        });

        debug!(
            "Listed {} doses for recipient {} in [{}, {})",
            doses.len(),
            recipient_id,
            from,
            to
        );
        Ok(doses)
    }

    /// 标记剂量已服用（幂等）
    pub async fn mark_taken(&self, user_id: &str, dose_id: &str) -> Result<DoseOccurrence> {
        let (schedule, medication, scheduled_for) = self.resolve_dose(user_id, dose_id).await?;
        ensure_within_cutoff(&medication, scheduled_for)?;

        let record = NewDoseTaken {
            schedule_id: schedule.id.clone(),
            medication_id: medication.id.clone(),
            recipient_id: medication.recipient_id.clone(),
            scheduled_for,
            taken_at: Utc::now(),
        };
        let taken = self.taken.mark_taken(user_id, record).await?;

        info!(
            "Dose {} of schedule {} at {} marked taken by {}",
            dose_id, schedule.id, scheduled_for, taken.taken_by_user_id
        );
        Ok(build_occurrence(
            &schedule,
            &medication,
            scheduled_for,
            Some(&TakenInfo::from(&taken)),
        ))
    }

    /// 取消已服用标记，记录不存在时返回 false
    pub async fn unmark_taken(&self, user_id: &str, dose_id: &str) -> Result<bool> {
        let (schedule_id, scheduled_for) = decode_dose_id(dose_id)?;
        let schedule = self
            .schedules
            .find_schedule(user_id, &schedule_id)
            .await?
            .ok_or(MedError::DoseNotFound)?;

        let removed = self
            .taken
            .unmark_taken(user_id, &schedule.id, scheduled_for)
            .await?;

        info!(
            "Dose {} of schedule {} at {} unmarked by {} (removed: {})",
            dose_id, schedule.id, scheduled_for, user_id, removed
        );
        Ok(removed)
    }

    /// 查询单个剂量的当前状态
    pub async fn get_dose(&self, user_id: &str, dose_id: &str) -> Result<DoseOccurrence> {
        let (schedule, medication, scheduled_for) = self.resolve_dose(user_id, dose_id).await?;
        ensure_within_cutoff(&medication, scheduled_for)?;

        let window_end = scheduled_for
            .checked_add_signed(Duration::seconds(1))
            .ok_or(MedError::DoseNotFound)?;
        let instants = generate_occurrences_in(
            &schedule,
            scheduled_for,
            window_end,
            self.config.default_timezone,
        )?;
        if !instants.contains(&scheduled_for) {
            return Err(MedError::DoseNotFound);
        }

        let taken_map = self
            .taken
            .get_taken_map(user_id, &[schedule.id.clone()], scheduled_for, window_end)
            .await?;
        let taken = taken_map.get(&TakenKey::new(schedule.id.clone(), scheduled_for));

        Ok(build_occurrence(&schedule, &medication, scheduled_for, taken))
    }

    /// 解码剂量标识并按调用用户解析计划和药品
    async fn resolve_dose(
        &self,
        user_id: &str,
        dose_id: &str,
    ) -> Result<(MedicationSchedule, Medication, DateTime<Utc>)> {
        let (schedule_id, scheduled_for) = decode_dose_id(dose_id)?;

        let schedule = self
            .schedules
            .find_schedule(user_id, &schedule_id)
            .await?
            .ok_or(MedError::DoseNotFound)?;

        let medication = self
            .medications
            .find_medication(user_id, &schedule.medication_id)
            .await?
            .ok_or(MedError::MedicationNotFound)?;

        Ok((schedule, medication, scheduled_for))
    }
}

fn ensure_within_cutoff(medication: &Medication, scheduled_for: DateTime<Utc>) -> Result<()> {
    if medication.is_dose_visible(scheduled_for) {
        Ok(())
    } else {
        Err(MedError::InactiveMedication {
            scheduled_for,
            inactive_at: medication.inactive_at,
        })
    }
}

fn build_occurrence(
    schedule: &MedicationSchedule,
    medication: &Medication,
    scheduled_for: DateTime<Utc>,
    taken: Option<&TakenInfo>,
) -> DoseOccurrence {
    DoseOccurrence {
        dose_id: encode_dose_id(&schedule.id, scheduled_for),
        schedule_id: schedule.id.clone(),
        medication_id: medication.id.clone(),
        recipient_id: medication.recipient_id.clone(),
        medication_name: medication.name.clone(),
        instructions: medication.instructions.clone(),
        dosage_notes: schedule.dosage_notes.clone(),
        scheduled_for,
        time_of_day: schedule.time_of_day.clone(),
        recurrence: schedule.recurrence,
        days_of_week: schedule.days_of_week.clone(),
        status: if taken.is_some() {
            DoseStatus::Taken
        } else {
            DoseStatus::Scheduled
        },
        taken_at: taken.map(|info| info.taken_at),
        taken_by_user_id: taken.map(|info| info.taken_by_user_id.clone()),
    }
}
