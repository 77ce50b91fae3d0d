//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use medtrack_core::models::*;
use medtrack_core::MedError;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库药品表
#[derive(Debug, FromRow)]
pub struct DbMedication {
    pub id: String,
    pub recipient_id: String,
    pub name: String,
    pub instructions: Option<String>,
    pub is_active: bool,
    pub inactive_at: Option<DateTime<Utc>>,
}

impl From<DbMedication> for Medication {
    fn from(db_medication: DbMedication) -> Self {
        Medication {
            id: db_medication.id,
            recipient_id: db_medication.recipient_id,
            name: db_medication.name,
            instructions: db_medication.instructions,
            is_active: db_medication.is_active,
            inactive_at: db_medication.inactive_at,
        }
    }
}

/// 数据库用药计划表
#[derive(Debug, FromRow)]
pub struct DbSchedule {
    pub id: String,
    pub medication_id: String,
    pub recurrence: String, // 存储为字符串，转换为Recurrence枚举
    pub time_of_day: String,
    pub timezone: String,
    pub days_of_week: Option<Vec<i32>>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub dosage_notes: Option<String>,
}

impl TryFrom<DbSchedule> for MedicationSchedule {
    type Error = MedError;

    fn try_from(db_schedule: DbSchedule) -> Result<Self, Self::Error> {
        let days_of_week = db_schedule
            .days_of_week
            .map(|days| {
                days.into_iter()
                    .map(|day| {
                        u8::try_from(day).map_err(|_| {
                            MedError::InvalidSchedule(format!("day of week out of range: {}", day))
                        })
                    })
                    .collect::<Result<Vec<u8>, MedError>>()
            })
            .transpose()?;

        Ok(MedicationSchedule {
            id: db_schedule.id,
            medication_id: db_schedule.medication_id,
            recurrence: db_schedule.recurrence.parse()?,
            time_of_day: db_schedule.time_of_day,
            timezone: db_schedule.timezone,
            days_of_week,
            start_date: db_schedule.start_date,
            end_date: db_schedule.end_date,
            dosage_notes: db_schedule.dosage_notes,
        })
    }
}

/// 数据库已服用记录表
#[derive(Debug, FromRow)]
pub struct DbDoseTaken {
    pub id: String,
    pub recipient_id: String,
    pub medication_id: String,
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub taken_by_user_id: String,
}

impl From<DbDoseTaken> for DoseTaken {
    fn from(db_taken: DbDoseTaken) -> Self {
        DoseTaken {
            id: db_taken.id,
            recipient_id: db_taken.recipient_id,
            medication_id: db_taken.medication_id,
            schedule_id: db_taken.schedule_id,
            scheduled_for: db_taken.scheduled_for,
            taken_at: db_taken.taken_at,
            taken_by_user_id: db_taken.taken_by_user_id,
        }
    }
}

/// 已服用映射查询行
#[derive(Debug, FromRow)]
pub struct DbTakenEntry {
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub taken_by_user_id: String,
}

impl DbTakenEntry {
    pub fn into_entry(self) -> (TakenKey, TakenInfo) {
        (
            TakenKey::new(self.schedule_id, self.scheduled_for),
            TakenInfo {
                taken_at: self.taken_at,
                taken_by_user_id: self.taken_by_user_id,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn db_schedule(recurrence: &str, days_of_week: Option<Vec<i32>>) -> DbSchedule {
        DbSchedule {
            id: "sched-1".to_string(),
            medication_id: "med-1".to_string(),
            recurrence: recurrence.to_string(),
            time_of_day: "08:00".to_string(),
            timezone: "Europe/Paris".to_string(),
            days_of_week,
            start_date: NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
            end_date: None,
            dosage_notes: Some("half tablet".to_string()),
        }
    }

    #[test]
    fn test_schedule_conversion() {
        let schedule = MedicationSchedule::try_from(db_schedule("weekly", Some(vec![1, 3, 5]))).unwrap();
        assert_eq!(schedule.recurrence, Recurrence::Weekly);
        assert_eq!(schedule.days_of_week, Some(vec![1, 3, 5]));
        assert_eq!(schedule.timezone, "Europe/Paris");

        let schedule = MedicationSchedule::try_from(db_schedule("daily", None)).unwrap();
        assert_eq!(schedule.recurrence, Recurrence::Daily);
        assert!(schedule.days_of_week.is_none());
    }

    #[test]
    fn test_schedule_conversion_rejects_bad_rows() {
        assert!(MedicationSchedule::try_from(db_schedule("hourly", None)).is_err());
        assert!(MedicationSchedule::try_from(db_schedule("weekly", Some(vec![-1]))).is_err());
        assert!(MedicationSchedule::try_from(db_schedule("weekly", Some(vec![300]))).is_err());
    }

    #[test]
    fn test_taken_entry_key() {
        let at = Utc.with_ymd_and_hms(2024, 12, 1, 8, 0, 0).unwrap();
        let (key, info) = DbTakenEntry {
            schedule_id: "sched-1".to_string(),
            scheduled_for: at,
            taken_at: at,
            taken_by_user_id: "alice".to_string(),
        }
        .into_entry();

        assert_eq!(key, TakenKey::new("sched-1", at));
        assert_eq!(info.taken_by_user_id, "alice");
    }
}
