//! 用药计划校验
//!
//! 在保存和展开两个阶段都使用同一套规则，保证无效计划不会被展开成剂量。

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use medtrack_core::utils::{parse_time_of_day, resolve_timezone, DEFAULT_TIMEZONE};
use medtrack_core::{MedError, MedicationSchedule, Recurrence, Result};

/// 校验后的重复规则
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub time_of_day: NaiveTime,
    pub timezone: Tz,
    /// 仅 weekly 规则存在
    pub weekdays: Option<Vec<Weekday>>,
}

impl CompiledRule {
    pub fn matches(&self, weekday: Weekday) -> bool {
        match &self.weekdays {
            None => true,
            Some(days) => days.contains(&weekday),
        }
    }
}

/// 校验用药计划（空时区按系统默认时区处理）
pub fn validate_schedule(schedule: &MedicationSchedule) -> Result<()> {
    compile(schedule, DEFAULT_TIMEZONE).map(|_| ())
}

pub(crate) fn compile(schedule: &MedicationSchedule, default_timezone: Tz) -> Result<CompiledRule> {
    let time_of_day = parse_time_of_day(&schedule.time_of_day)?;
    let timezone = resolve_timezone(&schedule.timezone, default_timezone)?;

    if let Some(end_date) = schedule.end_date {
        if end_date < schedule.start_date {
            return Err(MedError::InvalidSchedule(format!(
                "end date {} is before start date {}",
                end_date, schedule.start_date
            )));
        }
    }

    let weekdays = match (schedule.recurrence, &schedule.days_of_week) {
        (Recurrence::Daily, None) => None,
        (Recurrence::Daily, Some(_)) => {
            return Err(MedError::InvalidSchedule(
                "daily schedules must not specify days of week".to_string(),
            ))
        }
        (Recurrence::Weekly, None) => {
            return Err(MedError::InvalidSchedule(
                "weekly schedules require days of week".to_string(),
            ))
        }
        (Recurrence::Weekly, Some(days)) => Some(iso_weekdays(days)?),
    };

    Ok(CompiledRule {
        time_of_day,
        timezone,
        weekdays,
    })
}

fn iso_weekdays(days: &[u8]) -> Result<Vec<Weekday>> {
    if days.is_empty() {
        return Err(MedError::InvalidSchedule(
            "weekly schedules require at least one day of week".to_string(),
        ));
    }

    let mut weekdays = Vec::with_capacity(days.len());
    for &day in days {
        let weekday = match day {
            1 => Weekday::Mon,
            2 => Weekday::Tue,
            3 => Weekday::Wed,
            4 => Weekday::Thu,
            5 => Weekday::Fri,
            6 => Weekday::Sat,
            7 => Weekday::Sun,
            other => {
                return Err(MedError::InvalidSchedule(format!(
                    "day of week must be 1-7, got {}",
                    other
                )))
            }
        };
        if weekdays.contains(&weekday) {
            return Err(MedError::InvalidSchedule(format!("duplicate day of week: {}", day)));
        }
        weekdays.push(weekday);
    }

    Ok(weekdays)
}
