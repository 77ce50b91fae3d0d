//! 剂量时间展开
//!
//! 将一条重复规则在其时区内按本地日期逐日展开，换算为UTC时刻，
//! 只保留落在半开区间 `[from, to)` 内的时刻。
//!
//! 夏令时处理：
//! - 本地时间不存在（春季跳时）时，按跳变前的偏移解释，即向后顺延跳过的长度；
//! - 本地时间出现两次（秋季回拨）时，取较早的UTC时刻。

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use medtrack_core::utils::DEFAULT_TIMEZONE;
use medtrack_core::{MedError, MedicationSchedule, Result};

use crate::validation::compile;

/// 在 `[from, to)` 内展开用药计划，空时区使用系统默认时区
pub fn generate_occurrences(
    schedule: &MedicationSchedule,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    generate_occurrences_in(schedule, from, to, DEFAULT_TIMEZONE)
}

/// 在 `[from, to)` 内展开用药计划，空时区使用 `default_timezone`
pub fn generate_occurrences_in(
    schedule: &MedicationSchedule,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    default_timezone: Tz,
) -> Result<Vec<DateTime<Utc>>> {
    if from > to {
        return Err(MedError::InvalidWindow { from, to });
    }
    if from == to {
        return Ok(Vec::new());
    }

    let rule = compile(schedule, default_timezone)?;
    let tz = rule.timezone;

    // 本地日期超出可表示范围时取日期边界
    let first_local = local_date(&tz, from).unwrap_or(NaiveDate::MIN);
    let last_local = local_date(&tz, to).unwrap_or(NaiveDate::MAX);

    // 跳时顺延可能把前一天的剂量推到 from 所在的本地日期
    let mut date = first_local
        .pred_opt()
        .unwrap_or(first_local)
        .max(schedule.start_date);
    let last = match schedule.end_date {
        Some(end_date) => last_local.min(end_date),
        None => last_local,
    };

    let mut occurrences = Vec::new();
    while date <= last {
        if rule.matches(date.weekday()) {
            if let Some(instant) = resolve_local(&tz, date.and_time(rule.time_of_day)) {
                if instant >= from && instant < to {
                    occurrences.push(instant);
                }
            }
        }

        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    // 整日跳过时，前一天顺延后的时刻与当天的时刻重合
    occurrences.dedup();
    Ok(occurrences)
}

/// UTC时刻所在的本地日期，超出可表示范围时返回 `None`
fn local_date(tz: &Tz, instant: DateTime<Utc>) -> Option<NaiveDate> {
    let offset = tz.offset_from_utc_datetime(&instant.naive_utc()).fix();
    instant
        .naive_utc()
        .checked_add_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
        .map(|local| local.date())
}

/// 本地墙钟时间换算为UTC时刻，超出可表示范围时返回 `None`
fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, second) => Some(first.min(second).with_timezone(&Utc)),
        LocalResult::None => {
            let probe = local.checked_sub_signed(Duration::days(1)).unwrap_or(local);
            let offset_before = tz.offset_from_utc_datetime(&probe).fix().local_minus_utc();
            local
                .checked_sub_signed(Duration::seconds(i64::from(offset_before)))
                .map(|utc| Utc.from_utc_datetime(&utc))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::America::New_York;
    use medtrack_core::Recurrence;

    fn schedule(
        recurrence: Recurrence,
        time_of_day: &str,
        timezone: &str,
        days_of_week: Option<Vec<u8>>,
    ) -> MedicationSchedule {
        MedicationSchedule {
            id: "sched-1".to_string(),
            medication_id: "med-1".to_string(),
            recurrence,
            time_of_day: time_of_day.to_string(),
            timezone: timezone.to_string(),
            days_of_week,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            dosage_notes: None,
        }
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_utc_example() {
        let mut s = schedule(Recurrence::Daily, "08:00", "UTC", None);
        s.start_date = NaiveDate::from_ymd_opt(2024, 12, 1).unwrap();

        let occurrences = generate_occurrences(&s, utc(2024, 12, 1, 0, 0), utc(2024, 12, 4, 0, 0)).unwrap();
        assert_eq!(
            occurrences,
            vec![utc(2024, 12, 1, 8, 0), utc(2024, 12, 2, 8, 0), utc(2024, 12, 3, 8, 0)]
        );
    }

    #[test]
    fn test_window_is_half_open() {
        let s = schedule(Recurrence::Daily, "08:00", "UTC", None);

        let occurrences = generate_occurrences(&s, utc(2024, 12, 1, 8, 0), utc(2024, 12, 3, 8, 0)).unwrap();
        assert_eq!(occurrences, vec![utc(2024, 12, 1, 8, 0), utc(2024, 12, 2, 8, 0)]);
    }

    #[test]
    fn test_zero_width_window() {
        let s = schedule(Recurrence::Daily, "08:00", "UTC", None);
        let at = utc(2024, 12, 1, 8, 0);
        assert!(generate_occurrences(&s, at, at).unwrap().is_empty());
    }

    #[test]
    fn test_inverted_window() {
        let s = schedule(Recurrence::Daily, "08:00", "UTC", None);
        let result = generate_occurrences(&s, utc(2024, 12, 2, 0, 0), utc(2024, 12, 1, 0, 0));
        assert!(matches!(result, Err(MedError::InvalidWindow { .. })));
    }

    #[test]
    fn test_daily_count_over_local_midnights() {
        let s = schedule(Recurrence::Daily, "09:15", "America/New_York", None);
        // 窗口跨越 2024-03-10 夏令时切换
        let from = New_York.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap().with_timezone(&Utc);
        let to = New_York.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap().with_timezone(&Utc);

        let occurrences = generate_occurrences(&s, from, to).unwrap();
        assert_eq!(occurrences.len(), 10);
        assert!(occurrences.windows(2).all(|pair| pair[0] < pair[1]));
        for occurrence in &occurrences {
            assert_eq!(
                occurrence.with_timezone(&New_York).time(),
                NaiveTime::from_hms_opt(9, 15, 0).unwrap()
            );
        }
    }

    #[test]
    fn test_weekly_selectivity() {
        let s = schedule(Recurrence::Weekly, "08:00", "UTC", Some(vec![1, 4, 7]));
        // 2024-12-02 为周一
        let occurrences = generate_occurrences(&s, utc(2024, 12, 2, 0, 0), utc(2024, 12, 9, 0, 0)).unwrap();
        assert_eq!(
            occurrences,
            vec![utc(2024, 12, 2, 8, 0), utc(2024, 12, 5, 8, 0), utc(2024, 12, 8, 8, 0)]
        );
    }

    #[test]
    fn test_dst_spring_forward_shifts_past_gap() {
        let s = schedule(Recurrence::Daily, "02:30", "America/New_York", None);
        let occurrences = generate_occurrences(&s, utc(2024, 3, 10, 0, 0), utc(2024, 3, 11, 0, 0)).unwrap();

        assert_eq!(occurrences.len(), 1);
        let local = occurrences[0].with_timezone(&New_York);
        assert_eq!(local.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(local.time(), NaiveTime::from_hms_opt(3, 30, 0).unwrap());
        assert_eq!(occurrences[0], utc(2024, 3, 10, 7, 30));
    }

    #[test]
    fn test_dst_fall_back_uses_earlier_instant() {
        let s = schedule(Recurrence::Daily, "01:30", "America/New_York", None);
        let from = New_York.with_ymd_and_hms(2024, 11, 3, 0, 0, 0).unwrap().with_timezone(&Utc);
        let to = New_York.with_ymd_and_hms(2024, 11, 4, 0, 0, 0).unwrap().with_timezone(&Utc);

        let occurrences = generate_occurrences(&s, from, to).unwrap();
        // 01:30 EDT (UTC-4)，而不是 01:30 EST (UTC-5)
        assert_eq!(occurrences, vec![utc(2024, 11, 3, 5, 30)]);
    }

    #[test]
    fn test_start_and_end_dates_bound_the_walk() {
        let mut s = schedule(Recurrence::Daily, "08:00", "UTC", None);
        s.start_date = NaiveDate::from_ymd_opt(2024, 12, 3).unwrap();
        s.end_date = Some(NaiveDate::from_ymd_opt(2024, 12, 5).unwrap());

        let occurrences = generate_occurrences(&s, utc(2024, 12, 1, 0, 0), utc(2024, 12, 10, 0, 0)).unwrap();
        assert_eq!(
            occurrences,
            vec![utc(2024, 12, 3, 8, 0), utc(2024, 12, 4, 8, 0), utc(2024, 12, 5, 8, 0)]
        );
    }

    #[test]
    fn test_empty_timezone_uses_default() {
        let s = schedule(Recurrence::Daily, "08:00", "", None);
        let occurrences = generate_occurrences(&s, utc(2024, 12, 1, 0, 0), utc(2024, 12, 2, 0, 0)).unwrap();
        // America/New_York 冬令时 UTC-5
        assert_eq!(occurrences, vec![utc(2024, 12, 1, 13, 0)]);

        let occurrences =
            generate_occurrences_in(&s, utc(2024, 12, 1, 0, 0), utc(2024, 12, 2, 0, 0), chrono_tz::UTC).unwrap();
        assert_eq!(occurrences, vec![utc(2024, 12, 1, 8, 0)]);
    }

    #[test]
    fn test_invalid_schedule_is_not_expanded() {
        let s = schedule(Recurrence::Weekly, "08:00", "UTC", None);
        let result = generate_occurrences(&s, utc(2024, 12, 1, 0, 0), utc(2024, 12, 8, 0, 0));
        assert!(matches!(result, Err(MedError::InvalidSchedule(_))));
    }

    #[test]
    fn test_window_starting_mid_day_in_far_zone() {
        let s = schedule(Recurrence::Daily, "23:00", "Pacific/Auckland", None);
        // 2024-12-01 23:00 NZDT = 2024-12-01T10:00Z
        let occurrences = generate_occurrences(&s, utc(2024, 12, 1, 9, 0), utc(2024, 12, 2, 9, 0)).unwrap();
        assert_eq!(occurrences, vec![utc(2024, 12, 1, 10, 0)]);
    }

    #[test]
    fn test_skipped_day_dose_lands_on_next_local_date() {
        // Pacific/Apia 跳过了 2011-12-30 整天（-10 直接切换到 +14）
        let mut s = schedule(Recurrence::Weekly, "08:00", "Pacific/Apia", Some(vec![5]));
        s.start_date = NaiveDate::from_ymd_opt(2011, 12, 1).unwrap();
        // 本地 2011-12-31 全天
        let from = utc(2011, 12, 30, 10, 0);
        let to = utc(2011, 12, 31, 10, 0);

        // 周五 12-30 的剂量按跳变前偏移解释，落在本地 12-31（周六）
        let occurrences = generate_occurrences(&s, from, to).unwrap();
        assert_eq!(occurrences, vec![utc(2011, 12, 30, 18, 0)]);

        s.recurrence = Recurrence::Daily;
        s.days_of_week = None;
        let occurrences = generate_occurrences(&s, from, to).unwrap();
        assert_eq!(occurrences, vec![utc(2011, 12, 30, 18, 0)]);
    }

    #[test]
    fn test_window_at_end_of_representable_time() {
        let s = schedule(Recurrence::Daily, "23:30", "Pacific/Kiritimati", None);
        let to = DateTime::<Utc>::MAX_UTC;
        let from = to - Duration::days(2);

        let occurrences = generate_occurrences(&s, from, to).unwrap();
        let expected: Vec<_> = [30, 31]
            .into_iter()
            .map(|day| {
                NaiveDate::from_ymd_opt(262143, 12, day)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap()
                    .and_utc()
            })
            .collect();
        assert_eq!(occurrences, expected);
    }
}
