//! 通用工具函数

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{MedError, Result};

/// 系统默认时区（新建被照护人档案时使用的时区）
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;

/// 解析 "HH:mm" 格式的本地时间
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 5
        && bytes[2] == b':'
        && bytes[..2].iter().chain(&bytes[3..]).all(u8::is_ascii_digit);

    if !well_formed {
        return Err(MedError::InvalidSchedule(format!(
            "time of day must be HH:mm, got {:?}",
            value
        )));
    }

    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| MedError::InvalidSchedule(format!("time of day out of range: {}", value)))
}

/// 解析IANA时区名称，空字符串回退到给定默认时区
pub fn resolve_timezone(name: &str, default: Tz) -> Result<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(default);
    }

    name.parse::<Tz>()
        .map_err(|_| MedError::InvalidSchedule(format!("unknown timezone: {}", name)))
}
