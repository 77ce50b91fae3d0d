//! 剂量标识编解码
//!
//! 剂量标识是 `(schedule_id, scheduled_for)` 的可逆、URL安全的不透明编码：
//!
//! ```text
//! "v1:" + base64url_nopad( len:u32be | schedule_id utf8 | secs:i64be | nanos:u32be )
//! ```
//!
//! 计划ID以长度前缀写入载荷，因此可以包含任意字符（包括 `+`、`/`、`=`、`|`）。
//!
//! 编码的定义域是非空计划ID和微秒精度的时刻（与持久化的 `timestamptz` 精度一致），
//! 解码拒绝定义域之外的载荷，因此标识与存储键一一对应。

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use medtrack_core::{MedError, Result};

const VERSION_PREFIX: &str = "v1:";
const LEN_SIZE: usize = 4;
const INSTANT_SIZE: usize = 12;
const NANOS_PER_SEC: u32 = 1_000_000_000;
const NANOS_PER_MICRO: u32 = 1_000;

/// 编码剂量标识
///
/// 空计划ID或带亚微秒部分的时刻不在定义域内，得到的标识无法解码。
pub fn encode_dose_id(schedule_id: &str, scheduled_for: DateTime<Utc>) -> String {
    let id_bytes = schedule_id.as_bytes();
    let mut payload = Vec::with_capacity(LEN_SIZE + id_bytes.len() + INSTANT_SIZE);

    payload.extend_from_slice(&(id_bytes.len() as u32).to_be_bytes());
    payload.extend_from_slice(id_bytes);
    payload.extend_from_slice(&scheduled_for.timestamp().to_be_bytes());
    payload.extend_from_slice(&scheduled_for.timestamp_subsec_nanos().to_be_bytes());

    format!("{}{}", VERSION_PREFIX, URL_SAFE_NO_PAD.encode(payload))
}

/// 解码剂量标识
pub fn decode_dose_id(dose_id: &str) -> Result<(String, DateTime<Utc>)> {
    let encoded = dose_id
        .strip_prefix(VERSION_PREFIX)
        .ok_or_else(|| MedError::InvalidDoseId("missing or unsupported version prefix".to_string()))?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| MedError::InvalidDoseId(format!("payload is not base64url: {}", e)))?;

    if payload.len() < LEN_SIZE + INSTANT_SIZE {
        return Err(MedError::InvalidDoseId("payload too short".to_string()));
    }

    let (len_bytes, rest) = payload.split_at(LEN_SIZE);
    let id_len = u32::from_be_bytes(to_array(len_bytes)?) as usize;
    if rest.len() != id_len + INSTANT_SIZE {
        return Err(MedError::InvalidDoseId("payload length mismatch".to_string()));
    }

    let (id_bytes, instant_bytes) = rest.split_at(id_len);
    let schedule_id = std::str::from_utf8(id_bytes)
        .map_err(|_| MedError::InvalidDoseId("schedule id is not utf-8".to_string()))?;
    if schedule_id.is_empty() {
        return Err(MedError::InvalidDoseId("empty schedule id".to_string()));
    }

    let (secs_bytes, nanos_bytes) = instant_bytes.split_at(8);
    let secs = i64::from_be_bytes(to_array(secs_bytes)?);
    let nanos = u32::from_be_bytes(to_array(nanos_bytes)?);
    if nanos >= NANOS_PER_SEC {
        return Err(MedError::InvalidDoseId("sub-second part out of range".to_string()));
    }
    if nanos % NANOS_PER_MICRO != 0 {
        return Err(MedError::InvalidDoseId("sub-microsecond precision is not supported".to_string()));
    }

    let scheduled_for = DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| MedError::InvalidDoseId("instant out of range".to_string()))?;

    Ok((schedule_id.to_string(), scheduled_for))
}

fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| MedError::InvalidDoseId("truncated payload".to_string()))
}
