/// 远程存储的记录编解码
///
/// 每个 AOR 一个键（`user@host`），值为 `StoredRecord` 的 JSON。
/// 写入时 TTL 取最晚过期的联系人，存储会自行删除全部过期的记录。
use crate::error::Result;
use crate::record::{Record, RecordLimits, StoredRecord};

/// 写回动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persist {
    /// 写入值并设置 TTL
    Store { value: String, ttl_secs: u64 },

    /// 已无存活联系人，删除键
    Delete,
}

/// 解码存储中的值
pub fn decode_record(
    key: &str,
    limits: &RecordLimits,
    value: Option<String>,
) -> Result<Option<Record>> {
    match value {
        Some(value) => {
            let stored: StoredRecord = serde_json::from_str(&value)?;
            Ok(Some(Record::from_stored(key, limits.clone(), stored)))
        }
        None => Ok(None),
    }
}

/// 计算写回动作
pub fn encode_record(record: &Record, now: i64) -> Result<Persist> {
    let ttl = record.latest_expiry().map(|at| at - now).unwrap_or(0);
    if ttl <= 0 {
        return Ok(Persist::Delete);
    }
    Ok(Persist::Store {
        value: serde_json::to_string(&record.to_stored())?,
        ttl_secs: ttl as u64,
    })
}
