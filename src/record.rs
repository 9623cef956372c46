/// 地址记录 (Record)
///
/// 一个 AOR 下所有 `ExtendedContact` 的集合。按联系人身份键去重，
/// 容量由 `RecordLimits` 限制，满时淘汰最久未更新的条目。
use crate::contact::{BindingContext, ExtendedContact};
use crate::sip::ContactEntry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 记录限制，构造时显式注入
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLimits {
    /// 每个 AOR 的最大 Contact 数
    pub max_contacts: usize,

    /// 线路参数名
    pub line_field_name: Option<String>,
}

impl RecordLimits {
    pub fn new(max_contacts: usize) -> Self {
        Self {
            max_contacts,
            line_field_name: None,
        }
    }

    pub fn with_line_field_name(mut self, name: impl Into<String>) -> Self {
        self.line_field_name = Some(name.into());
        self
    }
}

impl From<&crate::config::RegistrarConfig> for RecordLimits {
    fn from(config: &crate::config::RegistrarConfig) -> Self {
        Self {
            max_contacts: config.max_contacts_by_aor,
            line_field_name: config.line_field().map(str::to_string),
        }
    }
}

/// 远程存储中的记录形式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredRecord {
    pub contacts: Vec<ExtendedContact>,
}

#[derive(Debug, Clone)]
pub struct Record {
    aor: String,
    contacts: Vec<ExtendedContact>,
    limits: RecordLimits,
}

impl Record {
    /// 创建空记录
    pub fn new(aor: impl Into<String>, limits: RecordLimits) -> Self {
        Self {
            aor: aor.into(),
            contacts: Vec::new(),
            limits,
        }
    }

    /// 由已有联系人直接构造，不做容量检查（用于合并解析结果）
    pub fn with_contacts(
        aor: impl Into<String>,
        limits: RecordLimits,
        contacts: Vec<ExtendedContact>,
    ) -> Self {
        Self {
            aor: aor.into(),
            contacts,
            limits,
        }
    }

    /// 由存储形式恢复
    pub fn from_stored(aor: impl Into<String>, limits: RecordLimits, stored: StoredRecord) -> Self {
        let mut record = Self::new(aor, limits);
        for contact in stored.contacts {
            record.insert_or_update_binding(contact);
        }
        record
    }

    /// 转为存储形式
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord {
            contacts: self.contacts.clone(),
        }
    }

    pub fn aor(&self) -> &str {
        &self.aor
    }

    pub fn contacts(&self) -> &[ExtendedContact] {
        &self.contacts
    }

    pub fn limits(&self) -> &RecordLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// 插入或替换一个绑定
    ///
    /// 身份键相同则删除旧条目并追加新条目（替换不占用容量）；
    /// 否则容量未满时追加，满时淘汰 `updated_at` 最小的条目。
    pub fn insert_or_update_binding(&mut self, contact: ExtendedContact) {
        if let Some(pos) = self
            .contacts
            .iter()
            .position(|existing| existing.contact_id() == contact.contact_id())
        {
            self.contacts.remove(pos);
            self.contacts.push(contact);
            return;
        }

        if self.contacts.len() >= self.limits.max_contacts {
            let mut oldest: Option<usize> = None;
            for (idx, existing) in self.contacts.iter().enumerate() {
                match oldest {
                    Some(o) if self.contacts[o].updated_at() <= existing.updated_at() => {}
                    _ => oldest = Some(idx),
                }
            }
            if let Some(idx) = oldest {
                let evicted = self.contacts.remove(idx);
                debug!(
                    "{} 已满 ({}), 淘汰最久未更新的联系人 {}",
                    self.aor,
                    self.limits.max_contacts,
                    evicted.sip_uri()
                );
            }
        }

        self.contacts.push(contact);
    }

    /// 同一 Call-ID 下已有 CSeq 不小于新请求时为无效请求
    pub fn is_invalid_register(&self, call_id: &str, cseq: u32) -> bool {
        self.contacts
            .iter()
            .any(|ec| ec.call_id() == call_id && cseq <= ec.cseq())
    }

    /// 绑定前清理
    ///
    /// 删除已过期、与新请求同线路或同 Call-ID 的条目。
    /// 调用前应先用 `is_invalid_register` 检查请求。
    pub fn clean_for_binding(&mut self, line_value: Option<&str>, call_id: &str, now: i64) {
        self.contacts.retain(|ec| {
            let expired = ec.is_expired(now);
            let same_line = matches!((ec.line_value(), line_value), (Some(a), Some(b)) if a == b);
            let same_call = ec.call_id() == call_id;
            !(expired || same_line || same_call)
        });
        self.log_contents();
    }

    /// 纯过期清理，返回删除的条目数
    pub fn clean(&mut self, now: i64) -> usize {
        let before = self.contacts.len();
        self.contacts.retain(|ec| !ec.is_expired(now));
        before - self.contacts.len()
    }

    /// 第一个 Contact 上的线路参数值
    pub fn line_value_of(&self, entries: &[ContactEntry]) -> Option<String> {
        let name = self.limits.line_field_name.as_deref()?;
        entries.first().and_then(|entry| entry.param_value(name))
    }

    /// 将 REGISTER 中的所有 Contact 写入记录
    pub fn bind(&mut self, entries: &[ContactEntry], binding: &BindingContext) {
        let line_field = self.limits.line_field_name.clone();
        for entry in entries {
            let contact = ExtendedContact::from_entry(entry, binding, line_field.as_deref());
            self.insert_or_update_binding(contact);
        }
        self.log_contents();
    }

    /// 渲染所有未过期的联系人
    pub fn get_contacts(&self, now: i64) -> Vec<String> {
        self.contacts
            .iter()
            .filter_map(|ec| ec.to_wire(now))
            .collect()
    }

    /// 未过期的联系人
    pub fn live_contacts(&self, now: i64) -> impl Iterator<Item = &ExtendedContact> {
        self.contacts.iter().filter(move |ec| !ec.is_expired(now))
    }

    /// 最晚的过期时间
    pub fn latest_expiry(&self) -> Option<i64> {
        self.contacts.iter().map(ExtendedContact::expire_at).max()
    }

    /// 以 debug 级别打印记录内容
    pub fn log_contents(&self) {
        debug!("Record {} contains {} contacts", self.aor, self.contacts.len());
        for ec in &self.contacts {
            debug!(
                "  {} expire_at={} route={:?} alias={}",
                ec.sip_uri(),
                ec.expire_at(),
                ec.route(),
                ec.is_alias()
            );
        }
    }
}
