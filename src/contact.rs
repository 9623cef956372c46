/// 扩展联系人
///
/// 一个已注册的绑定。构造后不可变：绑定更新时整体替换，而不是修改字段。
/// 存储绝对过期时间，渲染时再换算为剩余秒数，因为记录可能在写入之后
/// 任意时间才被读取。
use crate::sip::ContactEntry;
use serde::{Deserialize, Serialize};

/// 绑定上下文：同一次 REGISTER 中所有 Contact 共享的字段
#[derive(Debug, Clone)]
pub struct BindingContext {
    /// 路由（Path/Record-Route 信息）
    pub route: Option<String>,

    /// Contact 未携带 expires 时使用的默认过期秒数
    pub global_expire: i64,

    /// Call-ID
    pub call_id: String,

    /// CSeq
    pub cseq: u32,

    /// 当前时间（unix 秒）
    pub now: i64,

    /// 是否为别名绑定
    pub alias: bool,
}

/// 用于从存储反序列化或手工构造的原始字段
#[derive(Debug, Clone, Default)]
pub struct ContactParts {
    pub sip_uri: String,
    pub contact_id: String,
    pub route: Option<String>,
    pub line_value: Option<String>,
    pub expire_at: i64,
    pub q: f32,
    pub call_id: String,
    pub cseq: u32,
    pub updated_at: i64,
    pub alias: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedContact {
    sip_uri: String,
    contact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    line_value: Option<String>,
    expire_at: i64,
    #[serde(default)]
    q: f32,
    call_id: String,
    cseq: u32,
    updated_at: i64,
    #[serde(default)]
    alias: bool,
}

impl ExtendedContact {
    /// 由已解析的 Contact 条目构造
    ///
    /// Contact 自带 `expires` 参数时优先使用，否则使用全局默认值。
    /// `expires` 应已通过 `check_contact_params` 校验。
    pub fn from_entry(
        entry: &ContactEntry,
        binding: &BindingContext,
        line_field_name: Option<&str>,
    ) -> Self {
        let expires = match entry.expires() {
            Ok(Some(expires)) => i64::from(expires),
            _ => binding.global_expire,
        };
        Self {
            sip_uri: entry.uri.to_string(),
            contact_id: entry.contact_id(),
            route: binding.route.clone(),
            line_value: line_field_name.and_then(|name| entry.param_value(name)),
            expire_at: binding.now.saturating_add(expires),
            q: entry.q().unwrap_or(0.0),
            call_id: binding.call_id.clone(),
            cseq: binding.cseq,
            updated_at: binding.now,
            alias: binding.alias,
        }
    }

    /// 由原始字段构造
    pub fn from_parts(parts: ContactParts) -> Self {
        Self {
            sip_uri: parts.sip_uri,
            contact_id: parts.contact_id,
            route: parts.route,
            line_value: parts.line_value,
            expire_at: parts.expire_at,
            q: parts.q,
            call_id: parts.call_id,
            cseq: parts.cseq,
            updated_at: parts.updated_at,
            alias: parts.alias,
        }
    }

    pub fn sip_uri(&self) -> &str {
        &self.sip_uri
    }

    pub fn contact_id(&self) -> &str {
        &self.contact_id
    }

    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub fn line_value(&self) -> Option<&str> {
        self.line_value.as_deref()
    }

    pub fn expire_at(&self) -> i64 {
        self.expire_at
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn is_alias(&self) -> bool {
        self.alias
    }

    /// 剩余有效秒数
    pub fn remaining(&self, now: i64) -> i64 {
        self.expire_at.saturating_sub(now)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.remaining(now) <= 0
    }

    /// 渲染为可直接放入 Contact 头的文本
    ///
    /// 已过期时返回 None。
    pub fn to_wire(&self, now: i64) -> Option<String> {
        let expires = self.remaining(now);
        if expires <= 0 {
            return None;
        }
        if self.q == 0.0 {
            Some(format!("{};expires={}", self.sip_uri, expires))
        } else {
            Some(format!("{};q={:.2};expires={}", self.sip_uri, self.q, expires))
        }
    }
}
