/// Backend traits 定义
///
/// 使用 trait 抽象不同的存储后端
use crate::config::DbImplementation;
use crate::contact::BindingContext;
use crate::error::{RegistrarError, Result};
use crate::record::Record;
use crate::sip::{Aor, RegisterRequest};
use async_trait::async_trait;
use tracing::warn;

/// 绑定请求
///
/// REGISTER 解析结果加上代理侧提供的路由、默认过期时间与别名标记。
#[derive(Debug, Clone)]
pub struct BindRequest {
    /// 已解析的 REGISTER
    pub request: RegisterRequest,

    /// 路由
    pub route: Option<String>,

    /// 默认过期秒数（REGISTER 带 Expires 头时以头为准）
    pub global_expire: i64,

    /// 是否为别名绑定
    pub alias: bool,

    /// 当前时间（unix 秒）
    pub now: i64,
}

impl BindRequest {
    pub fn aor(&self) -> &Aor {
        &self.request.aor
    }

    /// Contact 未带 expires 参数时使用的过期秒数
    pub fn default_expire(&self) -> i64 {
        self.request
            .expires
            .map(i64::from)
            .unwrap_or(self.global_expire)
    }

    /// 本次请求中所有 Contact 共享的绑定上下文
    pub fn binding_context(&self) -> BindingContext {
        BindingContext {
            route: self.route.clone(),
            global_expire: self.default_expire(),
            call_id: self.request.call_id.clone(),
            cseq: self.request.cseq,
            now: self.now,
            alias: self.alias,
        }
    }
}

/// 存储后端 trait
///
/// 所有操作都以 future 的形式完成；同步后端的阻塞往返由实现自行
/// 移出事件循环。实现必须对同一 AOR 的读-改-写串行化，
/// 不同 AOR 之间互不阻塞。
#[async_trait]
pub trait RegistrarBackend: Send + Sync {
    /// 后端类型
    fn kind(&self) -> DbImplementation;

    /// 绑定 Contact，返回更新后的记录
    ///
    /// Contact 数超限或 CSeq 过期时返回错误且不修改任何状态。
    async fn do_bind(&self, request: &BindRequest) -> Result<Record>;

    /// 读取记录，不存在时返回 None
    async fn do_fetch(&self, aor: &Aor) -> Result<Option<Record>>;

    /// 删除记录
    async fn do_clear(&self, aor: &Aor) -> Result<()>;

    /// 过期清理，返回删除的联系人数
    async fn sweep_expired(&self, now: i64) -> Result<usize>;
}

/// Contact 数量检查
pub fn check_contact_count(request: &RegisterRequest, max_contacts: usize) -> Result<()> {
    let count = request.contacts.len();
    if count > max_contacts {
        warn!(
            "Too many contacts in register {} {} > {}",
            request.aor.key(),
            count,
            max_contacts
        );
        return Err(RegistrarError::TooManyContacts {
            aor: request.aor.key(),
            count,
            max: max_contacts,
        });
    }
    Ok(())
}

/// Contact 参数检查
///
/// `expires` 必须是合法的 delta-seconds。
pub fn check_contact_params(request: &RegisterRequest) -> Result<()> {
    for contact in &request.contacts {
        if let Err(err) = contact.expires() {
            warn!("Rejecting register {}: {}", request.aor.key(), err);
            return Err(err);
        }
    }
    Ok(())
}

/// 在记录上执行一次绑定：CSeq 校验、清理、写入
///
/// 校验失败时记录保持不变。
pub fn apply_bind(record: &mut Record, request: &BindRequest) -> Result<()> {
    let register = &request.request;
    if record.is_invalid_register(&register.call_id, register.cseq) {
        warn!(
            "拒绝过期的 REGISTER: aor={}, call-id={}, cseq={}",
            register.aor.key(),
            register.call_id,
            register.cseq
        );
        return Err(RegistrarError::StaleRequest {
            aor: register.aor.key(),
            call_id: register.call_id.clone(),
            cseq: register.cseq,
        });
    }

    let line_value = record.line_value_of(&register.contacts);
    record.clean_for_binding(line_value.as_deref(), &register.call_id, request.now);
    record.bind(&register.contacts, &request.binding_context());
    Ok(())
}
