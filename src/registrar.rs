/// 注册数据库门面
///
/// 显式构造的上下文对象，持有唯一的后端实例。对外提供 bind / fetch /
/// clear 三个操作，两种调用方式：
/// - `*_record`: 返回 future，调用方直接 await 结果
/// - `bind` / `fetch` / `clear`: 即发即忘，结果通过 `RegistrarListener` 回调
use crate::backend::{Backend, BackendFactory, BindRequest, RegistrarBackend, RemoteStores};
use crate::config::{DbImplementation, RegistrarConfig};
use crate::error::{RegistrarError, Result};
use crate::record::{Record, RecordLimits};
use crate::resolver::RecursiveResolver;
use crate::sip::{Aor, RegisterRequest};
use crate::utils::unix_now;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 结果监听器
///
/// 每个请求恰好触发一次回调。
pub trait RegistrarListener: Send + Sync {
    /// 请求成功；记录不存在时为 None
    fn on_record_found(&self, record: Option<&Record>);

    /// 后端故障
    fn on_error(&self, error: &RegistrarError);

    /// 请求无效（Contact 过多、CSeq 过期、格式错误）
    fn on_invalid(&self, error: &RegistrarError);
}

/// 注册数据库
#[derive(Clone)]
pub struct RegistrarDb {
    backend: Arc<Backend>,
    limits: RecordLimits,
    max_recursion_depth: u32,
}

impl std::fmt::Debug for RegistrarDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrarDb")
            .field("kind", &self.kind())
            .field("limits", &self.limits)
            .field("max_recursion_depth", &self.max_recursion_depth)
            .finish()
    }
}

impl RegistrarDb {
    /// 按配置创建注册数据库
    ///
    /// 不支持的后端或缺少远程存储时返回配置错误，不降级到其他实现。
    pub fn new(config: &RegistrarConfig, stores: RemoteStores) -> Result<Self> {
        let backend = BackendFactory::create(config, stores)?;
        Ok(Self::with_backend(
            backend,
            RecordLimits::from(config),
            config.max_recursion_depth,
        ))
    }

    /// 使用已创建的后端
    pub fn with_backend(backend: Backend, limits: RecordLimits, max_recursion_depth: u32) -> Self {
        Self {
            backend: Arc::new(backend),
            limits,
            max_recursion_depth,
        }
    }

    pub fn kind(&self) -> DbImplementation {
        self.backend.kind()
    }

    pub fn limits(&self) -> &RecordLimits {
        &self.limits
    }

    pub fn max_contacts(&self) -> usize {
        self.limits.max_contacts
    }

    pub fn max_recursion_depth(&self) -> u32 {
        self.max_recursion_depth
    }

    /// REGISTER 中的 Contact 数
    pub fn count_contacts(request: &RegisterRequest) -> usize {
        request.contacts.len()
    }

    /// 绑定
    pub async fn bind_record(
        &self,
        request: RegisterRequest,
        route: Option<String>,
        global_expire: i64,
        alias: bool,
    ) -> Result<Record> {
        self.bind_record_at(request, route, global_expire, alias, unix_now())
            .await
    }

    /// 以指定时间绑定
    pub async fn bind_record_at(
        &self,
        request: RegisterRequest,
        route: Option<String>,
        global_expire: i64,
        alias: bool,
        now: i64,
    ) -> Result<Record> {
        let request = BindRequest {
            request,
            route,
            global_expire,
            alias,
            now,
        };
        let record = self.backend.do_bind(&request).await?;
        info!(
            "绑定成功: aor={}, contacts={}, call-id={}, cseq={}",
            record.aor(),
            record.len(),
            request.request.call_id,
            request.request.cseq
        );
        Ok(record)
    }

    /// 读取记录；`recursive` 为 true 时展开别名
    pub async fn fetch_record(&self, aor: &Aor, recursive: bool) -> Result<Option<Record>> {
        self.fetch_record_at(aor, recursive, unix_now()).await
    }

    /// 以指定时间读取记录（时间只影响别名展开时的存活判断）
    pub async fn fetch_record_at(
        &self,
        aor: &Aor,
        recursive: bool,
        now: i64,
    ) -> Result<Option<Record>> {
        if recursive {
            let resolver =
                RecursiveResolver::new(&self.backend, self.limits.clone(), self.max_recursion_depth);
            resolver.resolve(aor, now).await
        } else {
            self.backend.do_fetch(aor).await
        }
    }

    /// 删除 REGISTER 中 AOR 的全部绑定
    pub async fn clear_record(&self, request: &RegisterRequest) -> Result<()> {
        self.backend.do_clear(&request.aor).await?;
        info!("已清除 {}", request.aor.key());
        Ok(())
    }

    /// 过期清理
    pub async fn sweep_expired(&self, now: i64) -> Result<usize> {
        self.backend.sweep_expired(now).await
    }

    /// 即发即忘的绑定
    pub fn bind(
        &self,
        request: RegisterRequest,
        route: Option<String>,
        global_expire: i64,
        alias: bool,
        listener: Arc<dyn RegistrarListener>,
    ) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            let outcome = db
                .bind_record(request, route, global_expire, alias)
                .await
                .map(Some);
            deliver(listener.as_ref(), outcome);
        })
    }

    /// 即发即忘的读取
    pub fn fetch(
        &self,
        aor: Aor,
        listener: Arc<dyn RegistrarListener>,
        recursive: bool,
    ) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            let outcome = db.fetch_record(&aor, recursive).await;
            deliver(listener.as_ref(), outcome);
        })
    }

    /// 即发即忘的删除，成功时回调 `on_record_found(None)`
    pub fn clear(
        &self,
        request: RegisterRequest,
        listener: Arc<dyn RegistrarListener>,
    ) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            let outcome = db.clear_record(&request).await.map(|_| None);
            deliver(listener.as_ref(), outcome);
        })
    }

    /// 启动周期性过期清理，直到 `cancel` 被触发
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let db = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("过期清理任务已停止");
                        break;
                    }
                    _ = ticker.tick() => {
                        match db.sweep_expired(unix_now()).await {
                            Ok(0) => {}
                            Ok(removed) => debug!("过期清理删除 {} 个联系人", removed),
                            Err(e) => warn!("过期清理失败: {}", e),
                        }
                    }
                }
            }
        })
    }
}

/// 将结果分发到监听器
fn deliver(listener: &dyn RegistrarListener, outcome: Result<Option<Record>>) {
    match outcome {
        Ok(record) => listener.on_record_found(record.as_ref()),
        Err(e) if e.is_invalid() => {
            warn!("请求无效: {} ({})", e, e.error_code());
            listener.on_invalid(&e);
        }
        Err(e) => {
            error!("注册数据库错误: {} ({})", e, e.error_code());
            listener.on_error(&e);
        }
    }
}
