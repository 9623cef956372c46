/// 后端工厂
///
/// 根据配置一次性选择后端实现，运行期间不再切换
use super::{
    internal::InternalBackend,
    redis_async::RedisAsyncBackend,
    redis_sync::RedisSyncBackend,
    traits::*,
};
use crate::config::{DbImplementation, RegistrarConfig};
use crate::error::{ConfigError, Result};
use crate::record::{Record, RecordLimits};
use crate::sip::Aor;
use crate::store::{AsyncKvStore, MemoryKvStore, SyncKvStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// 后端实例
///
/// 后端集合在编译期固定，使用枚举分发。
pub enum Backend {
    /// 进程内后端
    Internal(InternalBackend),

    /// 同步远程存储后端
    RedisSync(RedisSyncBackend),

    /// 异步远程存储后端
    RedisAsync(RedisAsyncBackend),
}

impl Backend {
    fn as_dyn(&self) -> &dyn RegistrarBackend {
        match self {
            Backend::Internal(backend) => backend,
            Backend::RedisSync(backend) => backend,
            Backend::RedisAsync(backend) => backend,
        }
    }
}

#[async_trait]
impl RegistrarBackend for Backend {
    fn kind(&self) -> DbImplementation {
        self.as_dyn().kind()
    }

    async fn do_bind(&self, request: &BindRequest) -> Result<Record> {
        self.as_dyn().do_bind(request).await
    }

    async fn do_fetch(&self, aor: &Aor) -> Result<Option<Record>> {
        self.as_dyn().do_fetch(aor).await
    }

    async fn do_clear(&self, aor: &Aor) -> Result<()> {
        self.as_dyn().do_clear(aor).await
    }

    async fn sweep_expired(&self, now: i64) -> Result<usize> {
        self.as_dyn().sweep_expired(now).await
    }
}

/// 远程存储句柄
///
/// 远程后端所需的存储能力由宿主注入。
#[derive(Clone, Default)]
pub struct RemoteStores {
    /// 阻塞式存储（redis-sync 需要）
    pub sync_store: Option<Arc<dyn SyncKvStore>>,

    /// 异步存储（redis-async 需要）
    pub async_store: Option<Arc<dyn AsyncKvStore>>,
}

impl RemoteStores {
    /// 不提供任何远程存储（仅 internal 可用）
    pub fn none() -> Self {
        Self::default()
    }

    /// 设置阻塞式存储
    pub fn with_sync_store(mut self, store: Arc<dyn SyncKvStore>) -> Self {
        self.sync_store = Some(store);
        self
    }

    /// 设置异步存储
    pub fn with_async_store(mut self, store: Arc<dyn AsyncKvStore>) -> Self {
        self.async_store = Some(store);
        self
    }

    /// 同一个进程内存储同时作为两种存储
    pub fn memory(store: Arc<MemoryKvStore>) -> Self {
        Self {
            sync_store: Some(store.clone()),
            async_store: Some(store),
        }
    }
}

/// 后端工厂
pub struct BackendFactory;

impl BackendFactory {
    /// 创建后端
    ///
    /// # 参数
    /// - `config`: 注册数据库配置
    /// - `stores`: 远程存储句柄
    ///
    /// # 返回
    /// - 配置所选的后端；远程后端缺少对应存储时返回配置错误，不降级
    pub fn create(
        config: &RegistrarConfig,
        stores: RemoteStores,
    ) -> std::result::Result<Backend, ConfigError> {
        config.validate()?;
        let limits = RecordLimits::from(config);
        info!(
            "创建注册数据库后端: 类型={}, max-contacts-by-aor={}, line-field-name={:?}",
            config.db_implementation,
            limits.max_contacts,
            limits.line_field_name
        );

        match config.db_implementation {
            DbImplementation::Internal => Ok(Backend::Internal(InternalBackend::new(limits))),
            DbImplementation::RedisSync => {
                let store = stores.sync_store.ok_or_else(|| {
                    ConfigError::Missing("synchronous store for redis-sync".to_string())
                })?;
                Ok(Backend::RedisSync(RedisSyncBackend::new(store, limits)))
            }
            DbImplementation::RedisAsync => {
                let store = stores.async_store.ok_or_else(|| {
                    ConfigError::Missing("asynchronous store for redis-async".to_string())
                })?;
                Ok(Backend::RedisAsync(RedisAsyncBackend::new(store, limits)))
            }
        }
    }
}
