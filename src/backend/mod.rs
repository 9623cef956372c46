/// Backend 模块
///
/// 注册数据库的存储后端
///
/// ## 设计模式
///
/// 使用 **策略模式 (Strategy Pattern)** 和 **工厂模式 (Factory Pattern)**：
///
/// - `RegistrarBackend` trait: 定义存储行为接口
/// - `InternalBackend`: 进程内实现
/// - `RedisSyncBackend`: 阻塞式远程存储实现
/// - `RedisAsyncBackend`: 异步远程存储实现
/// - `BackendFactory`: 按配置创建后端，结果为封闭枚举 `Backend`
///
/// ## 使用示例
///
/// ```rust,no_run
/// use sip_registrar::backend::*;
/// use sip_registrar::config::{DbImplementation, RegistrarConfig};
///
/// let config = RegistrarConfig::new(DbImplementation::Internal, 10);
/// let backend = BackendFactory::create(&config, RemoteStores::none())?;
/// # Ok::<(), sip_registrar::ConfigError>(())
/// ```

mod factory;
mod internal;
mod locks;
mod redis_async;
mod redis_sync;
mod remote;
mod traits;

// 导出公共接口
pub use factory::{Backend, BackendFactory, RemoteStores};
pub use internal::InternalBackend;
pub use locks::{KeyGuard, KeyLocks};
pub use redis_async::RedisAsyncBackend;
pub use redis_sync::RedisSyncBackend;
pub use remote::{decode_record, encode_record, Persist};
pub use traits::{
    apply_bind, check_contact_count, check_contact_params, BindRequest, RegistrarBackend,
};
