// 声明所有模块
pub mod backend;
pub mod config;
pub mod contact;
pub mod error;
pub mod record;
pub mod registrar;
pub mod resolver;
pub mod sip;
pub mod store;
pub mod utils;

/// 重新导出thiserror错误类型
pub use crate::error::{ConfigError, RegistrarError, Result};

/// 主要API重新导出，简化使用
pub use crate::backend::{Backend, BackendFactory, BindRequest, RegistrarBackend, RemoteStores};
pub use crate::config::{ConfigAccessor, DbImplementation, RegistrarConfig};
pub use crate::contact::{BindingContext, ContactParts, ExtendedContact};
pub use crate::record::{Record, RecordLimits, StoredRecord};
pub use crate::registrar::{RegistrarDb, RegistrarListener};
pub use crate::resolver::RecursiveResolver;
pub use crate::sip::{Aor, ContactEntry, RegisterRequest};
pub use crate::store::{AsyncKvStore, MemoryKvStore, SyncKvStore};

/// SIP Registrar库的版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 便捷函数：创建进程内注册数据库
pub fn create_internal_registrar(max_contacts_by_aor: usize) -> Result<RegistrarDb> {
    let config = RegistrarConfig::new(DbImplementation::Internal, max_contacts_by_aor);
    RegistrarDb::new(&config, RemoteStores::none())
}

/// 便捷函数：从外部配置访问器创建注册数据库
pub fn create_registrar_from_accessor(
    accessor: &dyn ConfigAccessor,
    stores: RemoteStores,
) -> Result<RegistrarDb> {
    let config = RegistrarConfig::from_accessor(accessor)?;
    RegistrarDb::new(&config, stores)
}
