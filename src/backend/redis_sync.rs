/// 同步远程存储后端
///
/// 存储客户端是阻塞的，每次往返都放到 `spawn_blocking` 线程池执行，
/// 不占用事件循环线程。同一 AOR 的读-改-写在 `KeyLocks` 内完成。
use super::locks::KeyLocks;
use super::remote::{decode_record, encode_record, Persist};
use super::traits::{
    apply_bind, check_contact_count, check_contact_params, BindRequest, RegistrarBackend,
};
use crate::config::DbImplementation;
use crate::error::Result;
use crate::record::{Record, RecordLimits};
use crate::sip::Aor;
use crate::store::SyncKvStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RedisSyncBackend {
    store: Arc<dyn SyncKvStore>,
    limits: RecordLimits,
    locks: KeyLocks,
}

impl RedisSyncBackend {
    pub fn new(store: Arc<dyn SyncKvStore>, limits: RecordLimits) -> Self {
        info!("RegistrarDB implementation is synchronous REDIS");
        Self {
            store,
            limits,
            locks: KeyLocks::new(),
        }
    }
}

#[async_trait]
impl RegistrarBackend for RedisSyncBackend {
    fn kind(&self) -> DbImplementation {
        DbImplementation::RedisSync
    }

    async fn do_bind(&self, request: &BindRequest) -> Result<Record> {
        check_contact_count(&request.request, self.limits.max_contacts)?;
        check_contact_params(&request.request)?;

        let key = request.aor().key();
        let _guard = self.locks.lock(&key).await;

        let store = Arc::clone(&self.store);
        let limits = self.limits.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || -> Result<Record> {
            let mut record = decode_record(&key, &limits, store.get(&key)?)?
                .unwrap_or_else(|| Record::new(key.clone(), limits.clone()));
            apply_bind(&mut record, &request)?;

            match encode_record(&record, request.now)? {
                Persist::Store { value, ttl_secs } => store.set(&key, &value, ttl_secs)?,
                Persist::Delete => store.del(&key)?,
            }
            debug!("redis-sync bind {} -> {} contacts", key, record.len());
            Ok(record)
        })
        .await?
    }

    async fn do_fetch(&self, aor: &Aor) -> Result<Option<Record>> {
        let key = aor.key();
        let store = Arc::clone(&self.store);
        let limits = self.limits.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<Record>> {
            let value = store.get(&key)?;
            decode_record(&key, &limits, value)
        })
        .await?
    }

    async fn do_clear(&self, aor: &Aor) -> Result<()> {
        let key = aor.key();
        let _guard = self.locks.lock(&key).await;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.del(&key)).await?
    }

    async fn sweep_expired(&self, _now: i64) -> Result<usize> {
        // 过期由存储端 TTL 处理
        Ok(0)
    }
}
