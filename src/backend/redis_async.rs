/// 异步远程存储后端
///
/// 每次往返都是一个由外部事件循环驱动的 future。
use super::locks::KeyLocks;
use super::remote::{decode_record, encode_record, Persist};
use super::traits::{
    apply_bind, check_contact_count, check_contact_params, BindRequest, RegistrarBackend,
};
use crate::config::DbImplementation;
use crate::error::Result;
use crate::record::{Record, RecordLimits};
use crate::sip::Aor;
use crate::store::AsyncKvStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RedisAsyncBackend {
    store: Arc<dyn AsyncKvStore>,
    limits: RecordLimits,
    locks: KeyLocks,
}

impl RedisAsyncBackend {
    pub fn new(store: Arc<dyn AsyncKvStore>, limits: RecordLimits) -> Self {
        info!("RegistrarDB implementation is asynchronous REDIS");
        Self {
            store,
            limits,
            locks: KeyLocks::new(),
        }
    }
}

#[async_trait]
impl RegistrarBackend for RedisAsyncBackend {
    fn kind(&self) -> DbImplementation {
        DbImplementation::RedisAsync
    }

    async fn do_bind(&self, request: &BindRequest) -> Result<Record> {
        check_contact_count(&request.request, self.limits.max_contacts)?;
        check_contact_params(&request.request)?;

        let key = request.aor().key();
        let _guard = self.locks.lock(&key).await;

        let value = self.store.get(&key).await?;
        let mut record = decode_record(&key, &self.limits, value)?
            .unwrap_or_else(|| Record::new(key.clone(), self.limits.clone()));
        apply_bind(&mut record, request)?;

        match encode_record(&record, request.now)? {
            Persist::Store { value, ttl_secs } => self.store.set(&key, &value, ttl_secs).await?,
            Persist::Delete => self.store.del(&key).await?,
        }
        debug!("redis-async bind {} -> {} contacts", key, record.len());
        Ok(record)
    }

    async fn do_fetch(&self, aor: &Aor) -> Result<Option<Record>> {
        let key = aor.key();
        let value = self.store.get(&key).await?;
        decode_record(&key, &self.limits, value)
    }

    async fn do_clear(&self, aor: &Aor) -> Result<()> {
        let key = aor.key();
        let _guard = self.locks.lock(&key).await;
        self.store.del(&key).await
    }

    async fn sweep_expired(&self, _now: i64) -> Result<usize> {
        // 过期由存储端 TTL 处理
        Ok(0)
    }
}
