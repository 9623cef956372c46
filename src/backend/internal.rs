/// 进程内后端
///
/// 记录保存在 `DashMap` 中，修改在表项锁内完成，同一 AOR 串行、
/// 不同 AOR 互不阻塞。所有操作在调用栈内同步完成。
use super::traits::{
    apply_bind, check_contact_count, check_contact_params, BindRequest, RegistrarBackend,
};
use crate::config::DbImplementation;
use crate::error::Result;
use crate::record::{Record, RecordLimits};
use crate::sip::Aor;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

pub struct InternalBackend {
    records: DashMap<String, Record>,
    limits: RecordLimits,
}

impl InternalBackend {
    pub fn new(limits: RecordLimits) -> Self {
        info!("RegistrarDB implementation is internal");
        Self {
            records: DashMap::new(),
            limits,
        }
    }

    /// 当前保存的 AOR 数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn bind_now(&self, request: &BindRequest) -> Result<Record> {
        check_contact_count(&request.request, self.limits.max_contacts)?;
        check_contact_params(&request.request)?;

        let key = request.aor().key();
        match self.records.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                apply_bind(occupied.get_mut(), request)?;
                Ok(occupied.get().clone())
            }
            Entry::Vacant(vacant) => {
                let mut record = Record::new(key, self.limits.clone());
                apply_bind(&mut record, request)?;
                let result = record.clone();
                vacant.insert(record);
                Ok(result)
            }
        }
    }

    fn sweep_now(&self, now: i64) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            removed += record.clean(now);
            !record.is_empty()
        });
        removed
    }
}

#[async_trait]
impl RegistrarBackend for InternalBackend {
    fn kind(&self) -> DbImplementation {
        DbImplementation::Internal
    }

    async fn do_bind(&self, request: &BindRequest) -> Result<Record> {
        self.bind_now(request)
    }

    async fn do_fetch(&self, aor: &Aor) -> Result<Option<Record>> {
        let key = aor.key();
        let record = self.records.get(&key).map(|entry| entry.value().clone());
        debug!("internal fetch {}: found={}", key, record.is_some());
        Ok(record)
    }

    async fn do_clear(&self, aor: &Aor) -> Result<()> {
        let key = aor.key();
        self.records.remove(&key);
        debug!("internal clear {}", key);
        Ok(())
    }

    async fn sweep_expired(&self, now: i64) -> Result<usize> {
        Ok(self.sweep_now(now))
    }
}
