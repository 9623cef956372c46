/// 远程键值存储能力
///
/// 核心不实现任何具体的存储协议，只通过以下两个 trait 访问远程存储：
/// - `SyncKvStore`: 阻塞式调用，由后端放到阻塞线程池执行
/// - `AsyncKvStore`: 异步调用，由外部事件循环驱动完成
///
/// `MemoryKvStore` 同时实现两者，用于测试和演示。
use crate::error::{RegistrarError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// 阻塞式键值存储
pub trait SyncKvStore: Send + Sync {
    /// 读取键，不存在时返回 None
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入键，`ttl_secs` 秒后由存储自行删除
    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    /// 删除键
    fn del(&self, key: &str) -> Result<()>;
}

/// 异步键值存储
#[async_trait]
pub trait AsyncKvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn del(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// 进程内键值存储
///
/// 支持 TTL，并可切换为失败模式以模拟存储不可达。
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, StoredValue>,
    unavailable: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 切换不可达模式
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 直接写入原始值（不经过记录序列化）
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(u32::MAX as u64),
            },
        );
    }

    /// 当前未过期的键数
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistrarError::backend("store unreachable"));
        }
        Ok(())
    }

    /// 仅当键在 `now` 时仍是过期值才删除，不影响期间被重新写入的值
    fn evict_if_expired(&self, key: &str, now: Instant) -> bool {
        let evicted = self
            .entries
            .remove_if(key, |_, stored| stored.expires_at <= now)
            .is_some();
        if evicted {
            debug!("key {} expired in memory store", key);
        }
        evicted
    }

    fn get_inner(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.evict_if_expired(key, now);
        }
        Ok(None)
    }

    fn set_inner(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check_available()?;
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    fn del_inner(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries.remove(key);
        Ok(())
    }
}

impl SyncKvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_inner(key)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.set_inner(key, value, ttl_secs)
    }

    fn del(&self, key: &str) -> Result<()> {
        self.del_inner(key)
    }
}

#[async_trait]
impl AsyncKvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        tokio::task::yield_now().await;
        self.get_inner(key)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        tokio::task::yield_now().await;
        self.set_inner(key, value, ttl_secs)
    }

    async fn del(&self, key: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.del_inner(key)
    }
}
