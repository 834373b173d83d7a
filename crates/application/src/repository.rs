use async_trait::async_trait;
use domain::Store;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// 整个存储文档的持久化。
///
/// 没有增量写入：每次 `flush` 都覆盖全部持久化内容。
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// 读取持久化文档；不存在时返回空存储。
    async fn load(&self) -> Result<Store, RepositoryError>;

    /// 序列化并覆盖整个持久化文档。
    async fn flush(&self, store: &Store) -> Result<(), RepositoryError>;
}

/// 内存实现的存储仓库（用于测试）
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStoreRepository {
        document: Mutex<Option<Store>>,
        fail_writes: AtomicBool,
        flushes: AtomicUsize,
    }

    impl MemoryStoreRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// 以已有文档作为初始持久化内容。
        pub fn with_document(store: Store) -> Self {
            Self {
                document: Mutex::new(Some(store)),
                ..Self::default()
            }
        }

        /// 让后续写入全部失败，用于模拟持久化故障。
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        /// 成功写入的次数
        pub fn flush_count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }

        pub async fn snapshot(&self) -> Option<Store> {
            self.document.lock().await.clone()
        }
    }

    #[async_trait]
    impl StoreRepository for MemoryStoreRepository {
        async fn load(&self) -> Result<Store, RepositoryError> {
            Ok(self.document.lock().await.clone().unwrap_or_default())
        }

        async fn flush(&self, store: &Store) -> Result<(), RepositoryError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepositoryError::Unavailable("writes disabled".into()));
            }
            *self.document.lock().await = Some(store.clone());
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
