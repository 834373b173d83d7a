use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use application::{RepositoryError, StoreRepository};
use async_trait::async_trait;
use domain::Store;
use tokio::fs;

/// 把整个存储文档保存为单个 JSON 文件。
///
/// 开启 `atomic_writes` 时先写入同目录下的 `<文件名>.tmp`，再重命名覆盖，
/// 进程中途崩溃不会留下半个文档。
#[derive(Debug, Clone)]
pub struct JsonFileStoreRepository {
    path: PathBuf,
    atomic_writes: bool,
}

impl JsonFileStoreRepository {
    pub fn new(path: impl Into<PathBuf>, atomic_writes: bool) -> Self {
        Self {
            path: path.into(),
            atomic_writes,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("store"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn ensure_parent(&self) -> Result<(), RepositoryError> {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StoreRepository for JsonFileStoreRepository {
    async fn load(&self) -> Result<Store, RepositoryError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "存储文件不存在，使用空存储");
                return Ok(Store::new());
            }
            Err(err) => return Err(err.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!(path = %self.path.display(), "存储文件为空，使用空存储");
            return Ok(Store::new());
        }

        let store = serde_json::from_slice(&bytes)?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "存储文件已读取");
        Ok(store)
    }

    async fn flush(&self, store: &Store) -> Result<(), RepositoryError> {
        let document = serde_json::to_vec_pretty(store)?;
        self.ensure_parent().await?;

        if self.atomic_writes {
            let temp_path = self.temp_path();
            fs::write(&temp_path, &document).await?;
            fs::rename(&temp_path, &self.path).await?;
        } else {
            fs::write(&self.path, &document).await?;
        }

        tracing::trace!(path = %self.path.display(), bytes = document.len(), "存储已刷写");
        Ok(())
    }
}
