use crate::error::{ZarrError, ZarrResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

// ---------------------------------------------------------------------------
// StorageBackend trait
// ---------------------------------------------------------------------------

/// Async byte-addressable key-value storage. Keys are `/`-separated strings.
///
/// Implementations can target local filesystem, S3, GCS, Azure, or in-memory
/// stores. An absent key is `Ok(None)` from `get`, never an error.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the contents at `key`.
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()>;

    /// Remove `key`; removing an absent key is not an error.
    async fn delete(&self, key: &str) -> ZarrResult<()>;

    /// All keys starting with `prefix`, in unspecified order.
    async fn list_prefix(&self, prefix: &str) -> ZarrResult<Vec<String>>;
}

/// Join a base path with a relative segment, skipping empty bases.
pub fn join_key(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{base}/{segment}")
    }
}

// ---------------------------------------------------------------------------
// MemoryBackend
// ---------------------------------------------------------------------------

/// In-memory backend, mainly for tests and scratch arrays.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        Ok(self.entries.read().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        self.entries.write().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// LocalBackend  (tokio::fs)
// ---------------------------------------------------------------------------

/// Local-filesystem backend using `tokio::fs`. Keys map to paths below the
/// root directory.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        let full = self.resolve(key);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ZarrError::Storage(format!(
                "Failed to read {}: {e}",
                full.display()
            ))),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        let full = self.resolve(key);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ZarrError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&full, &value)
            .await
            .map_err(|e| ZarrError::Storage(format!("Failed to write {}: {e}", full.display())))
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        let full = self.resolve(key);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ZarrError::Storage(format!(
                "Failed to delete {}: {e}",
                full.display()
            ))),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut reader = match tokio::fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ZarrError::Storage(format!(
                        "Failed to list {}: {e}",
                        dir.display()
                    )));
                }
            };
            while let Some(entry) = reader.next_entry().await.map_err(|e| {
                ZarrError::Storage(format!("Failed to read entry in {}: {e}", dir.display()))
            })? {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }
}

// ---------------------------------------------------------------------------
// ObjectStoreBackend  (wraps object_store crate)
// ---------------------------------------------------------------------------

/// Backend that wraps any [`object_store::ObjectStore`] implementation.
pub struct ObjectStoreBackend {
    store: Box<dyn object_store::ObjectStore>,
    prefix: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Box<dyn object_store::ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn full_path(&self, key: &str) -> object_store::path::Path {
        if self.prefix.is_empty() {
            object_store::path::Path::from(key)
        } else {
            object_store::path::Path::from(join_key(&self.prefix, key))
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, key: &str) -> ZarrResult<Option<Bytes>> {
        let location = self.full_path(key);
        match self.store.get(&location).await {
            Ok(result) => {
                let data = result.bytes().await.map_err(|e| {
                    ZarrError::Storage(format!("Failed to read bytes from {key}: {e}"))
                })?;
                Ok(Some(data))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(ZarrError::Storage(format!(
                "Object store error for {key}: {e}"
            ))),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> ZarrResult<()> {
        let location = self.full_path(key);
        self.store
            .put(&location, value.into())
            .await
            .map_err(|e| ZarrError::Storage(format!("Object store put error for {key}: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> ZarrResult<()> {
        let location = self.full_path(key);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(ZarrError::Storage(format!(
                "Object store delete error for {key}: {e}"
            ))),
        }
    }

    async fn list_prefix(&self, prefix: &str) -> ZarrResult<Vec<String>> {
        use futures::TryStreamExt;
        let location = self.full_path(prefix);
        let mut keys = Vec::new();
        let mut stream = self.store.list(Some(&location));
        while let Some(meta) = stream.try_next().await.map_err(|e| {
            ZarrError::Storage(format!("Object store list error for {prefix}: {e}"))
        })? {
            let full = meta.location.to_string();
            let key = match full.strip_prefix(&self.prefix) {
                Some(rest) => rest.trim_start_matches('/').to_string(),
                None => full,
            };
            keys.push(key);
        }
        Ok(keys)
    }
}
