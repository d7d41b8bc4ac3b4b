use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectStore(object_store::Error::NotFound { .. })
        )
    }
}

/// Blob store holding backup artifacts, addressed by backup filename.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Stream the artifact into `dest`, returning the number of bytes written.
    async fn download(&self, filename: &str, dest: &Path) -> Result<u64, StorageError>;

    async fn delete(&self, filename: &str) -> Result<(), StorageError>;
}

/// [`BackupStore`] over any `object_store` backend. Artifacts live under
/// `{prefix}/{filename}`.
#[derive(Clone, Debug)]
pub struct ObjectBackupStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
}

impl ObjectBackupStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(create_object_store(config)?, &config.prefix))
    }

    /// Object key for a backup filename.
    pub fn key(&self, filename: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(filename)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, filename))
        }
    }

    /// Size of the artifact, or `None` if it does not exist.
    pub async fn head(&self, filename: &str) -> Result<Option<u64>, StorageError> {
        match self.store.head(&self.key(filename)).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store an artifact. Backup creation is handled elsewhere; this is used
    /// for seeding stores and by tooling.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.store.put(&self.key(filename), bytes.into()).await?;
        Ok(())
    }

    /// Cheap reachability probe: lists at most one object under the prefix.
    pub async fn probe(&self) -> Result<(), StorageError> {
        let prefix = if self.prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::from(self.prefix.as_str()))
        };
        let mut listing = self.store.list(prefix.as_ref());
        if let Some(entry) = listing.next().await {
            entry?;
        }
        Ok(())
    }
}

#[async_trait]
impl BackupStore for ObjectBackupStore {
    async fn download(&self, filename: &str, dest: &Path) -> Result<u64, StorageError> {
        let key = self.key(filename);
        tracing::debug!(key = %key, dest = %dest.display(), "Downloading backup artifact");

        let result = self.store.get(&key).await?;
        let mut stream = result.into_stream();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(key = %key, bytes = written, "Download complete");
        Ok(written)
    }

    async fn delete(&self, filename: &str) -> Result<(), StorageError> {
        let key = self.key(filename);
        match self.store.delete(&key).await.map_err(StorageError::from) {
            Ok(()) => tracing::debug!(key = %key, "Deleted backup artifact"),
            // S3 deletes are idempotent; the local backend reports a missing key.
            Err(e) if e.is_not_found() => {
                tracing::debug!(key = %key, "Backup artifact already absent")
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Create an object store from storage configuration.
///
/// An explicit `url` wins (`memory://`, `file:///path`, `s3://...`); otherwise
/// an S3 client is built from bucket, region, keys and optional endpoint.
pub fn create_object_store(storage_config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(url) = &storage_config.url {
        return create_object_store_from_dsn(url);
    }
    let builder = create_s3_builder_from_config(storage_config)?;
    Ok(Arc::new(builder.build()?))
}

/// Create an object store from a DSN string
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url =
        Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))?;

    match url.scheme() {
        "file" => {
            let path = url.path();
            if path.is_empty() || path == "/" {
                return Err(anyhow::anyhow!(
                    "File DSN must specify a path: file:///path/to/storage"
                ));
            }
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = create_s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(anyhow::anyhow!(
            "Unsupported storage scheme: {}. Supported: file, memory, s3",
            scheme
        )),
    }
}

/// Build an S3 client from the deployment's bucket/credential settings.
/// A custom endpoint (R2, MinIO) switches to path-style requests.
pub fn create_s3_builder_from_config(config: &StorageConfig) -> Result<AmazonS3Builder> {
    if config.bucket.is_empty() {
        return Err(anyhow::anyhow!(
            "S3 bucket is not configured (set AWS_S3_BUCKET or AWS_BACKUP_BUCKET)"
        ));
    }

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(&config.bucket)
        .with_region(&config.region)
        .with_access_key_id(&config.access_key_id)
        .with_secret_access_key(&config.secret_access_key);

    if let Some(endpoint) = config.endpoint.as_deref().filter(|e| !e.is_empty()) {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"))
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = dsn.path().trim_start_matches('/');

    if bucket.is_empty() {
        return Err(anyhow::anyhow!(
            "S3 DSN must specify a bucket: s3://host/bucket"
        ));
    }

    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_region("auto");

    let access_key = dsn.username();
    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(dsn.password().unwrap_or(""));
    }

    // Anything that isn't AWS proper needs an explicit, path-style endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    Ok(builder)
}
