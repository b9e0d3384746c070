//! Model artifact sources
//!
//! A source serves the manifest and the weight shards it references. Shard
//! paths are resolved relative to the manifest location.

use async_trait::async_trait;
use boardscan_core::{Error, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Where the model artifact lives
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable location of the manifest
    fn location(&self) -> String;

    /// Cheap existence check of the manifest; fetches no weights
    async fn probe(&self) -> Result<()>;

    /// Fetch the manifest body
    async fn fetch_manifest(&self) -> Result<Bytes>;

    /// Fetch one weight shard by its manifest-relative path
    async fn fetch_shard(&self, path: &str) -> Result<Bytes>;
}

/// Artifact served over plain HTTP GET
pub struct HttpSource {
    client: reqwest::Client,
    manifest_url: Url,
}

impl HttpSource {
    /// `base_url` is the site root, `manifest` the path of `model.json` below it
    pub fn new(base_url: &str, manifest: &str, timeout: Option<Duration>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid model base URL '{}': {}", base_url, e)))?;
        let manifest_url = base
            .join(manifest)
            .map_err(|e| Error::config(format!("Invalid manifest path '{}': {}", manifest, e)))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            manifest_url,
        })
    }

    pub fn manifest_url(&self) -> &Url {
        &self.manifest_url
    }

    /// URL of a shard, relative to the manifest
    pub fn shard_url(&self, path: &str) -> Result<Url> {
        self.manifest_url
            .join(path)
            .map_err(|e| Error::model_unavailable(format!("Invalid shard path '{}': {}", path, e)))
    }

    async fn get(&self, url: Url) -> Result<Bytes> {
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::model_unavailable(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::model_unavailable(format!("GET {} returned {}", url, status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::model_unavailable(format!("Failed to read body of {}: {}", url, e)))
    }
}

#[async_trait]
impl ArtifactSource for HttpSource {
    fn location(&self) -> String {
        self.manifest_url.to_string()
    }

    async fn probe(&self) -> Result<()> {
        let url = &self.manifest_url;
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| Error::model_unavailable(format!("HEAD {} failed: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::model_unavailable(format!("HEAD {} returned {}", url, status)))
        }
    }

    async fn fetch_manifest(&self) -> Result<Bytes> {
        self.get(self.manifest_url.clone()).await
    }

    async fn fetch_shard(&self, path: &str) -> Result<Bytes> {
        let url = self.shard_url(path)?;
        self.get(url).await
    }
}

/// Artifact on the local filesystem
pub struct LocalSource {
    manifest_path: PathBuf,
}

impl LocalSource {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn shard_path(&self, path: &str) -> PathBuf {
        match self.manifest_path.parent() {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        }
    }

    async fn read(path: &Path) -> Result<Bytes> {
        tracing::debug!("Reading {}", path.display());
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| Error::model_unavailable(format!("Failed to read {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl ArtifactSource for LocalSource {
    fn location(&self) -> String {
        self.manifest_path.display().to_string()
    }

    async fn probe(&self) -> Result<()> {
        match tokio::fs::metadata(&self.manifest_path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(Error::model_unavailable(format!(
                "Model manifest {} is not a file",
                self.manifest_path.display()
            ))),
            Err(e) => Err(Error::model_unavailable(format!(
                "Model manifest {} not found: {}",
                self.manifest_path.display(),
                e
            ))),
        }
    }

    async fn fetch_manifest(&self) -> Result<Bytes> {
        Self::read(&self.manifest_path).await
    }

    async fn fetch_shard(&self, path: &str) -> Result<Bytes> {
        Self::read(&self.shard_path(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_urls_resolve_relative_to_manifest() {
        let source = HttpSource::new("http://localhost:8080/", "model/model.json", None).unwrap();
        assert_eq!(source.location(), "http://localhost:8080/model/model.json");
        assert_eq!(
            source.shard_url("group1-shard1of2.bin").unwrap().as_str(),
            "http://localhost:8080/model/group1-shard1of2.bin"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpSource::new("not a url", "model/model.json", None).err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_local_source_reads_shards_next_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("group1-shard1of1.bin"), [1u8, 2, 3]).unwrap();

        let source = LocalSource::new(dir.path().join("model.json"));
        source.probe().await.unwrap();
        assert_eq!(source.fetch_manifest().await.unwrap(), Bytes::from_static(b"{}"));
        assert_eq!(
            source.fetch_shard("group1-shard1of1.bin").await.unwrap().as_ref(),
            &[1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_local_source_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new(dir.path().join("model.json"));

        let err = source.probe().await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
        assert!(source.fetch_manifest().await.is_err());

        let dir_as_manifest = LocalSource::new(dir.path());
        assert!(dir_as_manifest.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_http_unreachable_is_model_unavailable() {
        // Port 9 (discard) on loopback is never served in test environments
        let source = HttpSource::new(
            "http://127.0.0.1:9/",
            "model/model.json",
            Some(Duration::from_secs(2)),
        )
        .unwrap();
        let err = source.probe().await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
        let err = source.fetch_manifest().await.unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }
}
