//! Packaging: stage a Base Configuration on disk and turn it into an archive
//! or an upload to cloud storage.

mod archive;
mod azure;
pub mod content;
mod gcp;
mod s3;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

use crate::cache::ArtifactCache;
use crate::models::*;

pub use archive::{IsoTarget, TgzTarget, ZipTarget};
pub use azure::AzureTarget;
pub use gcp::GcpTarget;
pub use s3::S3Target;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// The artifact expired or was evicted before it could be staged
    #[error("artifact {0} is no longer available in the cache")]
    MissingArtifact(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not build archive: {0}")]
    Archive(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

/// A staged package tree on disk
#[derive(Debug, Clone)]
pub struct StagedPackage {
    /// Per-build working directory, removed once the package is delivered
    pub work_dir: PathBuf,
    /// `<work_dir>/<name>`: the package root
    pub root: PathBuf,
    pub name: String,
}

/// One entry below a staged package root
#[derive(Debug, Clone, PartialEq)]
pub struct StagedEntry {
    /// Path relative to the package root, `/`-separated
    pub relative: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

impl StagedPackage {
    /// Every directory and file below the root, parents before children
    pub fn entries(&self) -> Result<Vec<StagedEntry>, PackageError> {
        let mut entries = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| PackageError::Archive(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| PackageError::Archive(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            entries.push(StagedEntry {
                relative,
                path: entry.path().to_path_buf(),
                is_dir: entry.file_type().is_dir(),
            });
        }
        Ok(entries)
    }
}

/// Archive file produced by a local target
#[derive(Debug)]
pub struct ArchiveFile {
    pub path: PathBuf,
    pub file_name: String,
    pub mime: &'static str,
    work_dir: PathBuf,
}

impl ArchiveFile {
    /// Open the archive for streaming and remove the working directory.
    /// The open handle keeps the data readable after the unlink.
    pub async fn open(self) -> Result<(fs::File, u64), PackageError> {
        let file = fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        remove_work_dir(&self.work_dir).await;
        Ok((file, len))
    }

    /// Copy the archive to `dest` and remove the working directory
    pub async fn persist(self, dest: &Path) -> Result<u64, PackageError> {
        let copied = fs::copy(&self.path, dest).await;
        remove_work_dir(&self.work_dir).await;
        Ok(copied?)
    }
}

#[derive(Debug)]
pub enum PackageOutput {
    Archive(ArchiveFile),
    /// Human-readable location of the uploaded package
    Uploaded(String),
}

/// A packaging strategy for one `ArchiveType`
#[async_trait]
pub trait PackageTarget: Send + Sync {
    /// Request parameters that must be present before anything is staged
    fn required_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    async fn package(
        &self,
        staged: &StagedPackage,
        parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError>;
}

/// Registry of packaging strategies keyed by archive type
#[derive(Clone)]
pub struct Packager {
    cache: ArtifactCache,
    archive_dir: PathBuf,
    content_dir: PathBuf,
    targets: HashMap<ArchiveType, Arc<dyn PackageTarget>>,
}

impl Packager {
    /// Packager with every built-in target registered
    pub fn new(cache: ArtifactCache, archive_dir: impl Into<PathBuf>, content_dir: impl Into<PathBuf>) -> Self {
        let client = reqwest::Client::new();
        let mut packager = Self {
            cache,
            archive_dir: archive_dir.into(),
            content_dir: content_dir.into(),
            targets: HashMap::new(),
        };
        packager.register(ArchiveType::Zip, Arc::new(ZipTarget));
        packager.register(ArchiveType::Tgz, Arc::new(TgzTarget));
        packager.register(ArchiveType::Iso, Arc::new(IsoTarget::default()));
        packager.register(ArchiveType::S3, Arc::new(S3Target::new(client.clone())));
        packager.register(ArchiveType::Azure, Arc::new(AzureTarget::new(client.clone())));
        packager.register(ArchiveType::Gcp, Arc::new(GcpTarget::new(client)));
        packager
    }

    pub fn register(&mut self, archive_type: ArchiveType, target: Arc<dyn PackageTarget>) {
        self.targets.insert(archive_type, target);
    }

    fn target(&self, archive_type: ArchiveType) -> Result<&Arc<dyn PackageTarget>, PackageError> {
        self.targets.get(&archive_type).ok_or_else(|| {
            PackageError::Archive(format!("no packager registered for {}", archive_type))
        })
    }

    /// Credential names the target needs that `parameters` does not carry
    pub fn missing_credentials(
        &self,
        archive_type: ArchiveType,
        parameters: &Parameters,
    ) -> Result<Vec<String>, PackageError> {
        Ok(self
            .target(archive_type)?
            .required_parameters()
            .iter()
            .filter(|name| !parameters.is_populated(name))
            .map(|name| name.to_string())
            .collect())
    }

    /// Stage `base` under a fresh work directory and package it
    pub async fn package(
        &self,
        archive_type: ArchiveType,
        name: &str,
        base: &BaseConfig,
        parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let target = self.target(archive_type)?.clone();

        let missing = self.missing_credentials(archive_type, parameters)?;
        if !missing.is_empty() {
            return Err(PackageError::MissingCredentials(format!(
                "{} requires {}",
                archive_type,
                missing.join(", ")
            )));
        }

        let staged = self.stage(name, base).await;
        let staged = match staged {
            Ok(staged) => staged,
            Err((work_dir, e)) => {
                remove_work_dir(&work_dir).await;
                return Err(e);
            }
        };

        tracing::info!("Packaging {} as {}", staged.name, archive_type);
        let result = target.package(&staged, parameters).await;

        match &result {
            Ok(PackageOutput::Archive(_)) => {
                // archive lives in the work dir until it is opened
                if let Err(e) = fs::remove_dir_all(&staged.root).await {
                    tracing::warn!("Could not remove staging tree {}: {}", staged.root.display(), e);
                }
            }
            Ok(PackageOutput::Uploaded(_)) | Err(_) => remove_work_dir(&staged.work_dir).await,
        }
        result
    }

    /// Write the skeleton, every cached artifact and seeded content
    async fn stage(
        &self,
        name: &str,
        base: &BaseConfig,
    ) -> Result<StagedPackage, (PathBuf, PackageError)> {
        let work_dir = self.archive_dir.join(uuid::Uuid::new_v4().to_string());
        let root = work_dir.join(name);
        let fail = |e: PackageError| (work_dir.clone(), e);

        for dir in archive_path::SKELETON {
            fs::create_dir_all(root.join(dir))
                .await
                .map_err(|e| fail(e.into()))?;
        }

        for (file_name, entry) in base.iter() {
            let contents = self
                .cache
                .get(&entry.key)
                .await
                .ok_or_else(|| fail(PackageError::MissingArtifact(file_name.clone())))?;
            let dir = root.join(&entry.archive_path);
            fs::create_dir_all(&dir).await.map_err(|e| fail(e.into()))?;
            fs::write(dir.join(file_name), contents)
                .await
                .map_err(|e| fail(e.into()))?;
        }

        let content_dir = self.content_dir.clone();
        let dest = root.join(archive_path::CONTENT);
        let seeded = tokio::task::spawn_blocking(move || content::seed(&content_dir, &dest))
            .await
            .map_err(|e| fail(PackageError::Archive(format!("content seeding panicked: {}", e))))?
            .map_err(|e| fail(e.into()))?;
        if seeded > 0 {
            tracing::debug!("Seeded {} content updates into {}", seeded, name);
        }

        Ok(StagedPackage {
            work_dir: work_dir.clone(),
            root,
            name: name.to_string(),
        })
    }
}

async fn remove_work_dir(work_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Could not remove work directory {}: {}", work_dir.display(), e);
        }
    }
}

/// Require a populated text parameter (credential)
pub(crate) fn credential(parameters: &Parameters, name: &str) -> Result<String, PackageError> {
    parameters
        .text(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PackageError::MissingCredentials(name.to_string()))
}

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PackageError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| PackageError::Upload(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Bucket, share and container names must be lowercase
pub(crate) fn storage_name(package_name: &str) -> String {
    package_name.to_lowercase()
}

/// Accept a successful response. `tolerated` lists conflict error codes
/// that mean "already exists" for idempotent create calls.
pub(crate) async fn check_response(
    response: reqwest::Response,
    action: &str,
    tolerated: &[&str],
) -> Result<(), PackageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::CONFLICT && tolerated.iter().any(|code| body.contains(code)) {
        tracing::debug!("{}: already exists", action);
        return Ok(());
    }
    tracing::error!("{} failed with {}: {}", action, status, body);
    Err(PackageError::Upload(format!("{} failed with {}", action, status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn cached_base(cache: &ArtifactCache) -> BaseConfig {
        let mut base = BaseConfig::new();
        let key = cache.set("hostname=fw1\n").await;
        base.insert(
            logical_file::INIT_CFG,
            ArtifactEntry {
                key,
                archive_path: "config".to_string(),
                url: String::new(),
            },
        );
        base
    }

    #[tokio::test]
    async fn test_stage_writes_skeleton_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(Duration::from_secs(300), 16);
        let packager = Packager::new(cache.clone(), dir.path(), dir.path().join("no-content"));
        let base = cached_base(&cache).await;

        let staged = packager.stage("fw1", &base).await.unwrap();
        assert!(staged.root.ends_with("fw1"));
        assert_eq!(staged.root.parent().unwrap(), staged.work_dir.as_path());

        let relative: Vec<String> = staged
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.relative)
            .collect();
        assert_eq!(
            relative,
            vec!["config", "config/init-cfg.txt", "content", "license", "software"]
        );
        let text = std::fs::read_to_string(staged.root.join("config/init-cfg.txt")).unwrap();
        assert_eq!(text, "hostname=fw1\n");
    }

    #[tokio::test]
    async fn test_expired_artifact_fails_packaging() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(Duration::from_secs(300), 16);
        let packager = Packager::new(cache, dir.path(), dir.path().join("no-content"));

        let mut base = BaseConfig::new();
        base.insert(
            logical_file::INIT_CFG,
            ArtifactEntry {
                key: "gone".to_string(),
                archive_path: "config".to_string(),
                url: String::new(),
            },
        );

        let err = packager
            .package(ArchiveType::Zip, "fw1", &base, &Parameters::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PackageError::MissingArtifact(name) if name == "init-cfg.txt"));
        // work directory cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_staging() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(Duration::from_secs(300), 16);
        let packager = Packager::new(cache.clone(), dir.path(), dir.path().join("no-content"));
        let base = cached_base(&cache).await;

        let mut params = Parameters::new();
        params.insert("aws_key", "AKID");
        let err = packager
            .package(ArchiveType::S3, "fw1", &base, &params)
            .await
            .unwrap_err();
        match err {
            PackageError::MissingCredentials(msg) => {
                assert!(msg.contains("aws_location"));
                assert!(msg.contains("aws_secret"));
                assert!(!msg.contains("aws_key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_zip_package_leaves_only_archive_until_opened() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(Duration::from_secs(300), 16);
        let packager = Packager::new(cache.clone(), dir.path(), dir.path().join("no-content"));
        let base = cached_base(&cache).await;

        let output = packager
            .package(ArchiveType::Zip, "fw1", &base, &Parameters::new())
            .await
            .unwrap();
        let archive = match output {
            PackageOutput::Archive(archive) => archive,
            other => panic!("unexpected output: {:?}", other),
        };
        assert_eq!(archive.file_name, "fw1.zip");
        assert_eq!(archive.mime, "application/zip");
        assert!(archive.path.exists());

        let (_file, len) = archive.open().await.unwrap();
        assert!(len > 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
