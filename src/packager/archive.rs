use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{ArchiveFile, PackageError, PackageOutput, PackageTarget, StagedPackage, StagedEntry};
use crate::models::Parameters;

/// Zip archive with entries relative to the package root
pub struct ZipTarget;

/// Gzip-compressed tarball with entries relative to the package root
pub struct TgzTarget;

/// ISO 9660 image built by an external `mkisofs`
pub struct IsoTarget {
    program: String,
}

impl Default for IsoTarget {
    fn default() -> Self {
        Self {
            program: "mkisofs".to_string(),
        }
    }
}

impl IsoTarget {
    #[cfg(test)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl PackageTarget for ZipTarget {
    async fn package(
        &self,
        staged: &StagedPackage,
        _parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let dest = archive_path(staged, "zip");
        let entries = staged.entries()?;
        let out = dest.clone();
        blocking(move || write_zip(&out, &entries)).await?;
        Ok(archive_output(staged, dest, "zip", "application/zip"))
    }
}

#[async_trait]
impl PackageTarget for TgzTarget {
    async fn package(
        &self,
        staged: &StagedPackage,
        _parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let dest = archive_path(staged, "tgz");
        let entries = staged.entries()?;
        let out = dest.clone();
        blocking(move || write_tgz(&out, &entries)).await?;
        Ok(archive_output(staged, dest, "tgz", "application/gzip"))
    }
}

#[async_trait]
impl PackageTarget for IsoTarget {
    async fn package(
        &self,
        staged: &StagedPackage,
        _parameters: &Parameters,
    ) -> Result<PackageOutput, PackageError> {
        let dest = archive_path(staged, "iso");
        let output = Command::new(&self.program)
            .args(["-J", "-R", "-v", "-V", "bootstrap", "-A", "bootstrap", "-ldots", "-l"])
            .args(["-allow-lowercase", "-allow-multidot", "-o"])
            .arg(&dest)
            .arg(&staged.root)
            .output()
            .await
            .map_err(|e| PackageError::Archive(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!("{} failed for {}: {}", self.program, staged.name, stderr.trim());
            return Err(PackageError::Archive(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        Ok(archive_output(staged, dest, "iso", "application/x-iso9660-image"))
    }
}

fn archive_path(staged: &StagedPackage, extension: &str) -> PathBuf {
    staged.work_dir.join(format!("{}.{}", staged.name, extension))
}

fn archive_output(staged: &StagedPackage, path: PathBuf, extension: &str, mime: &'static str) -> PackageOutput {
    tracing::info!("Created {}", path.display());
    PackageOutput::Archive(ArchiveFile {
        path,
        file_name: format!("{}.{}", staged.name, extension),
        mime,
        work_dir: staged.work_dir.clone(),
    })
}

/// Run archive I/O off the async runtime
async fn blocking<F>(job: F) -> Result<(), PackageError>
where
    F: FnOnce() -> Result<(), PackageError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| PackageError::Archive(format!("archive task panicked: {}", e)))?
}

fn write_zip(dest: &Path, entries: &[StagedEntry]) -> Result<(), PackageError> {
    let zip_error = |e: zip::result::ZipError| PackageError::Archive(e.to_string());
    let mut zip = zip::ZipWriter::new(File::create(dest)?);
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        if entry.is_dir {
            zip.add_directory(format!("{}/", entry.relative), options)
                .map_err(zip_error)?;
        } else {
            zip.start_file(entry.relative.as_str(), options)
                .map_err(zip_error)?;
            let mut source = File::open(&entry.path)?;
            io::copy(&mut source, &mut zip)?;
        }
    }
    zip.finish().map_err(zip_error)?;
    Ok(())
}

fn write_tgz(dest: &Path, entries: &[StagedEntry]) -> Result<(), PackageError> {
    let encoder = GzEncoder::new(File::create(dest)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        if entry.is_dir {
            builder.append_dir(&entry.relative, &entry.path)?;
        } else {
            builder.append_path_with_name(&entry.path, &entry.relative)?;
        }
    }
    builder.into_inner()?.finish()?;
    Ok(())
}
