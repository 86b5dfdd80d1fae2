//! Sharded cipher file storage
//!
//! Stores encrypted payloads keyed by identifier. Files are spread over
//! one directory level taken from the first two characters of the id,
//! which bounds directory fan-out.
//!
//! Example: note "3fa85f64-..." is stored at "notes/3f/3fa85f64-....enc"
//!
//! Paths handed to the metadata store are relative to the data directory
//! and always use `/`; `\` from older Windows rows is accepted on read.

use crate::config::CIPHER_EXTENSION;
use crate::error::Result;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Cipher files of one namespace (`notes` or `history`) under the data directory
#[derive(Clone)]
pub struct CipherStore {
    data_dir: PathBuf,
    namespace: &'static str,
}

impl CipherStore {
    pub fn new(data_dir: PathBuf, namespace: &'static str) -> Self {
        Self {
            data_dir,
            namespace,
        }
    }

    /// Create the namespace directory if needed
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(self.root()).await?;
        tracing::debug!("Cipher store initialized at: {:?}", self.root());
        Ok(())
    }

    /// Sharded data-dir-relative path for an id: `<namespace>/<id[0..2]>/<id>.enc`
    pub fn relative_path(&self, id: &str) -> String {
        let prefix = id.get(..2).unwrap_or(id);
        format!("{}/{}/{}.{}", self.namespace, prefix, id, CIPHER_EXTENSION)
    }

    /// Unsharded path written by earlier versions: `<namespace>/<id>.enc`
    pub fn legacy_relative_path(&self, id: &str) -> String {
        format!("{}/{}.{}", self.namespace, id, CIPHER_EXTENSION)
    }

    /// Whether a stored path already follows the sharded layout for `id`
    pub fn is_sharded(&self, id: &str, relative: &str) -> bool {
        relative.replace('\\', "/") == self.relative_path(id)
    }

    /// Resolve a stored relative path against the data directory.
    ///
    /// Only normal components are kept, so a row can never point outside
    /// the data directory.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split(['/', '\\'])
            .filter(|part| {
                matches!(Path::new(part).components().next(), Some(Component::Normal(_)))
            })
            .fold(self.data_dir.clone(), |path, part| path.join(part))
    }

    /// Write data atomically over the target
    pub async fn write(&self, relative: &str, data: &[u8]) -> Result<()> {
        write_atomic(&self.resolve(relative), data).await?;
        tracing::debug!("Wrote cipher file: {} ({} bytes)", relative, data.len());
        Ok(())
    }

    /// Read a cipher file
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve(relative)).await?;
        tracing::debug!("Read cipher file: {} ({} bytes)", relative, data.len());
        Ok(data)
    }

    /// Check if a cipher file exists
    pub async fn exists(&self, relative: &str) -> bool {
        fs::try_exists(self.resolve(relative)).await.unwrap_or(false)
    }

    /// Delete a cipher file; a missing file is not an error
    pub async fn delete(&self, relative: &str) -> Result<()> {
        match fs::remove_file(self.resolve(relative)).await {
            Ok(()) => {
                tracing::debug!("Deleted cipher file: {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Namespace directory
    pub fn root(&self) -> PathBuf {
        self.data_dir.join(self.namespace)
    }
}

/// Write `data` to `<path>.tmp`, fsync, then rename over `path`.
/// Readers see either the old file or the complete new one.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(())
}

/// Recursively collect every `*.enc` file under `dir`, flat or sharded.
/// A missing directory yields an empty list.
pub async fn scan_cipher_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    scan_directory(dir, &mut files).await?;
    files.sort();
    Ok(files)
}

fn scan_directory<'a>(
    dir: &'a Path,
    files: &'a mut Vec<PathBuf>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if !fs::try_exists(dir).await.unwrap_or(false) {
            return Ok(());
        }

        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                scan_directory(&path, files).await?;
            } else if file_type.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(CIPHER_EXTENSION)
            {
                files.push(path);
            }
        }

        Ok(())
    })
}
