//! Blob storage for uploaded files
//!
//! Uploads are written before the coordinator ever hears about them, so a
//! storage failure never touches relay state.

use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tokio::fs;
use tracing::debug;

use crate::error::BlobError;

/// Default upload size limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Where a stored blob can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub url: String,
    pub stored_name: String,
}

/// Opaque file store
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return where they can be fetched from
    fn store(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
    ) -> impl Future<Output = Result<StoredBlob, BlobError>> + Send;
}

/// Stores uploads as files in one directory
#[derive(Debug, Clone)]
pub struct DiskBlobStore {
    dir: PathBuf,
    url_prefix: String,
    max_bytes: usize,
}

impl DiskBlobStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>, max_bytes: usize) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
            max_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<millis>-<random>-<name>`, unique enough for concurrent uploads of the
    /// same file name
    fn stored_name(original_name: &str) -> Result<String, BlobError> {
        let name = sanitize_file_name(original_name);
        if name.is_empty() {
            return Err(BlobError::InvalidName);
        }
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
        Ok(format!("{}-{}-{}", Utc::now().timestamp_millis(), suffix, name))
    }
}

impl BlobStore for DiskBlobStore {
    fn store(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
    ) -> impl Future<Output = Result<StoredBlob, BlobError>> + Send {
        let prepared = if bytes.len() > self.max_bytes {
            Err(BlobError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            })
        } else {
            Self::stored_name(original_name)
        };
        let dir = self.dir.clone();
        let url_prefix = self.url_prefix.trim_end_matches('/').to_string();

        async move {
            let stored_name = prepared?;
            fs::create_dir_all(&dir).await?;
            fs::write(dir.join(&stored_name), &bytes).await?;
            debug!("Stored {} bytes as {}", bytes.len(), stored_name);

            Ok(StoredBlob {
                url: format!("{}/{}", url_prefix, stored_name),
                stored_name,
            })
        }
    }
}

/// Keep only the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    trimmed.to_string()
}
