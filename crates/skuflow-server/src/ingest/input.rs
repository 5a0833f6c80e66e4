//! Input resolution
//!
//! A job carries an opaque `input_ref`. An [`InputSource`] turns it into a
//! byte stream; the driver may open the same reference more than once.

use async_trait::async_trait;
use skuflow_common::SkuflowError;
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Readable input stream
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Sub-directory of the media root that receives uploads
pub const UPLOAD_DIR: &str = "uploads";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input {0} not found")]
    NotFound(String),

    #[error("Failed to open input: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves input references to byte streams
#[async_trait]
pub trait InputSource: Send + Sync {
    async fn open(&self, input_ref: &str) -> Result<InputStream, InputError>;
}

/// Files stored below a root directory, referenced by relative path
#[derive(Debug, Clone)]
pub struct MediaRoot {
    root: PathBuf,
}

impl MediaRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of `input_ref`. References that are absolute or
    /// climb out of the root are rejected.
    pub fn resolve(&self, input_ref: &str) -> skuflow_common::Result<PathBuf> {
        let relative = Path::new(input_ref);
        let contained = !input_ref.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if !contained {
            return Err(SkuflowError::InvalidReference(input_ref.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Write an uploaded file to `uploads/<uuid hex>_<name>` and return its
    /// reference
    pub async fn store_upload(&self, file_name: &str, bytes: &[u8]) -> skuflow_common::Result<String> {
        let input_ref = format!(
            "{UPLOAD_DIR}/{}_{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(file_name)
        );
        let path = self.resolve(&input_ref)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;

        debug!(input_ref = %input_ref, bytes = bytes.len(), "Stored upload");
        Ok(input_ref)
    }
}

#[async_trait]
impl InputSource for MediaRoot {
    async fn open(&self, input_ref: &str) -> Result<InputStream, InputError> {
        let path = self
            .resolve(input_ref)
            .map_err(|_| InputError::NotFound(input_ref.to_string()))?;

        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(InputError::NotFound(input_ref.to_string()))
            },
            Err(e) => Err(InputError::Io(e)),
        }
    }
}

/// Inputs held in memory, keyed by reference
#[derive(Debug, Clone, Default)]
pub struct InMemoryInput {
    files: Arc<HashMap<String, Vec<u8>>>,
}

impl InMemoryInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, input_ref: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.files).insert(input_ref.into(), content.into());
        self
    }
}

#[async_trait]
impl InputSource for InMemoryInput {
    async fn open(&self, input_ref: &str) -> Result<InputStream, InputError> {
        let content = self
            .files
            .get(input_ref)
            .cloned()
            .ok_or_else(|| InputError::NotFound(input_ref.to_string()))?;
        Ok(Box::new(std::io::Cursor::new(content)))
    }
}

/// Keep the last path segment and replace anything outside `[A-Za-z0-9._-]`
fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim_start_matches('.');

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "upload.csv".to_string()
    } else {
        cleaned
    }
}
