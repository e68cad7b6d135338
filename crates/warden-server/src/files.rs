//! File store that writes uploads to a local directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::outbound::{FileStore, ImageTransform, Upload};

/// Stores files under `root/<folder>/` and serves them from
/// `public_url/<folder>/`. Image transforms are not applied.
pub struct LocalFileStore {
    root: PathBuf,
    public_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Path of a stored file, if `url` points into this store.
    fn path_for(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(&self.public_url)?.trim_start_matches('/');
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

fn sanitize(filename: &str) -> String {
    let clean: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        "upload".into()
    } else {
        clean.to_string()
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(
        &self,
        file: Upload,
        folder: &str,
        transform: ImageTransform,
    ) -> WardenResult<String> {
        let folder = sanitize(folder);
        let name = format!("{}-{}", Uuid::new_v4(), sanitize(&file.filename));
        let dir = self.root.join(&folder);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WardenError::Internal(format!("create {}: {e}", dir.display())))?;
        tokio::fs::write(dir.join(&name), &file.bytes)
            .await
            .map_err(|e| WardenError::Internal(format!("write {name}: {e}")))?;

        if transform != ImageTransform::None {
            debug!(?transform, "Local file store keeps images as uploaded");
        }
        Ok(format!("{}/{folder}/{name}", self.public_url))
    }

    async fn delete(&self, url: &str) -> WardenResult<()> {
        let Some(path) = self.path_for(url) else {
            warn!(url, "Refusing to delete a file outside the local store");
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(WardenError::Internal(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}
