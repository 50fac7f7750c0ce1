use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::{artifact::ArtifactId, Error, Result};

/// Where artifact bytes live. Locators are opaque to everything but the store
/// that issued them.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: &[u8], artifact_id: ArtifactId, filename: &str)
        -> Result<String>;

    async fn read(&self, locator: &str) -> Result<Vec<u8>>;
}

/// Files under a root directory, one subdirectory per artifact.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, locator: &str) -> Result<PathBuf> {
        let relative = Path::new(locator);
        let safe = !locator.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Locator(locator.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        bytes: &[u8],
        artifact_id: ArtifactId,
        filename: &str,
    ) -> Result<String> {
        let locator = format!("a_{artifact_id}/{}", safe_filename(filename));
        let path = self.resolve(&locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(locator)
    }

    async fn read(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.resolve(locator)?;
        Ok(tokio::fs::read(path).await?)
    }
}

/// Keep `[A-Za-z0-9._-]`, collapse everything else to `_`, and never return
/// an empty or dot-only name.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
