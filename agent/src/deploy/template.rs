//! Template lookup

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::TemplateError;
use crate::filesys::file::File;

/// Resolves a logical template name to its contents
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn find_template(&self, name: &str) -> Result<Vec<u8>, TemplateError>;
}

/// Templates stored on disk under a fixed application root
#[derive(Debug, Clone)]
pub struct FileTemplateSource {
    root: PathBuf,
}

impl FileTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let relative = Path::new(name);
        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.trim().is_empty() || escapes_root {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    async fn find_template(&self, name: &str) -> Result<Vec<u8>, TemplateError> {
        let file = File::new(self.resolve(name)?);
        debug!("Reading template {}", file.path().display());

        file.read_bytes()
            .await
            .map_err(|e| TemplateError::NotFound {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }
}
