//! Resolver for locators that are plain filesystem paths.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncSeekExt;

use super::mime::audio_mime_for_path;
use super::{FileLocator, LocatorError, LocatorResolver, LocatorStream};

/// Serves locators that name files on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsResolver;

impl FsResolver {
    /// Creates a filesystem resolver.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LocatorResolver for FsResolver {
    async fn content_length(&self, locator: &FileLocator) -> Result<Option<u64>, LocatorError> {
        let metadata = tokio::fs::metadata(locator.as_str())
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?;

        if !metadata.is_file() {
            return Err(LocatorError::NotFound {
                locator: locator.clone(),
            });
        }

        // Pipes and character devices report 0
        Ok(Some(metadata.len()).filter(|len| *len > 0))
    }

    async fn open(&self, locator: &FileLocator) -> Result<LocatorStream, LocatorError> {
        let file = tokio::fs::File::open(locator.as_str())
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?;
        Ok(Box::new(file))
    }

    async fn open_at(
        &self,
        locator: &FileLocator,
        offset: u64,
    ) -> Result<LocatorStream, LocatorError> {
        let mut file = tokio::fs::File::open(locator.as_str())
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?;
        if offset == 0 {
            return Ok(Box::new(file));
        }

        // Seeking past the end succeeds, so check the length first
        let len = file
            .metadata()
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?
            .len();
        if len < offset {
            return Err(LocatorError::ShortSkip {
                locator: locator.clone(),
                expected: offset,
                skipped: len,
            });
        }

        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?;
        Ok(Box::new(file))
    }

    fn mime_type(&self, locator: &FileLocator) -> Option<String> {
        audio_mime_for_path(Path::new(locator.as_str()))
    }
}
