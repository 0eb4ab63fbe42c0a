//! File locators and the resolvers that turn them into bytes.
//!
//! A locator is whatever the host storage layer uses to name a file: a path,
//! a content URI, a database key. The bridge never interprets it; it only
//! hands it back to a [`LocatorResolver`] when a remote device asks for the
//! content.

pub mod filesystem;
pub mod mime;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
pub use filesystem::FsResolver;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Readable byte stream returned by a resolver.
pub type LocatorStream = Box<dyn AsyncRead + Send + Unpin>;

/// Opaque reference to a file in the host's storage layer.
///
/// Cloning is cheap; the registry and every in-flight request share the
/// same allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileLocator(Arc<str>);

impl FileLocator {
    /// Wraps a storage-layer reference.
    pub fn new(locator: impl Into<String>) -> Self {
        Self(Arc::from(locator.into()))
    }

    /// Returns the raw reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileLocator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FileLocator {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Access to the storage layer that owns the files behind locators.
///
/// Every call opens the resource afresh; implementations must not share read
/// positions between streams, since concurrent range requests against the
/// same locator each need their own cursor.
#[async_trait]
pub trait LocatorResolver: Send + Sync {
    /// Returns the total size of the resource in bytes.
    ///
    /// `None` means the storage layer cannot tell; the resource is then
    /// served without a length and without range support.
    ///
    /// # Errors
    ///
    /// - `LocatorError::NotFound` - The locator no longer names a resource
    /// - `LocatorError::Io` - The resource exists but could not be inspected
    async fn content_length(&self, locator: &FileLocator) -> Result<Option<u64>, LocatorError>;

    /// Opens a fresh read stream positioned at the first byte.
    ///
    /// # Errors
    ///
    /// - `LocatorError::NotFound` - The locator no longer names a resource
    /// - `LocatorError::Io` - The resource could not be opened
    async fn open(&self, locator: &FileLocator) -> Result<LocatorStream, LocatorError>;

    /// Opens a fresh read stream positioned at `offset`.
    ///
    /// The default reads and discards everything before `offset`. Resolvers
    /// backed by seekable storage should override it.
    ///
    /// # Errors
    ///
    /// - `LocatorError::NotFound` - The locator no longer names a resource
    /// - `LocatorError::Io` - The resource could not be opened or read
    /// - `LocatorError::ShortSkip` - The resource ended before `offset`
    async fn open_at(
        &self,
        locator: &FileLocator,
        offset: u64,
    ) -> Result<LocatorStream, LocatorError> {
        let mut stream = self.open(locator).await?;
        if offset == 0 {
            return Ok(stream);
        }

        let skipped = tokio::io::copy(&mut (&mut stream).take(offset), &mut tokio::io::sink())
            .await
            .map_err(|e| LocatorError::from_io(locator, e))?;
        if skipped < offset {
            return Err(LocatorError::ShortSkip {
                locator: locator.clone(),
                expected: offset,
                skipped,
            });
        }
        Ok(stream)
    }

    /// Returns the content type the storage layer records for the resource.
    fn mime_type(&self, locator: &FileLocator) -> Option<String>;
}

/// Errors raised while resolving a locator.
#[derive(Debug, Error)]
pub enum LocatorError {
    /// The locator does not name an existing resource.
    #[error("locator not found: {locator}")]
    NotFound {
        /// The locator that failed to resolve.
        locator: FileLocator,
    },

    /// The storage layer failed while opening or inspecting the resource.
    #[error("I/O error on {locator}: {source}")]
    Io {
        /// The locator being accessed.
        locator: FileLocator,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// The resource ended before the requested start offset.
    #[error("could not skip to byte {expected} of {locator}, stream ended after {skipped}")]
    ShortSkip {
        locator: FileLocator,
        expected: u64,
        skipped: u64,
    },
}

impl LocatorError {
    /// Classifies an I/O failure, mapping `NotFound` to its own variant.
    pub fn from_io(locator: &FileLocator, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LocatorError::NotFound {
                locator: locator.clone(),
            }
        } else {
            LocatorError::Io {
                locator: locator.clone(),
                source,
            }
        }
    }
}
