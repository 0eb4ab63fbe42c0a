//! In-memory resolver for bridge tests.
//!
//! Stands in for the host storage layer so responder, router and server tests
//! run without touching the filesystem, and can simulate resources whose size
//! is unknown or whose reads fail.

use std::collections::HashMap;
use std::io::{self, Cursor};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::{FileLocator, LocatorError, LocatorResolver, LocatorStream};

#[derive(Debug, Clone)]
enum Entry {
    Sized { data: Bytes, mime: Option<String> },
    Unsized { data: Bytes },
    Failing,
}

/// Resolver backed by byte buffers keyed by locator.
#[derive(Debug, Default)]
pub struct InMemoryResolver {
    entries: RwLock<HashMap<FileLocator, Entry>>,
}

impl InMemoryResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource with a known size and no recorded content type.
    pub fn insert(&self, locator: impl Into<FileLocator>, data: impl Into<Bytes>) {
        self.entries.write().insert(
            locator.into(),
            Entry::Sized {
                data: data.into(),
                mime: None,
            },
        );
    }

    /// Adds a resource with a known size and content type.
    pub fn insert_with_mime(
        &self,
        locator: impl Into<FileLocator>,
        data: impl Into<Bytes>,
        mime: &str,
    ) {
        self.entries.write().insert(
            locator.into(),
            Entry::Sized {
                data: data.into(),
                mime: Some(mime.to_string()),
            },
        );
    }

    /// Adds a resource whose size the storage layer cannot report.
    pub fn insert_unsized(&self, locator: impl Into<FileLocator>, data: impl Into<Bytes>) {
        self.entries
            .write()
            .insert(locator.into(), Entry::Unsized { data: data.into() });
    }

    /// Adds a resource that exists but fails on every access.
    pub fn insert_failing(&self, locator: impl Into<FileLocator>) {
        self.entries.write().insert(locator.into(), Entry::Failing);
    }

    fn entry(&self, locator: &FileLocator) -> Result<Entry, LocatorError> {
        self.entries
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| LocatorError::NotFound {
                locator: locator.clone(),
            })
    }
}

fn simulated_failure(locator: &FileLocator) -> LocatorError {
    LocatorError::Io {
        locator: locator.clone(),
        source: io::Error::other("simulated storage failure"),
    }
}

#[async_trait]
impl LocatorResolver for InMemoryResolver {
    async fn content_length(&self, locator: &FileLocator) -> Result<Option<u64>, LocatorError> {
        match self.entry(locator)? {
            Entry::Sized { data, .. } => Ok(Some(data.len() as u64).filter(|len| *len > 0)),
            Entry::Unsized { .. } => Ok(None),
            Entry::Failing => Err(simulated_failure(locator)),
        }
    }

    async fn open(&self, locator: &FileLocator) -> Result<LocatorStream, LocatorError> {
        match self.entry(locator)? {
            Entry::Sized { data, .. } | Entry::Unsized { data } => Ok(Box::new(Cursor::new(data))),
            Entry::Failing => Err(simulated_failure(locator)),
        }
    }

    fn mime_type(&self, locator: &FileLocator) -> Option<String> {
        match self.entries.read().get(locator) {
            Some(Entry::Sized { mime, .. }) => mime.clone(),
            _ => None,
        }
    }
}

/// Deterministic test payload where byte `i` is `i % 251`.
///
/// 251 is prime, so windows at different offsets never look alike.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_sized_entry_round_trip() {
        let resolver = InMemoryResolver::new();
        resolver.insert_with_mime("song", patterned_bytes(300), "audio/flac");

        let locator = FileLocator::new("song");
        assert_eq!(resolver.content_length(&locator).await.unwrap(), Some(300));
        assert_eq!(resolver.mime_type(&locator).as_deref(), Some("audio/flac"));

        let mut stream = resolver.open(&locator).await.unwrap();
        let mut contents = Vec::new();
        stream.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, patterned_bytes(300));
    }

    #[tokio::test]
    async fn test_unsized_and_failing_entries() {
        let resolver = InMemoryResolver::new();
        resolver.insert_unsized("live", vec![1u8, 2, 3]);
        resolver.insert_failing("broken");

        assert_eq!(
            resolver.content_length(&"live".into()).await.unwrap(),
            None
        );
        assert!(matches!(
            resolver.open(&"broken".into()).await,
            Err(LocatorError::Io { .. })
        ));
        assert!(matches!(
            resolver.content_length(&"absent".into()).await,
            Err(LocatorError::NotFound { .. })
        ));
    }

    #[test]
    fn test_patterned_bytes_wrap_at_251() {
        let bytes = patterned_bytes(600);
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[250], 250);
        assert_eq!(bytes[251], 0);
        assert_eq!(bytes[502], 0);
    }
}
