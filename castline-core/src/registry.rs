//! Session-scoped registry of files exposed to remote devices.
//!
//! Each registration gets a fresh random ID that becomes the last segment of
//! its URL. IDs are never expired one by one; the whole registry is cleared
//! when the remote playback session ends.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use uuid::Uuid;

use crate::locator::FileLocator;

/// Length of the generated session token in characters.
const TOKEN_LENGTH: usize = 32;

/// Shared secret embedded in every registration URL.
///
/// Generated once per bridge and immutable afterwards. Requests carrying any
/// other token are rejected before the registry is consulted.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a new random alphanumeric token.
    pub fn generate() -> Self {
        let token = rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Returns the token as it appears in URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks a path segment against the token.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

// Keep the secret out of logs
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Opaque identifier of a single registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrationId(String);

impl RegistrationId {
    fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as it appears in URLs.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Lets the registry look up raw path segments without allocating
impl Borrow<str> for RegistrationId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a registered file is served as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Audio track, served with the resolver's content type
    Audio,
    /// Album art, always served as an image
    Artwork,
}

impl ResourceKind {
    /// Path segment used in URLs for this kind.
    pub fn path_segment(self) -> &'static str {
        match self {
            ResourceKind::Audio => "audio",
            ResourceKind::Artwork => "artwork",
        }
    }
}

/// A file exposed under a registration ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub locator: FileLocator,
    pub kind: ResourceKind,
}

/// Concurrent map from registration IDs to registrations.
///
/// Request handlers read it while the session controller registers files and
/// clears it; readers only ever see complete entries.
#[derive(Debug, Default)]
pub struct FileRegistry {
    entries: RwLock<HashMap<RegistrationId, Registration>>,
}

impl FileRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes a locator under a fresh ID.
    pub fn register(&self, locator: FileLocator, kind: ResourceKind) -> RegistrationId {
        let id = RegistrationId::generate();
        let registration = Registration { locator, kind };

        let mut entries = self.entries.write();
        entries.insert(id.clone(), registration);
        tracing::debug!(
            "Registered {} as {:?}, {} registrations",
            id,
            kind,
            entries.len()
        );
        id
    }

    /// Looks up a registration by the ID segment of a request path.
    pub fn lookup(&self, id: &str) -> Option<Registration> {
        self.entries.read().get(id).cloned()
    }

    /// Drops every registration.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.entries.write());
        tracing::debug!("Cleared {} registrations", removed.len());
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_register_then_lookup() {
        let registry = FileRegistry::new();
        let id = registry.register(FileLocator::new("/music/a.mp3"), ResourceKind::Audio);

        let registration = registry.lookup(id.as_str()).unwrap();
        assert_eq!(registration.locator.as_str(), "/music/a.mp3");
        assert_eq!(registration.kind, ResourceKind::Audio);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_id() {
        let registry = FileRegistry::new();
        registry.register(FileLocator::new("/music/a.mp3"), ResourceKind::Audio);

        assert!(registry.lookup("abc").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn test_clear_invalidates_previous_ids() {
        let registry = FileRegistry::new();
        let audio = registry.register(FileLocator::new("/a.mp3"), ResourceKind::Audio);
        let art = registry.register(FileLocator::new("/a.jpg"), ResourceKind::Artwork);

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.lookup(audio.as_str()).is_none());
        assert!(registry.lookup(art.as_str()).is_none());
    }

    #[test]
    fn test_same_locator_gets_distinct_ids() {
        let registry = FileRegistry::new();
        let locator = FileLocator::new("/a.mp3");

        let ids: HashSet<_> = (0..500)
            .map(|_| registry.register(locator.clone(), ResourceKind::Audio))
            .collect();

        assert_eq!(ids.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn test_ids_are_url_safe() {
        let registry = FileRegistry::new();
        let id = registry.register(FileLocator::new("/a.mp3"), ResourceKind::Audio);

        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_concurrent_register_lookup_and_clear() {
        let registry = Arc::new(FileRegistry::new());
        let stable = registry.register(FileLocator::new("/stable.mp3"), ResourceKind::Audio);

        let writers: Vec<_> = (0..4)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        let locator = FileLocator::new(format!("/w{n}/{i}.mp3"));
                        let id = registry.register(locator.clone(), ResourceKind::Audio);
                        // A concurrent clear may have removed it; if present it must be intact
                        if let Some(found) = registry.lookup(id.as_str()) {
                            assert_eq!(found.locator, locator);
                        }
                    }
                })
            })
            .collect();

        let clearer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..20 {
                    registry.clear();
                    thread::yield_now();
                }
            })
        };

        for handle in writers {
            handle.join().unwrap();
        }
        clearer.join().unwrap();

        // Whatever survived is well formed; the stable entry may be gone
        if let Some(found) = registry.lookup(stable.as_str()) {
            assert_eq!(found.locator.as_str(), "/stable.mp3");
        }
    }

    #[test]
    fn test_session_token_shape_and_match() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_LENGTH);
        assert!(token.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(token.matches(token.as_str()));
        assert!(!token.matches("wrong-token"));
        assert_ne!(token, SessionToken::generate());
    }

    #[test]
    fn test_session_token_debug_hides_secret() {
        let token = SessionToken::generate();
        assert!(!format!("{token:?}").contains(token.as_str()));
    }

    #[test]
    fn test_kind_path_segments() {
        assert_eq!(ResourceKind::Audio.path_segment(), "audio");
        assert_eq!(ResourceKind::Artwork.path_segment(), "artwork");
    }
}
