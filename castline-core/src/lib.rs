//! Castline Core - Building blocks of the local media streaming bridge
//!
//! This crate holds everything the bridge needs that is not HTTP: the
//! registry that maps opaque IDs to file locators, the locator resolvers that
//! open the underlying bytes, the address resolver that picks the LAN address
//! remote devices can reach, and configuration and tracing setup.

pub mod config;
pub mod locator;
pub mod network;
pub mod registry;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::BridgeConfig;
pub use locator::{FileLocator, FsResolver, LocatorError, LocatorResolver, LocatorStream};
pub use network::{AddressResolver, AddressSource, ResolvedAddress};
pub use registry::{FileRegistry, Registration, RegistrationId, ResourceKind, SessionToken};

/// Core errors that can bubble up from any Castline subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CastlineError {
    #[error("Locator error: {0}")]
    Locator(#[from] LocatorError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CastlineError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            CastlineError::Locator(LocatorError::NotFound { locator }) => {
                format!("File not found: {locator}")
            }
            CastlineError::Locator(_) => "File could not be read".to_string(),
            CastlineError::Configuration { reason } => format!("Invalid configuration: {reason}"),
            CastlineError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CastlineError::Configuration { .. }
                | CastlineError::Locator(LocatorError::NotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, CastlineError>;
