//! Castline Web - HTTP side of the local media streaming bridge
//!
//! Serves registered files to remote playback devices over plain HTTP with
//! range support, and manages the server's lifecycle around remote sessions.

pub mod range;
pub mod responder;
pub mod router;
pub mod server;
pub mod session;

pub use range::{ByteRange, RangeError, parse_range_header};
pub use responder::{ContentResponder, ResponderError};
pub use router::{BridgeState, create_router};
pub use server::{BridgeError, ServerInfo, StreamBridge};
pub use session::{RemoteSessionState, SessionController};
