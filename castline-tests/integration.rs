//! Integration tests for Castline
//!
//! These tests run the bridge on a real loopback socket with files on disk
//! and talk to it through an ordinary HTTP client, the way a cast receiver
//! would.

#[path = "style.rs"]
mod style;

#[path = "integration/common.rs"]
mod common;

#[path = "integration/access_control.rs"]
mod access_control;
#[path = "integration/http_streaming.rs"]
mod http_streaming;
#[path = "integration/lifecycle.rs"]
mod lifecycle;
