//! End-to-end tests for Castline
//!
//! These tests follow a whole casting session: the cast framework reports
//! session changes, the host registers a queue, and a remote receiver fetches
//! artwork and seeks through tracks over HTTP.

mod cast_session_workflow;
