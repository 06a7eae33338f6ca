//! WebSocket Chat Gateway
//!
//! - `protocol`: validation of inbound JSON frames.
//! - `registry`: the map of live sessions, shared by every connection.
//! - `session`: the connection lifecycle, from upgrade to teardown.
//! - `turn`: one user turn through persistence and the completion collaborator.

pub mod protocol;
pub mod registry;
pub mod session;
pub mod turn;

pub use session::ws_handler;
