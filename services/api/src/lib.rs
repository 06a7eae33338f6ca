//! Voxchat API Library Crate
//!
//! Application state, message storage, REST handlers, the WebSocket chat
//! gateway, and routing. The `api` binary is a thin wrapper around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
