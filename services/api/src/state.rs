//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the collaborators
//! and the connection registry shared by every handler.

use crate::{db::MessageStore, ws::registry::ConnectionRegistry};
use std::sync::Arc;
use std::time::Duration;
use voxchat_core::CompletionClient;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub completion: Arc<dyn CompletionClient>,
    pub registry: Arc<ConnectionRegistry>,
    pub completion_timeout: Duration,
}

impl AppState {
    pub fn new(
        store: Arc<dyn MessageStore>,
        completion: Arc<dyn CompletionClient>,
        completion_timeout: Duration,
    ) -> Self {
        Self {
            store,
            completion,
            registry: Arc::new(ConnectionRegistry::new()),
            completion_timeout,
        }
    }
}
