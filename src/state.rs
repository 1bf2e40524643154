use crate::{
    config::Config, session::SessionRegistry, store::DocumentStore, websocket::RoomRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Backing document store, injected at startup. The only component with
    /// multi-writer coordination concerns.
    pub store: Arc<dyn DocumentStore>,
    /// Connection id -> authenticated user + joined rooms.
    pub sessions: SessionRegistry,
    /// Room -> subscriber fan-out.
    pub registry: RoomRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: Arc<Config>) -> Self {
        Self {
            store,
            sessions: SessionRegistry::new(),
            registry: RoomRegistry::new(),
            config,
        }
    }
}
