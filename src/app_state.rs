use std::sync::Arc;

use actix::Addr;

use crate::chat_server::ChatServer;
use crate::config::Config;
use crate::lifecycle::Lifecycle;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub lifecycle: Lifecycle,
    pub chat_server: Addr<ChatServer>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, chat_server: Addr<ChatServer>, config: Config) -> Self {
        Self {
            lifecycle: Lifecycle::new(store.clone()),
            store,
            chat_server,
            config,
        }
    }
}

#[cfg(test)]
pub mod testing {
    use actix::Actor;

    use super::*;
    use crate::store::memory::MemoryStore;

    pub const TEST_SECRET: &str = "test-secret";

    pub fn config() -> Config {
        Config {
            mongo_uri: "mongodb://localhost:27017".into(),
            database_name: "teamhub_test".into(),
            jwt_secret: TEST_SECRET.into(),
            token_ttl_hours: 48,
            bind_address: "127.0.0.1:0".into(),
            frontend_origin: "http://localhost:5001".into(),
        }
    }

    /// State over an empty in-memory store. Must run inside an actix system.
    pub fn state() -> AppState {
        AppState::new(
            Arc::new(MemoryStore::new()),
            ChatServer::new().start(),
            config(),
        )
    }
}
