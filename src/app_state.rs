use std::sync::Arc;

use crate::collection_ops::CollectionOps;
use crate::config::Config;
use crate::database::ConnectionManager;

/// Composition root: one connection manager per process, shared by every
/// clone of the state.
#[derive(Clone)]
pub struct AppState {
    pub ops: CollectionOps,
    pub log_collection: String,
}

impl AppState {
    /// Does not connect; the first operation does.
    pub fn init(config: &Config) -> Self {
        let manager = Arc::new(
            ConnectionManager::new(config.database_uri.clone(), config.database_name.clone())
                .with_connect_timeout(config.request_timeout()),
        );
        let ops = CollectionOps::with_timeout(manager, config.request_timeout());

        Self {
            ops,
            log_collection: config.log_collection.clone(),
        }
    }
}
