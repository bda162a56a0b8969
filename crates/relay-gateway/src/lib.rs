pub mod connection;
pub mod error;
pub mod presence;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;

use std::sync::Arc;

use relay_db::Database;

pub use error::GatewayError;
pub use registry::{ConnId, ConnectionHandle, Registry, Session};
pub use store::Store;

/// Everything a connection task needs: the store and the live registry.
/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct Gateway {
    pub store: Store,
    pub registry: Registry,
}

impl Gateway {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            store: Store::new(db),
            registry: Registry::new(),
        }
    }
}
