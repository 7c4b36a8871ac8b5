//! Dual-backend persistence: remote REST store, embedded local store, and the gateway
//! choosing between them.

pub mod gateway;
pub mod local;
pub mod remote;
pub mod types;

pub use gateway::PersistenceGateway;
pub use local::LocalStore;
pub use remote::RemoteStore;
pub use types::{BackendKind, GatewayError, StorageBackend, StorageError};

use crate::config::get_config;
use std::sync::Arc;

/// Build the gateway from configuration: remote client first, local SQLite as fallback.
pub fn gateway_from_config() -> Result<PersistenceGateway, StorageError> {
    let config = get_config();
    let remote = RemoteStore::from_config()?;
    let local = LocalStore::open(&config.local_store_path)?;
    Ok(PersistenceGateway::new(Arc::new(remote), Arc::new(local)))
}
