//! Persistence gateway with sticky remote→local failover.
//!
//! Every operation goes to the remote store until the first remote failure. From then on the
//! gateway stays on the local store for the rest of the process lifetime; a restart is the
//! only way back to remote.

use super::types::{BackendKind, GatewayError, StorageBackend, StorageError};
use crate::model::{Message, UploadedFile};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Routes catalog and transcript operations to the preferred backend.
pub struct PersistenceGateway {
    remote: Arc<dyn StorageBackend>,
    local: Arc<dyn StorageBackend>,
    prefer_local: AtomicBool,
}

impl PersistenceGateway {
    /// Build a gateway that starts out preferring `remote`.
    pub fn new(remote: Arc<dyn StorageBackend>, local: Arc<dyn StorageBackend>) -> Self {
        Self {
            remote,
            local,
            prefer_local: AtomicBool::new(false),
        }
    }

    /// Backend that will service the next call.
    pub fn current_backend(&self) -> BackendKind {
        if self.prefer_local.load(Ordering::Acquire) {
            BackendKind::Local
        } else {
            BackendKind::Remote
        }
    }

    /// Return the catalog.
    pub async fn list_files(&self) -> Result<Vec<UploadedFile>, GatewayError> {
        self.route("list_files", self.remote.list_files(), self.local.list_files())
            .await
    }

    /// Persist a new file record.
    pub async fn add_file(&self, file: &UploadedFile) -> Result<(), GatewayError> {
        self.route("add_file", self.remote.add_file(file), self.local.add_file(file))
            .await
    }

    /// Remove a file record by identifier.
    pub async fn delete_file(&self, id: &str) -> Result<(), GatewayError> {
        self.route("delete_file", self.remote.delete_file(id), self.local.delete_file(id))
            .await
    }

    /// Return the transcript.
    ///
    /// The local store orders by timestamp; the remote order is taken as stored.
    pub async fn list_messages(&self) -> Result<Vec<Message>, GatewayError> {
        self.route(
            "list_messages",
            self.remote.list_messages(),
            self.local.list_messages(),
        )
        .await
    }

    /// Append a message to the transcript.
    pub async fn add_message(&self, message: &Message) -> Result<(), GatewayError> {
        self.route(
            "add_message",
            self.remote.add_message(message),
            self.local.add_message(message),
        )
        .await
    }

    /// Drive one operation. Both futures are lazy; the remote one is dropped unpolled once the
    /// gateway has switched to local.
    async fn route<'a, T>(
        &self,
        operation: &'static str,
        remote: BoxFuture<'a, Result<T, StorageError>>,
        local: BoxFuture<'a, Result<T, StorageError>>,
    ) -> Result<T, GatewayError> {
        if !self.prefer_local.load(Ordering::Acquire) {
            match remote.await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.prefer_local.swap(true, Ordering::AcqRel) {
                        tracing::warn!(
                            operation,
                            error = %error,
                            "Remote store unavailable; switching to local store"
                        );
                    } else {
                        tracing::debug!(operation, error = %error, "Remote call failed");
                    }
                }
            }
        }

        local
            .await
            .map_err(|source| GatewayError::Exhausted { operation, source })
    }
}
