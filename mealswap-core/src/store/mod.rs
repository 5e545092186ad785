//! Store adapters.
//!
//! Every backing store implements the same [`Store`] contract:
//!
//! - [`InMemoryStore`]: process-local collections, used as a test double and
//!   as the server's scratch store
//! - [`LocalCache`]: one JSON document per entity kind on disk
//! - [`HttpStore`]: the authoritative remote store, reached over HTTP
//!
//! Upserts are idempotent by entity id and a [`ChangeSet`] is applied all or
//! nothing, after its preconditions are checked against the stored records. `fetch_all` returns records in insertion order.

mod entity;
mod http;
mod local;
mod memory;

use async_trait::async_trait;
use std::path::PathBuf;

pub use entity::{ChangeSet, Entity, EntityKind, Filter, Precondition, Record};
pub use http::HttpStore;
pub use local::LocalCache;
pub use memory::InMemoryStore;

/// Errors raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error for {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Failed to decode {0}: {1}")]
    Decode(String, String),
    #[error("Failed to encode {0}: {1}")]
    Encode(String, String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },
    /// A change set precondition did not hold; nothing was written.
    #[error("Change set rejected: {0}")]
    Rejected(String),
    #[error("Write task failed: {0}")]
    Task(String),
}

/// Repository contract shared by every backing store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Returns every record of `kind` matching `filter`, in insertion order.
    async fn fetch_all(&self, kind: EntityKind, filter: &Filter)
        -> Result<Vec<Entity>, StoreError>;

    /// Applies every entity in `changes`, or none of them. Fails with
    /// [`StoreError::Rejected`] if a precondition does not hold.
    async fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError>;

    async fn upsert(&self, entity: Entity) -> Result<(), StoreError> {
        self.commit(&ChangeSet::new().with(entity)).await
    }
}

/// Fetches typed records of `R`'s kind.
pub async fn fetch<R: Record>(store: &dyn Store, filter: &Filter) -> Result<Vec<R>, StoreError> {
    let entities = store.fetch_all(R::KIND, filter).await?;
    Ok(entities.into_iter().filter_map(R::from_entity).collect())
}

/// Fetches a single record by id.
pub async fn find<R: Record>(store: &dyn Store, id: uuid::Uuid) -> Result<Option<R>, StoreError> {
    Ok(fetch::<R>(store, &Filter::by_id(id)).await?.into_iter().next())
}
