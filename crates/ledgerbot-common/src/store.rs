//! Collaborator contracts consumed by the engines.
//!
//! Implementations must report unique-key violations as
//! [`StoreError::Conflict`] so folio allocation can retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::access::{Actor, PermissionSet, TenantGrant, TenantId, UserId};
use crate::ledger::{
    Category, CategoryId, Movement, MovementChange, MovementFilter, MovementId, MovementScope,
    NewMovement, Tenant,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Stored data could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Movements and categories.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Greatest folio in `scope` starting with `prefix`. Longer folios sort
    /// after shorter ones so widened counters still compare correctly.
    async fn find_greatest_folio(
        &self,
        scope: &MovementScope,
        prefix: &str,
    ) -> Result<Option<String>, StoreError>;

    async fn create_movement(
        &self,
        movement: &NewMovement,
        folio: &str,
    ) -> Result<Movement, StoreError>;

    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    async fn update_movement(
        &self,
        id: MovementId,
        change: &MovementChange,
    ) -> Result<Movement, StoreError>;

    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError>;

    async fn list_categories(&self, scope: &MovementScope) -> Result<Vec<Category>, StoreError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    async fn create_category(
        &self,
        scope: &MovementScope,
        name: &str,
    ) -> Result<Category, StoreError>;

    async fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, StoreError>;

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError>;
}

/// Per-(user, tenant) permission rows.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn get_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
    ) -> Result<Option<PermissionSet>, StoreError>;

    /// Insert `defaults` only if no grant exists, then return the stored
    /// grant. Safe to race.
    async fn ensure_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        defaults: PermissionSet,
    ) -> Result<PermissionSet, StoreError>;

    /// Insert or overwrite the grant.
    async fn upsert_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        permissions: PermissionSet,
    ) -> Result<(), StoreError>;

    async fn list_grants(&self, user: UserId) -> Result<Vec<TenantGrant>, StoreError>;

    /// Tenants with at least one grant row.
    async fn tenants_with_members(&self) -> Result<Vec<TenantId>, StoreError>;
}

/// Identity and tenant registry.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_actor(&self, id: UserId) -> Result<Option<Actor>, StoreError>;

    async fn register_actor(&self, actor: &Actor) -> Result<(), StoreError>;

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn create_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError>;
}

/// Raw stored conversation state. The payload is opaque to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub payload: String,
    pub last_activity: DateTime<Utc>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, conversation: &str) -> Result<Option<SessionRecord>, StoreError>;

    /// Must be durable before returning.
    async fn save(&self, conversation: &str, record: &SessionRecord) -> Result<(), StoreError>;

    async fn clear(&self, conversation: &str) -> Result<(), StoreError>;
}
