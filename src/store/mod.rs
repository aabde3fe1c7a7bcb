//! SQLite-backed implementation of every collaborator contract.
//!
//! [`Database`] owns the connection and exposes synchronous CRUD;
//! [`DbHandle`] wraps it for async callers and implements [`Ledger`],
//! [`GrantStore`], [`Directory`] and [`SessionStore`].

mod db;

pub use db::Database;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ledgerbot_common::{
    Actor, Category, CategoryId, Directory, GrantStore, Ledger, Movement, MovementChange,
    MovementFilter, MovementId, MovementScope, NewMovement, PermissionSet, SessionRecord,
    SessionStore, StoreError, Tenant, TenantGrant, TenantId, UserId,
};

/// Async-safe handle to the ledger database.
///
/// Wraps `Database` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<Database>>,
}

impl DbHandle {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(Database::new(path)?))
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(Database::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Database) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoreError::Backend(anyhow::anyhow!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}

#[async_trait]
impl Ledger for DbHandle {
    async fn find_greatest_folio(
        &self,
        scope: &MovementScope,
        prefix: &str,
    ) -> Result<Option<String>, StoreError> {
        let scope = scope.clone();
        let prefix = prefix.to_string();
        self.call(move |db| db.find_greatest_folio(&scope, &prefix))
            .await
    }

    async fn create_movement(
        &self,
        movement: &NewMovement,
        folio: &str,
    ) -> Result<Movement, StoreError> {
        let movement = movement.clone();
        let folio = folio.to_string();
        self.call(move |db| db.create_movement(&movement, &folio))
            .await
    }

    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        self.call(move |db| db.get_movement(id)).await
    }

    async fn update_movement(
        &self,
        id: MovementId,
        change: &MovementChange,
    ) -> Result<Movement, StoreError> {
        let change = change.clone();
        self.call(move |db| db.update_movement(id, &change)).await
    }

    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError> {
        let filter = filter.clone();
        self.call(move |db| db.list_movements(&filter)).await
    }

    async fn list_categories(&self, scope: &MovementScope) -> Result<Vec<Category>, StoreError> {
        let scope = scope.clone();
        self.call(move |db| db.list_categories(&scope)).await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        self.call(move |db| db.get_category(id)).await
    }

    async fn create_category(
        &self,
        scope: &MovementScope,
        name: &str,
    ) -> Result<Category, StoreError> {
        let scope = scope.clone();
        let name = name.to_string();
        self.call(move |db| db.create_category(&scope, &name)).await
    }

    async fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, StoreError> {
        let name = name.to_string();
        self.call(move |db| db.rename_category(id, &name)).await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        self.call(move |db| db.delete_category(id)).await
    }
}

#[async_trait]
impl GrantStore for DbHandle {
    async fn get_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
    ) -> Result<Option<PermissionSet>, StoreError> {
        let tenant = tenant.clone();
        self.call(move |db| db.get_grant(user, &tenant)).await
    }

    async fn ensure_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        defaults: PermissionSet,
    ) -> Result<PermissionSet, StoreError> {
        let tenant = tenant.clone();
        self.call(move |db| db.ensure_grant(user, &tenant, defaults))
            .await
    }

    async fn upsert_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        permissions: PermissionSet,
    ) -> Result<(), StoreError> {
        let tenant = tenant.clone();
        self.call(move |db| db.upsert_grant(user, &tenant, permissions))
            .await
    }

    async fn list_grants(&self, user: UserId) -> Result<Vec<TenantGrant>, StoreError> {
        self.call(move |db| db.list_grants(user)).await
    }

    async fn tenants_with_members(&self) -> Result<Vec<TenantId>, StoreError> {
        self.call(|db| db.tenants_with_members()).await
    }
}

#[async_trait]
impl Directory for DbHandle {
    async fn find_actor(&self, id: UserId) -> Result<Option<Actor>, StoreError> {
        self.call(move |db| db.find_actor(id)).await
    }

    async fn register_actor(&self, actor: &Actor) -> Result<(), StoreError> {
        let actor = actor.clone();
        self.call(move |db| db.register_actor(&actor)).await
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        let id = id.clone();
        self.call(move |db| db.get_tenant(&id)).await
    }

    async fn create_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let tenant = tenant.clone();
        self.call(move |db| db.create_tenant(&tenant)).await
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        self.call(|db| db.list_tenants()).await
    }
}

#[async_trait]
impl SessionStore for DbHandle {
    async fn load(&self, conversation: &str) -> Result<Option<SessionRecord>, StoreError> {
        let conversation = conversation.to_string();
        self.call(move |db| db.load_session(&conversation)).await
    }

    async fn save(&self, conversation: &str, record: &SessionRecord) -> Result<(), StoreError> {
        let conversation = conversation.to_string();
        let record = record.clone();
        self.call(move |db| db.save_session(&conversation, &record))
            .await
    }

    async fn clear(&self, conversation: &str) -> Result<(), StoreError> {
        let conversation = conversation.to_string();
        self.call(move |db| db.clear_session(&conversation)).await
    }
}
