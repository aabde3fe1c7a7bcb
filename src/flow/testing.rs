//! Shared fixtures for flow tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use ledgerbot_common::{
    Actor, Category, CategoryId, GrantStore, Ledger, Movement, MovementChange, MovementFilter,
    MovementId, MovementScope, NewMovement, PermissionSet, StoreError, TenantGrant, TenantId,
    UserId,
};

use super::{FlowEngine, FlowSettings, StepContext};
use crate::auth::AuthorizationEngine;
use crate::clock::FixedClock;
use crate::ledger_config::LimitsSection;
use crate::sequence::{FolioFormat, SequenceGenerator};
use crate::store::DbHandle;

/// Collaborators for driving a single step directly.
pub(crate) struct Harness {
    pub db: Arc<DbHandle>,
    pub auth: AuthorizationEngine,
    pub sequence: SequenceGenerator,
    pub limits: LimitsSection,
    pub today: NaiveDate,
}

impl Harness {
    pub async fn new() -> Self {
        let db = Arc::new(DbHandle::in_memory().unwrap());
        Self {
            auth: AuthorizationEngine::new(db.clone(), BTreeSet::new()),
            sequence: SequenceGenerator::new(db.clone(), FolioFormat::default(), 3),
            limits: LimitsSection::default(),
            today: NaiveDate::from_ymd_opt(2024, 8, 14).unwrap(),
            db,
        }
    }

    pub fn ctx<'a>(&'a self, actor: &'a Actor) -> StepContext<'a> {
        StepContext {
            actor,
            limits: &self.limits,
            today: self.today,
            ledger: self.db.as_ref(),
            directory: self.db.as_ref(),
            auth: &self.auth,
            sequence: &self.sequence,
        }
    }
}

/// Engine over a fresh in-memory database with the clock at 2024-08-14.
pub(crate) fn engine_for(settings: FlowSettings) -> (FlowEngine, Arc<DbHandle>, Arc<FixedClock>) {
    let db = Arc::new(DbHandle::in_memory().unwrap());
    let (engine, clock) = engine_over(db.clone(), settings);
    (engine, db, clock)
}

/// Engine over an existing database, clock at 2024-08-14.
pub(crate) fn engine_over(db: Arc<DbHandle>, settings: FlowSettings) -> (FlowEngine, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::at(2024, 8, 14));
    let engine = FlowEngine::new(
        db.clone(),
        db.clone(),
        db.clone(),
        Arc::new(AuthorizationEngine::new(db.clone(), BTreeSet::new())),
        Arc::new(SequenceGenerator::new(db.clone(), FolioFormat::default(), 3)),
        clock.clone(),
        settings,
    );
    (engine, clock)
}

/// Ledger and grant store that logs the order of authorization reads,
/// folio lookups and movement writes. Creates can be made to fail.
pub(crate) struct Recorder {
    inner: Arc<DbHandle>,
    calls: Mutex<Vec<&'static str>>,
    fail_creates: AtomicBool,
}

impl Recorder {
    pub fn new(db: DbHandle) -> Self {
        Self {
            inner: Arc::new(db),
            calls: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
        }
    }

    pub fn inner(&self) -> &Arc<DbHandle> {
        &self.inner
    }

    pub fn engine(self: &Arc<Self>, settings: FlowSettings) -> (FlowEngine, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::at(2024, 8, 14));
        let engine = FlowEngine::new(
            self.clone(),
            self.inner.clone(),
            self.inner.clone(),
            Arc::new(AuthorizationEngine::new(self.clone(), BTreeSet::new())),
            Arc::new(SequenceGenerator::new(self.clone(), FolioFormat::default(), 3)),
            clock.clone(),
            settings,
        );
        (engine, clock)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Ledger for Recorder {
    async fn find_greatest_folio(
        &self,
        scope: &MovementScope,
        prefix: &str,
    ) -> Result<Option<String>, StoreError> {
        self.record("find_greatest_folio");
        self.inner.find_greatest_folio(scope, prefix).await
    }

    async fn create_movement(
        &self,
        movement: &NewMovement,
        folio: &str,
    ) -> Result<Movement, StoreError> {
        self.record("create_movement");
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow::anyhow!("disk I/O error")));
        }
        self.inner.create_movement(movement, folio).await
    }

    async fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        self.inner.get_movement(id).await
    }

    async fn update_movement(
        &self,
        id: MovementId,
        change: &MovementChange,
    ) -> Result<Movement, StoreError> {
        self.record("update_movement");
        self.inner.update_movement(id, change).await
    }

    async fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError> {
        self.inner.list_movements(filter).await
    }

    async fn list_categories(&self, scope: &MovementScope) -> Result<Vec<Category>, StoreError> {
        self.inner.list_categories(scope).await
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        self.inner.get_category(id).await
    }

    async fn create_category(
        &self,
        scope: &MovementScope,
        name: &str,
    ) -> Result<Category, StoreError> {
        self.inner.create_category(scope, name).await
    }

    async fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, StoreError> {
        self.inner.rename_category(id, name).await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        self.inner.delete_category(id).await
    }
}

#[async_trait]
impl GrantStore for Recorder {
    async fn get_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
    ) -> Result<Option<PermissionSet>, StoreError> {
        self.record("authorize");
        self.inner.get_grant(user, tenant).await
    }

    async fn ensure_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        defaults: PermissionSet,
    ) -> Result<PermissionSet, StoreError> {
        self.inner.ensure_grant(user, tenant, defaults).await
    }

    async fn upsert_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        permissions: PermissionSet,
    ) -> Result<(), StoreError> {
        self.inner.upsert_grant(user, tenant, permissions).await
    }

    async fn list_grants(&self, user: UserId) -> Result<Vec<TenantGrant>, StoreError> {
        self.inner.list_grants(user).await
    }

    async fn tenants_with_members(&self) -> Result<Vec<TenantId>, StoreError> {
        self.inner.tenants_with_members().await
    }
}
