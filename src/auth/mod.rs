//! Authorization engine.
//!
//! Resolves what an actor may do in a tenant from three layers, checked in
//! order:
//!
//! 1. **Super-admin override**: actors with the `SUPER_ADMIN` role, the
//!    identity flag, or a configured allow-list entry are granted everything.
//! 2. **Tenant grant**: the `(actor, tenant)` row in the grant store.
//! 3. **Home-tenant materialization**: when the actor's home tenant has no
//!    row yet, one is created from the role's default template and used.
//!
//! Missing actors, tenants or grants are answered with a denial, never an
//! error. Only store failures surface as `Err`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use ledgerbot_common::{
    Actor, Capability, GrantStore, MovementScope, PermissionSet, Role, StoreError, TenantId,
    UserId,
};
use tracing::{debug, info};

/// Why a capability check failed. `Display` is the stable reason string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    NotMember,
    MissingCapability(Capability),
    /// Personal scope of somebody else.
    NotOwner,
    /// Operators may only edit movements they recorded.
    NotCreator,
    InsufficientRole { required: Role },
    RoleOutOfReach { target: Role },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMember => f.write_str("not a member of this tenant"),
            Self::MissingCapability(c) => write!(f, "missing capability: {}", c),
            Self::NotOwner => f.write_str("not the owner of this scope"),
            Self::NotCreator => f.write_str("operators may only edit their own movements"),
            Self::InsufficientRole { required } => write!(f, "insufficient role: requires {}", required),
            Self::RoleOutOfReach { target } => write!(f, "cannot manage role {}", target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Granted,
    Denied(DenialReason),
}

impl AuthDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }

    fn from_permissions(permissions: &PermissionSet, capability: Capability) -> Self {
        if permissions.allows(capability) {
            Self::Granted
        } else {
            Self::Denied(DenialReason::MissingCapability(capability))
        }
    }
}

/// Breadth of records a report may cover for an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    Own,
    Tenant,
    All,
}

impl fmt::Display for ReportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Own => f.write_str("OWN"),
            Self::Tenant => f.write_str("TENANT"),
            Self::All => f.write_str("ALL"),
        }
    }
}

pub struct AuthorizationEngine {
    grants: Arc<dyn GrantStore>,
    super_admins: BTreeSet<UserId>,
}

impl AuthorizationEngine {
    pub fn new(grants: Arc<dyn GrantStore>, super_admins: BTreeSet<UserId>) -> Self {
        Self {
            grants,
            super_admins,
        }
    }

    pub fn grants(&self) -> &dyn GrantStore {
        self.grants.as_ref()
    }

    pub fn is_super_admin(&self, actor: &Actor) -> bool {
        actor.super_admin || actor.role == Role::SuperAdmin || self.super_admins.contains(&actor.id)
    }

    /// Role used for hierarchy comparisons; allow-listed actors act as
    /// `SUPER_ADMIN` regardless of their stored role.
    pub fn effective_role(&self, actor: &Actor) -> Role {
        if self.is_super_admin(actor) {
            Role::SuperAdmin
        } else {
            actor.role
        }
    }

    pub async fn authorize(
        &self,
        actor: &Actor,
        tenant: &TenantId,
        capability: Capability,
    ) -> Result<AuthDecision, StoreError> {
        if self.is_super_admin(actor) {
            return Ok(AuthDecision::Granted);
        }
        let decision = match self.grant_for(actor, tenant).await? {
            Some(permissions) => AuthDecision::from_permissions(&permissions, capability),
            None => AuthDecision::Denied(DenialReason::NotMember),
        };
        debug!(actor = %actor.id, %tenant, %capability, ?decision, "Authorization decided");
        Ok(decision)
    }

    /// Like [`authorize`](Self::authorize), but personal scopes are only
    /// accessible to their owner.
    pub async fn authorize_scope(
        &self,
        actor: &Actor,
        scope: &MovementScope,
        capability: Capability,
    ) -> Result<AuthDecision, StoreError> {
        match scope {
            MovementScope::Tenant(tenant) => self.authorize(actor, tenant, capability).await,
            MovementScope::Personal(owner) if *owner == actor.id => Ok(AuthDecision::Granted),
            MovementScope::Personal(_) => Ok(AuthDecision::Denied(DenialReason::NotOwner)),
        }
    }

    /// Edit check for an existing movement. An operator's `canEdit` covers
    /// only movements they created.
    pub async fn authorize_movement_edit(
        &self,
        actor: &Actor,
        scope: &MovementScope,
        created_by: UserId,
    ) -> Result<AuthDecision, StoreError> {
        let decision = self.authorize_scope(actor, scope, Capability::Edit).await?;
        if decision.is_granted()
            && self.effective_role(actor) == Role::Operator
            && created_by != actor.id
        {
            return Ok(AuthDecision::Denied(DenialReason::NotCreator));
        }
        Ok(decision)
    }

    /// Strictly-greater rank in the fixed hierarchy. Equal rank (including
    /// self-management) is always refused.
    pub fn can_manage_role(manager: Role, target: Role) -> bool {
        manager.rank() > target.rank()
    }

    /// Every role strictly below `manager`, highest first.
    pub fn assignable_roles(manager: Role) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| Self::can_manage_role(manager, *role))
            .collect()
    }

    /// Tenants the actor can view. Super-admins see every tenant that has at
    /// least one member.
    pub async fn accessible_companies(&self, actor: &Actor) -> Result<Vec<TenantId>, StoreError> {
        if self.is_super_admin(actor) {
            return self.grants.tenants_with_members().await;
        }
        self.tenants_with(actor, Capability::View).await
    }

    /// Tenants in which the actor holds `capability`.
    pub async fn tenants_with(
        &self,
        actor: &Actor,
        capability: Capability,
    ) -> Result<Vec<TenantId>, StoreError> {
        if self.is_super_admin(actor) {
            return self.grants.tenants_with_members().await;
        }
        self.materialize_home(actor).await?;
        Ok(self
            .grants
            .list_grants(actor.id)
            .await?
            .into_iter()
            .filter(|grant| grant.permissions.allows(capability))
            .map(|grant| grant.tenant_id)
            .collect())
    }

    pub async fn report_scope(&self, actor: &Actor) -> Result<ReportScope, StoreError> {
        if self.is_super_admin(actor) {
            return Ok(ReportScope::All);
        }
        if self.tenants_with(actor, Capability::Report).await?.is_empty() {
            Ok(ReportScope::Own)
        } else {
            Ok(ReportScope::Tenant)
        }
    }

    async fn grant_for(
        &self,
        actor: &Actor,
        tenant: &TenantId,
    ) -> Result<Option<PermissionSet>, StoreError> {
        if let Some(permissions) = self.grants.get_grant(actor.id, tenant).await? {
            return Ok(Some(permissions));
        }
        if actor.home_tenant.as_ref() == Some(tenant) {
            return self.materialize_home(actor).await;
        }
        Ok(None)
    }

    /// Create the home-tenant grant from the role template if it is missing.
    async fn materialize_home(&self, actor: &Actor) -> Result<Option<PermissionSet>, StoreError> {
        let Some(home) = &actor.home_tenant else {
            return Ok(None);
        };
        if let Some(existing) = self.grants.get_grant(actor.id, home).await? {
            return Ok(Some(existing));
        }
        let permissions = self
            .grants
            .ensure_grant(actor.id, home, actor.role.default_permissions())
            .await?;
        info!(actor = %actor.id, tenant = %home, role = %actor.role, "Materialized home tenant grant");
        Ok(Some(permissions))
    }
}
