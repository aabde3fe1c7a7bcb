//! Shared domain types for the ledgerbot assistant.
//!
//! This crate holds the vocabulary every other part of the workspace speaks:
//!
//! | Module   | Contents                                                        |
//! |----------|-----------------------------------------------------------------|
//! | `access` | `Role` hierarchy, `Capability`, `PermissionSet`, `Actor`, grants |
//! | `ledger` | Movements, categories, tenants, scopes and query filters         |
//! | `store`  | `StoreError` and the async collaborator traits                   |
//!
//! Nothing here performs I/O. The root crate supplies a SQLite implementation
//! of the collaborator traits and the engines that consume them.

pub mod access;
pub mod ledger;
pub mod store;

pub use access::{Actor, Capability, PermissionSet, Role, TenantGrant, TenantId, UserId};
pub use ledger::{
    Category, CategoryId, Movement, MovementChange, MovementFilter, MovementId, MovementKind,
    MovementScope, NewMovement, Tenant, Visibility, YearMonth,
};
pub use store::{Directory, GrantStore, Ledger, SessionRecord, SessionStore, StoreError};
