use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Chat-platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| format!("Invalid user id: {}", s))
    }
}

/// Tenant (company) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position in the fixed role hierarchy.
///
/// | Role                 | Rank |
/// |----------------------|------|
/// | `SuperAdmin`         | 5    |
/// | `OrganizationAdmin`  | 4    |
/// | `CompanyAdmin`       | 3    |
/// | `Admin`              | 2    |
/// | `Operator`           | 1    |
///
/// Ordering (`Ord`) follows rank, so `Role::SuperAdmin > Role::Operator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Operator,
    Admin,
    CompanyAdmin,
    OrganizationAdmin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::OrganizationAdmin,
        Role::CompanyAdmin,
        Role::Admin,
        Role::Operator,
    ];

    pub fn rank(self) -> u8 {
        match self {
            Self::SuperAdmin => 5,
            Self::OrganizationAdmin => 4,
            Self::CompanyAdmin => 3,
            Self::Admin => 2,
            Self::Operator => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::OrganizationAdmin => "ORGANIZATION_ADMIN",
            Self::CompanyAdmin => "COMPANY_ADMIN",
            Self::Admin => "ADMIN",
            Self::Operator => "OPERATOR",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super admin",
            Self::OrganizationAdmin => "Organization admin",
            Self::CompanyAdmin => "Company admin",
            Self::Admin => "Admin",
            Self::Operator => "Operator",
        }
    }

    /// Permission template applied when a grant is provisioned for this role.
    /// Never re-applied to an existing grant.
    pub fn default_permissions(self) -> PermissionSet {
        match self {
            // Operators may record movements but not report or manage members.
            Self::Operator => PermissionSet {
                can_view: true,
                can_edit: true,
                can_report: false,
                can_manage_users: false,
            },
            Self::Admin | Self::CompanyAdmin | Self::OrganizationAdmin | Self::SuperAdmin => {
                PermissionSet::all()
            }
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "SUPER_ADMIN" => Ok(Self::SuperAdmin),
            "ORGANIZATION_ADMIN" => Ok(Self::OrganizationAdmin),
            "COMPANY_ADMIN" => Ok(Self::CompanyAdmin),
            "ADMIN" => Ok(Self::Admin),
            "OPERATOR" => Ok(Self::Operator),
            _ => Err(format!(
                "Invalid role '{}'. Valid values: SUPER_ADMIN, ORGANIZATION_ADMIN, COMPANY_ADMIN, ADMIN, OPERATOR",
                s
            )),
        }
    }
}

/// A single capability checked against a tenant grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "canView")]
    View,
    #[serde(rename = "canEdit")]
    Edit,
    #[serde(rename = "canReport")]
    Report,
    #[serde(rename = "canManageUsers")]
    ManageUsers,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "canView",
            Self::Edit => "canEdit",
            Self::Report => "canReport",
            Self::ManageUsers => "canManageUsers",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four independent capability flags held per (actor, tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    pub can_view: bool,
    pub can_edit: bool,
    pub can_report: bool,
    pub can_manage_users: bool,
}

impl PermissionSet {
    pub fn all() -> Self {
        Self {
            can_view: true,
            can_edit: true,
            can_report: true,
            can_manage_users: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::View => self.can_view,
            Capability::Edit => self.can_edit,
            Capability::Report => self.can_report,
            Capability::ManageUsers => self.can_manage_users,
        }
    }
}

/// Authenticated user identity as supplied by the directory for each turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub home_tenant: Option<TenantId>,
    /// Member of the system-wide super-admin allow-list.
    #[serde(default)]
    pub super_admin: bool,
}

impl Actor {
    pub fn new(id: i64, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id),
            name: name.into(),
            role,
            home_tenant: None,
            super_admin: false,
        }
    }

    pub fn with_home(mut self, tenant: impl Into<String>) -> Self {
        self.home_tenant = Some(TenantId::new(tenant));
        self
    }
}

/// Capabilities an actor holds in one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantGrant {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub permissions: PermissionSet,
}
