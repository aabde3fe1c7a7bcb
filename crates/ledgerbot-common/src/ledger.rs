use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access::{TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Expense,
    Income,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            _ => Err(format!("Invalid movement kind: {}", s)),
        }
    }
}

/// Owner of a movement, category, or folio series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum MovementScope {
    Tenant(TenantId),
    Personal(UserId),
}

impl MovementScope {
    /// Stable storage key, e.g. `tenant:acme` or `user:42`.
    pub fn key(&self) -> String {
        match self {
            Self::Tenant(t) => format!("tenant:{}", t),
            Self::Personal(u) => format!("user:{}", u),
        }
    }

    pub fn parse_key(key: &str) -> Result<Self, String> {
        match key.split_once(':') {
            Some(("tenant", id)) if !id.is_empty() => Ok(Self::Tenant(TenantId::new(id))),
            Some(("user", id)) => Ok(Self::Personal(id.parse()?)),
            _ => Err(format!("Invalid scope key: {}", key)),
        }
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Self::Tenant(t) => Some(t),
            Self::Personal(_) => None,
        }
    }
}

impl fmt::Display for MovementScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tenant(t) => write!(f, "company {}", t),
            Self::Personal(_) => f.write_str("personal"),
        }
    }
}

/// Calendar month bucket (`YYYY-MM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, String> {
        if !(1..=12).contains(&month) || !(1..=9999).contains(&year) {
            return Err(format!("Invalid year-month: {}-{}", year, month));
        }
        Ok(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn of_instant(instant: DateTime<Utc>) -> Self {
        Self::of(instant.date_naive())
    }

    /// Compact form used in folios: `202408`.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid year-month '{}', expected YYYY-MM", s))?;
        let year = y.parse().map_err(|_| format!("Invalid year in '{}'", s))?;
        let month = m.parse().map_err(|_| format!("Invalid month in '{}'", s))?;
        Self::new(year, month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub i64);

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fully validated movement ready to be written under a folio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub scope: MovementScope,
    pub amount: Decimal,
    pub description: String,
    pub category: Option<CategoryId>,
    pub photo: Option<String>,
    pub date: NaiveDate,
    pub created_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub folio: String,
    pub kind: MovementKind,
    pub scope: MovementScope,
    pub amount: Decimal,
    pub description: String,
    pub category: Option<CategoryId>,
    pub photo: Option<String>,
    pub date: NaiveDate,
    pub created_by: UserId,
    pub created_at: String,
}

/// One field replacement applied to an existing movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum MovementChange {
    Amount(Decimal),
    Description(String),
    Category(Option<CategoryId>),
    Date(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub scope: MovementScope,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub description: Option<String>,
}

/// Which movements a query may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Everything,
    /// Movements in the listed tenants plus the user's personal movements.
    Tenants {
        tenants: Vec<TenantId>,
        personal_of: UserId,
    },
    CreatedBy(UserId),
}

impl Visibility {
    pub fn admits(&self, movement: &Movement) -> bool {
        match self {
            Self::Everything => true,
            Self::Tenants {
                tenants,
                personal_of,
            } => match &movement.scope {
                MovementScope::Tenant(tenant) => tenants.contains(tenant),
                MovementScope::Personal(owner) => owner == personal_of,
            },
            Self::CreatedBy(user) => movement.created_by == *user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementFilter {
    pub visibility: Visibility,
    pub month: Option<YearMonth>,
    pub folio: Option<String>,
    pub limit: Option<u32>,
}

impl MovementFilter {
    pub fn new(visibility: Visibility) -> Self {
        Self {
            visibility,
            month: None,
            folio: None,
            limit: None,
        }
    }

    pub fn in_month(mut self, month: YearMonth) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_folio(mut self, folio: impl Into<String>) -> Self {
        self.folio = Some(folio.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
