use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use ledgerbot_common::{
    Actor, Category, CategoryId, Movement, MovementChange, MovementFilter, MovementId,
    MovementKind, MovementScope, NewMovement, PermissionSet, Role, SessionRecord, StoreError,
    Tenant, TenantGrant, TenantId, UserId, Visibility,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use rust_decimal::Decimal;

/// Map a rusqlite error, keeping unique-key violations distinct.
fn sql_err(context: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            StoreError::Conflict(format!("{}: {}", context, e))
        }
        _ => StoreError::Backend(anyhow::Error::new(e).context(context)),
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> anyhow::Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        // Tenant references are deliberately not foreign keys: grants and home
        // tenants may point at tenants that were never registered here.
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS tenants (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    role TEXT NOT NULL,
                    home_tenant TEXT,
                    super_admin INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tenant_grants (
                    user_id INTEGER NOT NULL,
                    tenant_id TEXT NOT NULL,
                    can_view INTEGER NOT NULL DEFAULT 0,
                    can_edit INTEGER NOT NULL DEFAULT 0,
                    can_report INTEGER NOT NULL DEFAULT 0,
                    can_manage_users INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (user_id, tenant_id)
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    scope_key TEXT NOT NULL,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS movements (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    folio TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    scope_key TEXT NOT NULL,
                    amount TEXT NOT NULL,
                    description TEXT NOT NULL,
                    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                    photo TEXT,
                    date TEXT NOT NULL,
                    created_by INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (scope_key, folio)
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    conversation_id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    last_activity TEXT NOT NULL
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_scope_name
                    ON categories(scope_key, name COLLATE NOCASE);
                CREATE INDEX IF NOT EXISTS idx_movements_scope_date ON movements(scope_key, date);
                CREATE INDEX IF NOT EXISTS idx_movements_created_by ON movements(created_by);
                CREATE INDEX IF NOT EXISTS idx_grants_tenant ON tenant_grants(tenant_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Tenants & users ──────────────────────────────────────────────

    pub fn create_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO tenants (id, name, description) VALUES (?1, ?2, ?3)",
                params![tenant.id.as_str(), tenant.name, tenant.description],
            )
            .map_err(sql_err("Failed to insert tenant"))?;
        Ok(())
    }

    pub fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, description FROM tenants WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Tenant {
                        id: TenantId(row.get(0)?),
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(sql_err("Failed to query tenant"))
    }

    pub fn list_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM tenants ORDER BY name")
            .map_err(sql_err("Failed to prepare list_tenants"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Tenant {
                    id: TenantId(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(sql_err("Failed to query tenants"))?;
        let mut tenants = Vec::new();
        for row in rows {
            tenants.push(row.map_err(sql_err("Failed to read tenant row"))?);
        }
        Ok(tenants)
    }

    pub fn register_actor(&self, actor: &Actor) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO users (id, name, role, home_tenant, super_admin) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    actor.id.0,
                    actor.name,
                    actor.role.as_str(),
                    actor.home_tenant.as_ref().map(|t| t.as_str()),
                    actor.super_admin,
                ],
            )
            .map_err(sql_err("Failed to insert user"))?;
        Ok(())
    }

    pub fn find_actor(&self, id: UserId) -> Result<Option<Actor>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, role, home_tenant, super_admin FROM users WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        role: row.get(2)?,
                        home_tenant: row.get(3)?,
                        super_admin: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(sql_err("Failed to query user"))?;
        row.map(UserRow::into_actor).transpose()
    }

    // ── Grants ───────────────────────────────────────────────────────

    pub fn get_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
    ) -> Result<Option<PermissionSet>, StoreError> {
        self.conn
            .query_row(
                "SELECT can_view, can_edit, can_report, can_manage_users
                 FROM tenant_grants WHERE user_id = ?1 AND tenant_id = ?2",
                params![user.0, tenant.as_str()],
                |row| {
                    Ok(PermissionSet {
                        can_view: row.get(0)?,
                        can_edit: row.get(1)?,
                        can_report: row.get(2)?,
                        can_manage_users: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(sql_err("Failed to query grant"))
    }

    pub fn ensure_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        defaults: PermissionSet,
    ) -> Result<PermissionSet, StoreError> {
        self.conn
            .execute(
                "INSERT INTO tenant_grants (user_id, tenant_id, can_view, can_edit, can_report, can_manage_users)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, tenant_id) DO NOTHING",
                params![
                    user.0,
                    tenant.as_str(),
                    defaults.can_view,
                    defaults.can_edit,
                    defaults.can_report,
                    defaults.can_manage_users,
                ],
            )
            .map_err(sql_err("Failed to materialize grant"))?;
        self.get_grant(user, tenant)?
            .ok_or_else(|| StoreError::NotFound(format!("grant {}@{}", user, tenant)))
    }

    pub fn upsert_grant(
        &self,
        user: UserId,
        tenant: &TenantId,
        permissions: PermissionSet,
    ) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO tenant_grants (user_id, tenant_id, can_view, can_edit, can_report, can_manage_users)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id, tenant_id) DO UPDATE SET
                    can_view = excluded.can_view,
                    can_edit = excluded.can_edit,
                    can_report = excluded.can_report,
                    can_manage_users = excluded.can_manage_users,
                    updated_at = datetime('now')",
                params![
                    user.0,
                    tenant.as_str(),
                    permissions.can_view,
                    permissions.can_edit,
                    permissions.can_report,
                    permissions.can_manage_users,
                ],
            )
            .map_err(sql_err("Failed to upsert grant"))?;
        Ok(())
    }

    pub fn list_grants(&self, user: UserId) -> Result<Vec<TenantGrant>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT tenant_id, can_view, can_edit, can_report, can_manage_users
                 FROM tenant_grants WHERE user_id = ?1 ORDER BY tenant_id",
            )
            .map_err(sql_err("Failed to prepare list_grants"))?;
        let rows = stmt
            .query_map(params![user.0], |row| {
                Ok(TenantGrant {
                    user_id: user,
                    tenant_id: TenantId(row.get(0)?),
                    permissions: PermissionSet {
                        can_view: row.get(1)?,
                        can_edit: row.get(2)?,
                        can_report: row.get(3)?,
                        can_manage_users: row.get(4)?,
                    },
                })
            })
            .map_err(sql_err("Failed to query grants"))?;
        let mut grants = Vec::new();
        for row in rows {
            grants.push(row.map_err(sql_err("Failed to read grant row"))?);
        }
        Ok(grants)
    }

    pub fn tenants_with_members(&self) -> Result<Vec<TenantId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT tenant_id FROM tenant_grants ORDER BY tenant_id")
            .map_err(sql_err("Failed to prepare tenants_with_members"))?;
        let rows = stmt
            .query_map([], |row| Ok(TenantId(row.get(0)?)))
            .map_err(sql_err("Failed to query member tenants"))?;
        let mut tenants = Vec::new();
        for row in rows {
            tenants.push(row.map_err(sql_err("Failed to read tenant id"))?);
        }
        Ok(tenants)
    }

    // ── Movements ────────────────────────────────────────────────────

    pub fn find_greatest_folio(
        &self,
        scope: &MovementScope,
        prefix: &str,
    ) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT folio FROM movements
                 WHERE scope_key = ?1 AND substr(folio, 1, ?3) = ?2
                 ORDER BY length(folio) DESC, folio DESC
                 LIMIT 1",
                params![scope.key(), prefix, prefix.chars().count() as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err("Failed to query greatest folio"))
    }

    pub fn create_movement(
        &self,
        movement: &NewMovement,
        folio: &str,
    ) -> Result<Movement, StoreError> {
        self.conn
            .execute(
                "INSERT INTO movements (folio, kind, scope_key, amount, description, category_id, photo, date, created_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    folio,
                    movement.kind.as_str(),
                    movement.scope.key(),
                    movement.amount.to_string(),
                    movement.description,
                    movement.category.map(|c| c.0),
                    movement.photo,
                    movement.date.format("%Y-%m-%d").to_string(),
                    movement.created_by.0,
                ],
            )
            .map_err(sql_err("Failed to insert movement"))?;
        let id = MovementId(self.conn.last_insert_rowid());
        self.get_movement(id)?
            .ok_or_else(|| StoreError::NotFound(format!("movement {} after insert", id.0)))
    }

    pub fn get_movement(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let row = self
            .conn
            .query_row(
                &format!("{} WHERE id = ?1", MOVEMENT_SELECT),
                params![id.0],
                MovementRow::from_row,
            )
            .optional()
            .map_err(sql_err("Failed to query movement"))?;
        row.map(MovementRow::into_movement).transpose()
    }

    pub fn update_movement(
        &self,
        id: MovementId,
        change: &MovementChange,
    ) -> Result<Movement, StoreError> {
        let (column, value): (&str, Value) = match change {
            MovementChange::Amount(amount) => ("amount", Value::Text(amount.to_string())),
            MovementChange::Description(text) => ("description", Value::Text(text.clone())),
            MovementChange::Category(Some(c)) => ("category_id", Value::Integer(c.0)),
            MovementChange::Category(None) => ("category_id", Value::Null),
            MovementChange::Date(date) => {
                ("date", Value::Text(date.format("%Y-%m-%d").to_string()))
            }
        };
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE movements SET {} = ?1, updated_at = datetime('now') WHERE id = ?2",
                    column
                ),
                params![value, id.0],
            )
            .map_err(sql_err("Failed to update movement"))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("movement {}", id.0)));
        }
        self.get_movement(id)?
            .ok_or_else(|| StoreError::NotFound(format!("movement {} after update", id.0)))
    }

    pub fn list_movements(&self, filter: &MovementFilter) -> Result<Vec<Movement>, StoreError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        match &filter.visibility {
            Visibility::Everything => {}
            Visibility::Tenants {
                tenants,
                personal_of,
            } => {
                let mut keys: Vec<String> = tenants
                    .iter()
                    .map(|t| MovementScope::Tenant(t.clone()).key())
                    .collect();
                keys.push(MovementScope::Personal(*personal_of).key());
                let mut placeholders = Vec::with_capacity(keys.len());
                for key in keys {
                    values.push(Value::Text(key));
                    placeholders.push(format!("?{}", values.len()));
                }
                clauses.push(format!("scope_key IN ({})", placeholders.join(", ")));
            }
            Visibility::CreatedBy(user) => {
                values.push(Value::Integer(user.0));
                clauses.push(format!("created_by = ?{}", values.len()));
            }
        }
        if let Some(month) = filter.month {
            values.push(Value::Text(month.to_string()));
            clauses.push(format!("substr(date, 1, 7) = ?{}", values.len()));
        }
        if let Some(folio) = &filter.folio {
            values.push(Value::Text(folio.clone()));
            clauses.push(format!("folio = ?{}", values.len()));
        }

        let mut sql = MOVEMENT_SELECT.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY date DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(sql_err("Failed to prepare list_movements"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), MovementRow::from_row)
            .map_err(sql_err("Failed to query movements"))?;
        let mut movements = Vec::new();
        for row in rows {
            let r = row.map_err(sql_err("Failed to read movement row"))?;
            movements.push(r.into_movement()?);
        }
        Ok(movements)
    }

    // ── Categories ───────────────────────────────────────────────────

    pub fn list_categories(&self, scope: &MovementScope) -> Result<Vec<Category>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, scope_key, name FROM categories WHERE scope_key = ?1 ORDER BY name")
            .map_err(sql_err("Failed to prepare list_categories"))?;
        let rows = stmt
            .query_map(params![scope.key()], CategoryRow::from_row)
            .map_err(sql_err("Failed to query categories"))?;
        let mut categories = Vec::new();
        for row in rows {
            let r = row.map_err(sql_err("Failed to read category row"))?;
            categories.push(r.into_category()?);
        }
        Ok(categories)
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, scope_key, name FROM categories WHERE id = ?1",
                params![id.0],
                CategoryRow::from_row,
            )
            .optional()
            .map_err(sql_err("Failed to query category"))?;
        row.map(CategoryRow::into_category).transpose()
    }

    pub fn create_category(
        &self,
        scope: &MovementScope,
        name: &str,
    ) -> Result<Category, StoreError> {
        self.conn
            .execute(
                "INSERT INTO categories (scope_key, name) VALUES (?1, ?2)",
                params![scope.key(), name],
            )
            .map_err(sql_err("Failed to insert category"))?;
        let id = CategoryId(self.conn.last_insert_rowid());
        self.get_category(id)?
            .ok_or_else(|| StoreError::NotFound(format!("category {} after insert", id)))
    }

    pub fn rename_category(&self, id: CategoryId, name: &str) -> Result<Category, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE categories SET name = ?1 WHERE id = ?2",
                params![name, id.0],
            )
            .map_err(sql_err("Failed to rename category"))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("category {}", id)));
        }
        self.get_category(id)?
            .ok_or_else(|| StoreError::NotFound(format!("category {} after rename", id)))
    }

    pub fn delete_category(&self, id: CategoryId) -> Result<(), StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id.0])
            .map_err(sql_err("Failed to delete category"))?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("category {}", id)));
        }
        Ok(())
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub fn load_session(&self, conversation: &str) -> Result<Option<SessionRecord>, StoreError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT payload, last_activity FROM sessions WHERE conversation_id = ?1",
                params![conversation],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(sql_err("Failed to query session"))?;
        match row {
            Some((payload, last_activity)) => {
                let last_activity = DateTime::parse_from_rfc3339(&last_activity)
                    .map_err(|e| {
                        StoreError::Corrupt(format!(
                            "session {} last_activity '{}': {}",
                            conversation, last_activity, e
                        ))
                    })?
                    .with_timezone(&Utc);
                Ok(Some(SessionRecord {
                    payload,
                    last_activity,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn save_session(&self, conversation: &str, record: &SessionRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO sessions (conversation_id, payload, last_activity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                    payload = excluded.payload,
                    last_activity = excluded.last_activity",
                params![
                    conversation,
                    record.payload,
                    record.last_activity.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
            )
            .map_err(sql_err("Failed to save session"))?;
        Ok(())
    }

    pub fn clear_session(&self, conversation: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE conversation_id = ?1",
                params![conversation],
            )
            .map_err(sql_err("Failed to clear session"))?;
        Ok(())
    }
}

const MOVEMENT_SELECT: &str = "SELECT id, folio, kind, scope_key, amount, description, category_id, photo, date, created_by, created_at FROM movements";

struct UserRow {
    id: i64,
    name: String,
    role: String,
    home_tenant: Option<String>,
    super_admin: bool,
}

impl UserRow {
    fn into_actor(self) -> Result<Actor, StoreError> {
        let role = Role::from_str(&self.role).map_err(StoreError::Corrupt)?;
        Ok(Actor {
            id: UserId(self.id),
            name: self.name,
            role,
            home_tenant: self.home_tenant.map(TenantId),
            super_admin: self.super_admin,
        })
    }
}

struct MovementRow {
    id: i64,
    folio: String,
    kind: String,
    scope_key: String,
    amount: String,
    description: String,
    category_id: Option<i64>,
    photo: Option<String>,
    date: String,
    created_by: i64,
    created_at: String,
}

impl MovementRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            folio: row.get(1)?,
            kind: row.get(2)?,
            scope_key: row.get(3)?,
            amount: row.get(4)?,
            description: row.get(5)?,
            category_id: row.get(6)?,
            photo: row.get(7)?,
            date: row.get(8)?,
            created_by: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_movement(self) -> Result<Movement, StoreError> {
        let kind = MovementKind::from_str(&self.kind).map_err(StoreError::Corrupt)?;
        let scope = MovementScope::parse_key(&self.scope_key).map_err(StoreError::Corrupt)?;
        let amount = Decimal::from_str(&self.amount).map_err(|e| {
            StoreError::Corrupt(format!("movement {} amount '{}': {}", self.id, self.amount, e))
        })?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d").map_err(|e| {
            StoreError::Corrupt(format!("movement {} date '{}': {}", self.id, self.date, e))
        })?;
        Ok(Movement {
            id: MovementId(self.id),
            folio: self.folio,
            kind,
            scope,
            amount,
            description: self.description,
            category: self.category_id.map(CategoryId),
            photo: self.photo,
            date,
            created_by: UserId(self.created_by),
            created_at: self.created_at,
        })
    }
}

struct CategoryRow {
    id: i64,
    scope_key: String,
    name: String,
}

impl CategoryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            scope_key: row.get(1)?,
            name: row.get(2)?,
        })
    }

    fn into_category(self) -> Result<Category, StoreError> {
        Ok(Category {
            id: CategoryId(self.id),
            scope: MovementScope::parse_key(&self.scope_key).map_err(StoreError::Corrupt)?,
            name: self.name,
        })
    }
}
