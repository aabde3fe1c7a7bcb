//! Identity seeding: `ledgerbot tenant`, `ledgerbot user`, `ledgerbot grant`.

use anyhow::{Context, Result};
use ledgerbot::app::App;
use ledgerbot::ledger_config::LedgerConfig;
use ledgerbot_common::{Actor, Directory, GrantStore, PermissionSet, Tenant, TenantId, UserId};

use super::super::{TenantCommands, UserCommands};

pub async fn cmd_tenant(config: LedgerConfig, command: TenantCommands) -> Result<()> {
    let app = App::open(config)?;
    match command {
        TenantCommands::Add {
            id,
            name,
            description,
        } => {
            let tenant = Tenant {
                id: TenantId::new(id),
                name,
                description,
            };
            app.db
                .create_tenant(&tenant)
                .await
                .with_context(|| format!("Failed to add company {}", tenant.id))?;
            println!("Added company {} ({})", tenant.id, tenant.name);
        }
        TenantCommands::List => {
            let tenants = app.db.list_tenants().await?;
            if tenants.is_empty() {
                println!("No companies registered.");
            }
            for tenant in tenants {
                match &tenant.description {
                    Some(d) => println!("{:<20} {} - {}", tenant.id, tenant.name, d),
                    None => println!("{:<20} {}", tenant.id, tenant.name),
                }
            }
        }
    }
    Ok(())
}

pub async fn cmd_user(config: LedgerConfig, command: UserCommands) -> Result<()> {
    let app = App::open(config)?;
    match command {
        UserCommands::Add {
            id,
            name,
            role,
            home,
            super_admin,
        } => {
            let mut actor = Actor::new(id, name, role);
            actor.home_tenant = home.map(TenantId::new);
            actor.super_admin = super_admin;
            app.db
                .register_actor(&actor)
                .await
                .with_context(|| format!("Failed to add user {}", actor.id))?;
            println!("Added user {} ({}) as {}", actor.id, actor.name, actor.role);
        }
    }
    Ok(())
}

/// Overwrite a user's grant. Without flags the user's role template is used.
pub async fn cmd_grant(
    config: LedgerConfig,
    user: i64,
    tenant: &str,
    [view, edit, report, manage_users]: [bool; 4],
) -> Result<()> {
    let app = App::open(config)?;
    let actor = app.actor(UserId(user)).await?;
    let permissions = if view || edit || report || manage_users {
        PermissionSet {
            can_view: view,
            can_edit: edit,
            can_report: report,
            can_manage_users: manage_users,
        }
    } else {
        actor.role.default_permissions()
    };
    let tenant = TenantId::new(tenant);
    app.db.upsert_grant(actor.id, &tenant, permissions).await?;
    println!(
        "Granted {} in {}: view={} edit={} report={} manage_users={}",
        actor.id,
        tenant,
        permissions.can_view,
        permissions.can_edit,
        permissions.can_report,
        permissions.can_manage_users
    );
    Ok(())
}
