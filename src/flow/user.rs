use chrono::NaiveDate;
use ledgerbot_common::{Actor, Capability, Role, TenantId, UserId};
use serde::{Deserialize, Serialize};

use super::draft::verify_text;
use super::turn::{Action, Prompt, Turn};
use super::validate::check_length;
use super::{Begin, Commit, Flow, StepContext, Transition, confirm_or_cancel, pick_from_list};
use crate::auth::{AuthDecision, AuthorizationEngine, DenialReason};
use crate::errors::FlowError;

/// Attaching a person to a company with a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddUserDraft {
    pub step: AddUserStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub tenant: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum AddUserStep {
    TenantSelect {
        tenants: Vec<TenantId>,
    },
    UserId {
        tenant: TenantId,
    },
    Name {
        tenant: TenantId,
        user_id: UserId,
    },
    Role {
        tenant: TenantId,
        user_id: UserId,
        name: String,
        roles: Vec<Role>,
    },
    FinalConfirm(NewMember),
}

impl AddUserDraft {
    pub(crate) async fn begin(ctx: &StepContext<'_>) -> Result<Begin<Self>, FlowError> {
        if AuthorizationEngine::assignable_roles(ctx.auth.effective_role(ctx.actor)).is_empty() {
            return Ok(Begin::Unavailable(
                "Your role cannot assign roles to other users".into(),
            ));
        }
        let mut tenants = ctx
            .auth
            .tenants_with(ctx.actor, Capability::ManageUsers)
            .await?;
        let step = match tenants.len() {
            0 => {
                return Ok(Begin::Unavailable(
                    "You cannot manage users in any company".into(),
                ));
            }
            1 => AddUserStep::UserId {
                tenant: tenants.remove(0),
            },
            _ => AddUserStep::TenantSelect { tenants },
        };
        Ok(Begin::Ready(Self { step }))
    }
}

impl Flow for AddUserDraft {
    type Pending = NewMember;

    const STEPS: &'static [&'static str] =
        &["tenant_select", "user_id", "name", "role", "final_confirm"];

    fn step_name(&self) -> &'static str {
        match &self.step {
            AddUserStep::TenantSelect { .. } => "tenant_select",
            AddUserStep::UserId { .. } => "user_id",
            AddUserStep::Name { .. } => "name",
            AddUserStep::Role { .. } => "role",
            AddUserStep::FinalConfirm(_) => "final_confirm",
        }
    }

    fn prompt(&self, _today: NaiveDate) -> Prompt {
        let prompt = match &self.step {
            AddUserStep::TenantSelect { tenants } => tenants.iter().fold(
                Prompt::new("Add the user to which company?"),
                |p, t| p.choice(Action::Company(t.clone()), t.to_string()),
            ),
            AddUserStep::UserId { tenant } => {
                Prompt::new(format!("Chat user id of the person to add to {}", tenant))
            }
            AddUserStep::Name { .. } => Prompt::new("Their name"),
            AddUserStep::Role { roles, .. } => roles.iter().fold(
                Prompt::new("Which role?"),
                |p, r| p.choice(Action::Role(*r), r.label()),
            ),
            AddUserStep::FinalConfirm(member) => Prompt::new(format!(
                "Add {} ({}) to {} as {}?",
                member.name,
                member.user_id,
                member.tenant,
                member.role.label()
            ))
            .choice(Action::Confirm, "Confirm"),
        };
        prompt.cancellable()
    }

    fn verify(&self) -> Result<(), String> {
        match &self.step {
            AddUserStep::TenantSelect { tenants } if tenants.len() < 2 => {
                Err("company choice offered with fewer than two companies".into())
            }
            AddUserStep::Role { name, roles, .. } => {
                if roles.is_empty() {
                    return Err("role step without assignable roles".into());
                }
                verify_text(name, "name")
            }
            AddUserStep::FinalConfirm(member) => {
                verify_text(&member.name, "name")
            }
            _ => Ok(()),
        }
    }

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, NewMember>, FlowError> {
        let next = match (&self.step, turn) {
            (AddUserStep::TenantSelect { tenants }, Turn::Action(Action::Company(tenant)))
                if tenants.contains(&tenant) =>
            {
                AddUserStep::UserId { tenant }
            }
            (AddUserStep::UserId { tenant }, Turn::Text(text)) => {
                let user_id = match text.trim().parse::<i64>() {
                    Ok(id) if id > 0 => UserId(id),
                    _ => {
                        return Ok(Transition::Reject(
                            "A user id is a positive number".into(),
                        ));
                    }
                };
                if user_id == ctx.actor.id {
                    return Ok(Transition::Reject(
                        "You cannot change your own membership".into(),
                    ));
                }
                AddUserStep::Name {
                    tenant: tenant.clone(),
                    user_id,
                }
            }
            (AddUserStep::UserId { .. }, _) => {
                return Ok(Transition::Reject("Type the user's numeric id".into()));
            }
            (AddUserStep::Name { tenant, user_id }, Turn::Text(text)) => {
                let limits = ctx.limits;
                match check_length(&text, limits.name_min, limits.name_max, "name") {
                    Ok(name) => AddUserStep::Role {
                        tenant: tenant.clone(),
                        user_id: *user_id,
                        name,
                        roles: AuthorizationEngine::assignable_roles(
                            ctx.auth.effective_role(ctx.actor),
                        ),
                    },
                    Err(reason) => return Ok(Transition::Reject(reason)),
                }
            }
            (AddUserStep::Name { .. }, _) => {
                return Ok(Transition::Reject("Type the user's name".into()));
            }
            (
                AddUserStep::Role {
                    tenant,
                    user_id,
                    name,
                    roles,
                },
                Turn::Action(Action::Role(role)),
            ) if roles.contains(&role) => AddUserStep::FinalConfirm(NewMember {
                tenant: tenant.clone(),
                user_id: *user_id,
                name: name.clone(),
                role,
            }),
            (AddUserStep::FinalConfirm(member), Turn::Action(Action::Confirm)) => {
                return Ok(Transition::Confirm(member.clone()));
            }
            (AddUserStep::FinalConfirm(_), _) => return Ok(confirm_or_cancel()),
            _ => return Ok(pick_from_list()),
        };
        Ok(Transition::Advance(Self { step: next }))
    }

    async fn commit(ctx: &StepContext<'_>, member: NewMember) -> Result<Commit, FlowError> {
        let decision = ctx
            .auth
            .authorize(ctx.actor, &member.tenant, Capability::ManageUsers)
            .await?;
        if let AuthDecision::Denied(reason) = decision {
            return Ok(Commit::Denied(reason));
        }
        let manager = ctx.auth.effective_role(ctx.actor);
        if !AuthorizationEngine::can_manage_role(manager, member.role) {
            return Ok(Commit::Denied(DenialReason::RoleOutOfReach {
                target: member.role,
            }));
        }

        match ctx.directory.find_actor(member.user_id).await? {
            Some(existing) if !AuthorizationEngine::can_manage_role(manager, existing.role) => {
                return Ok(Commit::Denied(DenialReason::RoleOutOfReach {
                    target: existing.role,
                }));
            }
            Some(_) => {}
            None => {
                let mut actor = Actor::new(member.user_id.0, member.name.clone(), member.role);
                actor.home_tenant = Some(member.tenant.clone());
                ctx.directory.register_actor(&actor).await?;
            }
        }
        ctx.auth
            .grants()
            .upsert_grant(member.user_id, &member.tenant, member.role.default_permissions())
            .await?;
        Ok(Commit::Done(format!(
            "{} added to {} as {}",
            member.name,
            member.tenant,
            member.role.label()
        )))
    }
}
