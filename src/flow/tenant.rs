use chrono::NaiveDate;
use ledgerbot_common::{PermissionSet, Role, Tenant, TenantId};
use serde::{Deserialize, Serialize};

use super::draft::verify_text;
use super::turn::{Action, Prompt, Turn};
use super::validate::check_length;
use super::{Begin, Commit, Flow, StepContext, Transition, confirm_or_cancel};
use crate::auth::DenialReason;
use crate::errors::FlowError;

/// Registering a new company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantDraft {
    pub step: TenantStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum TenantStep {
    Name,
    Description {
        name: String,
    },
    FinalConfirm {
        name: String,
        description: Option<String>,
    },
}

/// Minimum role allowed to create companies (super-admins always may).
const CREATOR_ROLE: Role = Role::OrganizationAdmin;

impl TenantDraft {
    pub(crate) fn begin() -> Begin<Self> {
        Begin::Ready(Self {
            step: TenantStep::Name,
        })
    }
}

/// Lowercase ASCII slug of `name`, e.g. `"Acme Corp."` → `acme-corp`.
pub(crate) fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "company".to_string()
    } else {
        slug
    }
}

impl Flow for TenantDraft {
    type Pending = (String, Option<String>);

    const STEPS: &'static [&'static str] = &["name", "description", "final_confirm"];

    fn step_name(&self) -> &'static str {
        match &self.step {
            TenantStep::Name => "name",
            TenantStep::Description { .. } => "description",
            TenantStep::FinalConfirm { .. } => "final_confirm",
        }
    }

    fn prompt(&self, _today: NaiveDate) -> Prompt {
        let prompt = match &self.step {
            TenantStep::Name => Prompt::new("Name of the new company"),
            TenantStep::Description { .. } => {
                Prompt::new("A short description, or skip").choice(Action::Skip, "Skip")
            }
            TenantStep::FinalConfirm { name, description } => Prompt::new(match description {
                Some(d) => format!("Create company \"{}\" ({})?", name, d),
                None => format!("Create company \"{}\"?", name),
            })
            .choice(Action::Confirm, "Create"),
        };
        prompt.cancellable()
    }

    fn verify(&self) -> Result<(), String> {
        match &self.step {
            TenantStep::Name => Ok(()),
            TenantStep::Description { name } => {
                verify_text(name, "company name")
            }
            TenantStep::FinalConfirm { name, description } => {
                verify_text(name, "company name")?;
                match description {
                    Some(d) => verify_text(d, "description"),
                    None => Ok(()),
                }
            }
        }
    }

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, Self::Pending>, FlowError> {
        let limits = ctx.limits;
        let next = match (&self.step, turn) {
            (TenantStep::Name, Turn::Text(text)) => {
                match check_length(&text, limits.name_min, limits.name_max, "name") {
                    Ok(name) => TenantStep::Description { name },
                    Err(reason) => return Ok(Transition::Reject(reason)),
                }
            }
            (TenantStep::Name, _) => {
                return Ok(Transition::Reject("Type the company name".into()));
            }
            (TenantStep::Description { name }, Turn::Action(Action::Skip)) => {
                TenantStep::FinalConfirm {
                    name: name.clone(),
                    description: None,
                }
            }
            (TenantStep::Description { name }, Turn::Text(text)) => {
                match check_length(
                    &text,
                    limits.description_min,
                    limits.description_max,
                    "description",
                ) {
                    Ok(description) => TenantStep::FinalConfirm {
                        name: name.clone(),
                        description: Some(description),
                    },
                    Err(reason) => return Ok(Transition::Reject(reason)),
                }
            }
            (TenantStep::Description { .. }, _) => {
                return Ok(Transition::Reject("Type a description or skip".into()));
            }
            (TenantStep::FinalConfirm { name, description }, Turn::Action(Action::Confirm)) => {
                return Ok(Transition::Confirm((name.clone(), description.clone())));
            }
            (TenantStep::FinalConfirm { .. }, _) => return Ok(confirm_or_cancel()),
        };
        Ok(Transition::Advance(Self { step: next }))
    }

    async fn commit(
        ctx: &StepContext<'_>,
        (name, description): Self::Pending,
    ) -> Result<Commit, FlowError> {
        if ctx.auth.effective_role(ctx.actor) < CREATOR_ROLE {
            return Ok(Commit::Denied(DenialReason::InsufficientRole {
                required: CREATOR_ROLE,
            }));
        }

        let base = slugify(&name);
        let mut id = TenantId::new(base.clone());
        let mut n = 2;
        while ctx.directory.get_tenant(&id).await?.is_some() {
            id = TenantId::new(format!("{}-{}", base, n));
            n += 1;
        }
        let tenant = Tenant {
            id: id.clone(),
            name,
            description,
        };
        ctx.directory.create_tenant(&tenant).await?;
        ctx.auth
            .grants()
            .upsert_grant(ctx.actor.id, &id, PermissionSet::all())
            .await?;
        Ok(Commit::Done(format!(
            "Company \"{}\" created with id {}",
            tenant.name, id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::Harness;
    use ledgerbot_common::{Actor, Directory, GrantStore};

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Acme Corp."), "acme-corp");
        assert_eq!(slugify("  Tacos  El Güero "), "tacos-el-g-ero");
        assert_eq!(slugify("!!!"), "company");
    }

    #[tokio::test]
    async fn test_description_can_be_skipped() {
        let h = Harness::new().await;
        let actor = Actor::new(1, "Org", Role::OrganizationAdmin);
        let draft = TenantDraft {
            step: TenantStep::Description {
                name: "Acme".into(),
            },
        };
        let Transition::Advance(next) = draft
            .advance(&h.ctx(&actor), Turn::Action(Action::Skip))
            .await
            .unwrap()
        else {
            panic!("expected advance");
        };
        assert_eq!(
            next.step,
            TenantStep::FinalConfirm {
                name: "Acme".into(),
                description: None
            }
        );
    }

    #[tokio::test]
    async fn test_company_admin_has_insufficient_role() {
        let h = Harness::new().await;
        let actor = Actor::new(1, "Co", Role::CompanyAdmin);
        let outcome = TenantDraft::commit(&h.ctx(&actor), ("Acme".into(), None))
            .await
            .unwrap();
        let Commit::Denied(reason) = outcome else {
            panic!("expected denial");
        };
        assert!(reason.to_string().starts_with("insufficient role"));
        assert!(h.db.list_tenants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_creator_gets_full_grant_and_unique_id() {
        let h = Harness::new().await;
        let actor = Actor::new(1, "Org", Role::OrganizationAdmin);
        for _ in 0..2 {
            let outcome = TenantDraft::commit(&h.ctx(&actor), ("Acme".into(), None))
                .await
                .unwrap();
            assert!(matches!(outcome, Commit::Done(_)));
        }
        let ids: Vec<String> = h
            .db
            .list_tenants()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id.0)
            .collect();
        assert!(ids.contains(&"acme".to_string()));
        assert!(ids.contains(&"acme-2".to_string()));
        assert_eq!(
            h.db.get_grant(actor.id, &TenantId::new("acme-2")).await.unwrap(),
            Some(PermissionSet::all())
        );
    }
}
