use chrono::NaiveDate;
use ledgerbot_common::{Capability, MovementScope, TenantId};
use serde::{Deserialize, Serialize};

use super::draft::{CategoryRef, verify_text};
use super::turn::{Action, CategoryOp, Prompt, ScopeKind, Turn};
use super::validate::check_length;
use super::{Begin, Commit, Flow, StepContext, Transition, confirm_or_cancel, pick_from_list};
use crate::auth::AuthDecision;
use crate::errors::FlowError;

/// Creating, renaming or deleting a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub step: CategoryStep,
}

/// A fully specified category change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CategoryChange {
    Create {
        scope: MovementScope,
        name: String,
    },
    Rename {
        scope: MovementScope,
        target: CategoryRef,
        name: String,
    },
    Delete {
        scope: MovementScope,
        target: CategoryRef,
    },
}

impl CategoryChange {
    fn scope(&self) -> &MovementScope {
        match self {
            Self::Create { scope, .. } | Self::Rename { scope, .. } | Self::Delete { scope, .. } => {
                scope
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CategoryStep {
    Operation {
        companies: Vec<TenantId>,
    },
    /// Offered only when the actor can edit in at least one company.
    ScopeSelect {
        op: CategoryOp,
        companies: Vec<TenantId>,
    },
    Target {
        op: CategoryOp,
        scope: MovementScope,
        options: Vec<CategoryRef>,
    },
    Name {
        op: CategoryOp,
        scope: MovementScope,
        target: Option<CategoryRef>,
    },
    FinalConfirm(CategoryChange),
}

impl CategoryDraft {
    pub(crate) async fn begin(ctx: &StepContext<'_>) -> Result<Begin<Self>, FlowError> {
        let companies = ctx.auth.tenants_with(ctx.actor, Capability::Edit).await?;
        Ok(Begin::Ready(Self {
            step: CategoryStep::Operation { companies },
        }))
    }

    /// Step that follows once the scope is known.
    async fn after_scope(
        ctx: &StepContext<'_>,
        op: CategoryOp,
        scope: MovementScope,
    ) -> Result<Result<CategoryStep, String>, FlowError> {
        if op == CategoryOp::Create {
            return Ok(Ok(CategoryStep::Name {
                op,
                scope,
                target: None,
            }));
        }
        let options: Vec<CategoryRef> = ctx
            .ledger
            .list_categories(&scope)
            .await?
            .into_iter()
            .map(CategoryRef::from)
            .collect();
        if options.is_empty() {
            return Ok(Err(format!("There are no {} categories yet", scope)));
        }
        Ok(Ok(CategoryStep::Target { op, scope, options }))
    }
}

impl Flow for CategoryDraft {
    type Pending = CategoryChange;

    const STEPS: &'static [&'static str] =
        &["operation", "scope_select", "target", "name", "final_confirm"];

    fn step_name(&self) -> &'static str {
        match &self.step {
            CategoryStep::Operation { .. } => "operation",
            CategoryStep::ScopeSelect { .. } => "scope_select",
            CategoryStep::Target { .. } => "target",
            CategoryStep::Name { .. } => "name",
            CategoryStep::FinalConfirm(_) => "final_confirm",
        }
    }

    fn prompt(&self, _today: NaiveDate) -> Prompt {
        let prompt = match &self.step {
            CategoryStep::Operation { .. } => Prompt::new("What do you want to do with categories?")
                .choice(Action::CategoryOp(CategoryOp::Create), "Create")
                .choice(Action::CategoryOp(CategoryOp::Rename), "Rename")
                .choice(Action::CategoryOp(CategoryOp::Delete), "Delete"),
            CategoryStep::ScopeSelect { companies, .. } => companies.iter().fold(
                Prompt::new("Personal categories or a company's?")
                    .choice(Action::Type(ScopeKind::Personal), "Personal"),
                |p, c| p.choice(Action::Company(c.clone()), c.to_string()),
            ),
            CategoryStep::Target { op, options, .. } => options.iter().fold(
                Prompt::new(format!("Which category do you want to {}?", op.as_str())),
                |p, c| p.choice(Action::Category(Some(c.id)), c.name.clone()),
            ),
            CategoryStep::Name { target: None, .. } => Prompt::new("Name of the new category"),
            CategoryStep::Name {
                target: Some(target),
                ..
            } => Prompt::new(format!("New name for {}", target.name)),
            CategoryStep::FinalConfirm(change) => Prompt::new(match change {
                CategoryChange::Create { scope, name } => {
                    format!("Create {} category \"{}\"?", scope, name)
                }
                CategoryChange::Rename { target, name, .. } => {
                    format!("Rename \"{}\" to \"{}\"?", target.name, name)
                }
                CategoryChange::Delete { target, .. } => format!(
                    "Delete \"{}\"? Movements keep their data but lose the category.",
                    target.name
                ),
            })
            .choice(Action::Confirm, "Confirm"),
        };
        prompt.cancellable()
    }

    fn verify(&self) -> Result<(), String> {
        let named = |n: &str| verify_text(n, "category name");
        match &self.step {
            CategoryStep::ScopeSelect { companies, .. } if companies.is_empty() => {
                Err("scope choice offered without companies".into())
            }
            CategoryStep::Target {
                op: CategoryOp::Create,
                ..
            } => Err("create has no target step".into()),
            CategoryStep::Name {
                op: CategoryOp::Delete,
                ..
            } => Err("delete has no name step".into()),
            CategoryStep::FinalConfirm(
                CategoryChange::Create { name, .. } | CategoryChange::Rename { name, .. },
            ) => named(name),
            _ => Ok(()),
        }
    }

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, CategoryChange>, FlowError> {
        let scoped = match (&self.step, turn) {
            (CategoryStep::Operation { companies }, Turn::Action(Action::CategoryOp(op))) => {
                if companies.is_empty() {
                    Self::after_scope(ctx, op, MovementScope::Personal(ctx.actor.id)).await?
                } else {
                    Ok(CategoryStep::ScopeSelect {
                        op,
                        companies: companies.clone(),
                    })
                }
            }
            (CategoryStep::ScopeSelect { op, .. }, Turn::Action(Action::Type(ScopeKind::Personal))) => {
                Self::after_scope(ctx, *op, MovementScope::Personal(ctx.actor.id)).await?
            }
            (CategoryStep::ScopeSelect { op, companies }, Turn::Action(Action::Company(tenant)))
                if companies.contains(&tenant) =>
            {
                Self::after_scope(ctx, *op, MovementScope::Tenant(tenant)).await?
            }
            (
                CategoryStep::Target { op, scope, options },
                Turn::Action(Action::Category(Some(id))),
            ) => {
                let Some(target) = options.iter().find(|c| c.id == id).cloned() else {
                    return Ok(pick_from_list());
                };
                Ok(match op {
                    CategoryOp::Delete => CategoryStep::FinalConfirm(CategoryChange::Delete {
                        scope: scope.clone(),
                        target,
                    }),
                    _ => CategoryStep::Name {
                        op: *op,
                        scope: scope.clone(),
                        target: Some(target),
                    },
                })
            }
            (CategoryStep::Name { scope, target, .. }, Turn::Text(text)) => {
                let limits = ctx.limits;
                let name = match check_length(&text, limits.name_min, limits.name_max, "name") {
                    Ok(name) => name,
                    Err(reason) => return Ok(Transition::Reject(reason)),
                };
                let existing = ctx.ledger.list_categories(scope).await?;
                let clash = existing.iter().any(|c| {
                    c.name.eq_ignore_ascii_case(&name)
                        && target.as_ref().is_none_or(|t| t.id != c.id)
                });
                if clash {
                    return Ok(Transition::Reject(format!(
                        "A category named \"{}\" already exists",
                        name
                    )));
                }
                Ok(CategoryStep::FinalConfirm(match target {
                    None => CategoryChange::Create {
                        scope: scope.clone(),
                        name,
                    },
                    Some(target) => CategoryChange::Rename {
                        scope: scope.clone(),
                        target: target.clone(),
                        name,
                    },
                }))
            }
            (CategoryStep::Name { .. }, _) => {
                return Ok(Transition::Reject("Type the category name".into()));
            }
            (CategoryStep::FinalConfirm(change), Turn::Action(Action::Confirm)) => {
                return Ok(Transition::Confirm(change.clone()));
            }
            (CategoryStep::FinalConfirm(_), _) => return Ok(confirm_or_cancel()),
            _ => return Ok(pick_from_list()),
        };
        Ok(match scoped {
            Ok(step) => Transition::Advance(Self { step }),
            Err(reason) => Transition::Reject(reason),
        })
    }

    async fn commit(ctx: &StepContext<'_>, change: CategoryChange) -> Result<Commit, FlowError> {
        let decision = ctx
            .auth
            .authorize_scope(ctx.actor, change.scope(), Capability::Edit)
            .await?;
        if let AuthDecision::Denied(reason) = decision {
            return Ok(Commit::Denied(reason));
        }
        let message = match change {
            CategoryChange::Create { scope, name } => {
                let created = ctx.ledger.create_category(&scope, &name).await?;
                format!("Category \"{}\" created", created.name)
            }
            CategoryChange::Rename { target, name, .. } => {
                let renamed = ctx.ledger.rename_category(target.id, &name).await?;
                format!("Category \"{}\" renamed to \"{}\"", target.name, renamed.name)
            }
            CategoryChange::Delete { target, .. } => {
                ctx.ledger.delete_category(target.id).await?;
                format!("Category \"{}\" deleted", target.name)
            }
        };
        Ok(Commit::Done(message))
    }
}
