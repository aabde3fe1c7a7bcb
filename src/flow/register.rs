use chrono::NaiveDate;
use ledgerbot_common::{Capability, MovementKind, MovementScope, NewMovement, TenantId, YearMonth};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::draft::{CategoryRef, category_prompt, date_prompt, verify_amount, verify_text};
use super::turn::{Action, Prompt, ScopeKind, Turn};
use super::validate::{check_length, parse_amount, parse_custom_date, quick_date};
use super::{Begin, Commit, Flow, StepContext, Transition, confirm_or_cancel, pick_from_list};
use crate::auth::AuthDecision;
use crate::errors::FlowError;
use crate::sequence::FolioScope;

/// Recording a new expense or income.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDraft {
    pub kind: MovementKind,
    pub step: RegisterStep,
}

/// Everything collected once the date step is passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDraft {
    pub scope: MovementScope,
    pub amount: Decimal,
    pub description: String,
    pub category: Option<CategoryRef>,
    pub photo: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum RegisterStep {
    /// Personal or company. `companies` are the actor's eligible tenants.
    ExpenseType {
        companies: Vec<TenantId>,
    },
    CompanySelect {
        companies: Vec<TenantId>,
    },
    Amount {
        scope: MovementScope,
    },
    Description {
        scope: MovementScope,
        amount: Decimal,
    },
    Category {
        scope: MovementScope,
        amount: Decimal,
        description: String,
        options: Vec<CategoryRef>,
    },
    Photo {
        scope: MovementScope,
        amount: Decimal,
        description: String,
        category: Option<CategoryRef>,
    },
    Date {
        scope: MovementScope,
        amount: Decimal,
        description: String,
        category: Option<CategoryRef>,
        photo: Option<String>,
    },
    FinalConfirm(MovementDraft),
}

impl RegisterDraft {
    /// Resolve the branch skips once, when the flow starts.
    pub(crate) async fn begin(
        ctx: &StepContext<'_>,
        kind: MovementKind,
    ) -> Result<Begin<Self>, FlowError> {
        let companies = ctx.auth.accessible_companies(ctx.actor).await?;
        let step = if companies.is_empty() {
            RegisterStep::Amount {
                scope: MovementScope::Personal(ctx.actor.id),
            }
        } else {
            RegisterStep::ExpenseType { companies }
        };
        Ok(Begin::Ready(Self { kind, step }))
    }

    fn with(&self, step: RegisterStep) -> Self {
        Self {
            kind: self.kind,
            step,
        }
    }
}

impl Flow for RegisterDraft {
    type Pending = NewMovement;

    const STEPS: &'static [&'static str] = &[
        "expense_type",
        "company_select",
        "amount",
        "description",
        "category",
        "photo",
        "date",
        "final_confirm",
    ];

    fn step_name(&self) -> &'static str {
        match &self.step {
            RegisterStep::ExpenseType { .. } => "expense_type",
            RegisterStep::CompanySelect { .. } => "company_select",
            RegisterStep::Amount { .. } => "amount",
            RegisterStep::Description { .. } => "description",
            RegisterStep::Category { .. } => "category",
            RegisterStep::Photo { .. } => "photo",
            RegisterStep::Date { .. } => "date",
            RegisterStep::FinalConfirm(_) => "final_confirm",
        }
    }

    fn prompt(&self, today: NaiveDate) -> Prompt {
        let noun = self.kind.as_str();
        let prompt = match &self.step {
            RegisterStep::ExpenseType { .. } => Prompt::new(format!("Is this {} personal or for a company?", noun))
                .choice(Action::Type(ScopeKind::Personal), "Personal")
                .choice(Action::Type(ScopeKind::Company), "Company"),
            RegisterStep::CompanySelect { companies } => companies.iter().fold(
                Prompt::new("Which company?"),
                |p, c| p.choice(Action::Company(c.clone()), c.to_string()),
            ),
            RegisterStep::Amount { scope } => {
                Prompt::new(format!("New {} ({}). How much?", noun, scope))
            }
            RegisterStep::Description { .. } => Prompt::new("Describe it briefly"),
            RegisterStep::Category { options, .. } => category_prompt("Pick a category", options),
            RegisterStep::Photo { .. } => {
                Prompt::new("Send a photo of the receipt, or skip").choice(Action::Skip, "Skip")
            }
            RegisterStep::Date { .. } => date_prompt("When was it? Pick a day or type dd/mm", today),
            RegisterStep::FinalConfirm(entry) => Prompt::new(summary(self.kind, entry))
                .choice(Action::Confirm, "Save"),
        };
        prompt.cancellable()
    }

    fn verify(&self) -> Result<(), String> {
        let describe = |d: &str| verify_text(d, "description");
        match &self.step {
            RegisterStep::ExpenseType { companies } if companies.is_empty() => {
                Err("expense type offered without companies".into())
            }
            RegisterStep::CompanySelect { companies } if companies.len() < 2 => {
                Err("company choice offered with fewer than two companies".into())
            }
            RegisterStep::ExpenseType { .. }
            | RegisterStep::CompanySelect { .. }
            | RegisterStep::Amount { .. } => Ok(()),
            RegisterStep::Description { amount, .. } => verify_amount(*amount),
            RegisterStep::Category {
                amount, description, ..
            }
            | RegisterStep::Photo {
                amount, description, ..
            }
            | RegisterStep::Date {
                amount, description, ..
            } => {
                verify_amount(*amount)?;
                describe(description)
            }
            RegisterStep::FinalConfirm(entry) => {
                verify_amount(entry.amount)?;
                describe(&entry.description)
            }
        }
    }

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, NewMovement>, FlowError> {
        let next = match (&self.step, turn) {
            (RegisterStep::ExpenseType { .. }, Turn::Action(Action::Type(ScopeKind::Personal))) => {
                RegisterStep::Amount {
                    scope: MovementScope::Personal(ctx.actor.id),
                }
            }
            (RegisterStep::ExpenseType { companies }, Turn::Action(Action::Type(ScopeKind::Company))) => {
                match companies.as_slice() {
                    [only] => RegisterStep::Amount {
                        scope: MovementScope::Tenant(only.clone()),
                    },
                    _ => RegisterStep::CompanySelect {
                        companies: companies.clone(),
                    },
                }
            }
            (RegisterStep::CompanySelect { companies }, Turn::Action(Action::Company(tenant)))
                if companies.contains(&tenant) =>
            {
                RegisterStep::Amount {
                    scope: MovementScope::Tenant(tenant),
                }
            }
            (RegisterStep::Amount { scope }, Turn::Text(text)) => {
                match parse_amount(&text, ctx.limits.max_amount) {
                    Ok(amount) => RegisterStep::Description {
                        scope: scope.clone(),
                        amount,
                    },
                    Err(reason) => return Ok(Transition::Reject(reason)),
                }
            }
            (RegisterStep::Amount { .. }, _) => {
                return Ok(Transition::Reject("Type the amount".into()));
            }
            (RegisterStep::Description { scope, amount }, Turn::Text(text)) => {
                let limits = ctx.limits;
                let description = match check_length(
                    &text,
                    limits.description_min,
                    limits.description_max,
                    "description",
                ) {
                    Ok(d) => d,
                    Err(reason) => return Ok(Transition::Reject(reason)),
                };
                let options = ctx
                    .ledger
                    .list_categories(scope)
                    .await?
                    .into_iter()
                    .map(CategoryRef::from)
                    .collect();
                RegisterStep::Category {
                    scope: scope.clone(),
                    amount: *amount,
                    description,
                    options,
                }
            }
            (RegisterStep::Description { .. }, _) => {
                return Ok(Transition::Reject("Type a short description".into()));
            }
            (
                RegisterStep::Category {
                    scope,
                    amount,
                    description,
                    options,
                },
                Turn::Action(Action::Category(choice)),
            ) => {
                let category = match choice {
                    None => None,
                    Some(id) => match options.iter().find(|c| c.id == id) {
                        Some(c) => Some(c.clone()),
                        None => return Ok(pick_from_list()),
                    },
                };
                RegisterStep::Photo {
                    scope: scope.clone(),
                    amount: *amount,
                    description: description.clone(),
                    category,
                }
            }
            (
                RegisterStep::Photo {
                    scope,
                    amount,
                    description,
                    category,
                },
                turn @ (Turn::Action(Action::Skip) | Turn::Photo(_)),
            ) => RegisterStep::Date {
                scope: scope.clone(),
                amount: *amount,
                description: description.clone(),
                category: category.clone(),
                photo: match turn {
                    Turn::Photo(reference) => Some(reference),
                    _ => None,
                },
            },
            (RegisterStep::Photo { .. }, _) => {
                return Ok(Transition::Reject("Send a photo or choose skip".into()));
            }
            (
                RegisterStep::Date {
                    scope,
                    amount,
                    description,
                    category,
                    photo,
                },
                turn,
            ) => {
                let date = match turn {
                    Turn::Action(Action::Date(days)) => quick_date(ctx.today, days),
                    Turn::Text(text) => match parse_custom_date(&text, ctx.today) {
                        Ok(date) => date,
                        Err(reason) => return Ok(Transition::Reject(reason)),
                    },
                    _ => return Ok(pick_from_list()),
                };
                RegisterStep::FinalConfirm(MovementDraft {
                    scope: scope.clone(),
                    amount: *amount,
                    description: description.clone(),
                    category: category.clone(),
                    photo: photo.clone(),
                    date,
                })
            }
            (RegisterStep::FinalConfirm(entry), Turn::Action(Action::Confirm)) => {
                return Ok(Transition::Confirm(NewMovement {
                    kind: self.kind,
                    scope: entry.scope.clone(),
                    amount: entry.amount,
                    description: entry.description.clone(),
                    category: entry.category.as_ref().map(|c| c.id),
                    photo: entry.photo.clone(),
                    date: entry.date,
                    created_by: ctx.actor.id,
                }));
            }
            (RegisterStep::FinalConfirm(_), _) => return Ok(confirm_or_cancel()),
            _ => return Ok(pick_from_list()),
        };
        Ok(Transition::Advance(self.with(next)))
    }

    async fn commit(ctx: &StepContext<'_>, movement: NewMovement) -> Result<Commit, FlowError> {
        let decision = ctx
            .auth
            .authorize_scope(ctx.actor, &movement.scope, Capability::Edit)
            .await?;
        if let AuthDecision::Denied(reason) = decision {
            return Ok(Commit::Denied(reason));
        }

        let scope = FolioScope::new(movement.scope.clone(), YearMonth::of(ctx.today));
        let (folio, _) = ctx
            .sequence
            .issue(&scope, |folio| {
                let movement = &movement;
                async move { ctx.ledger.create_movement(movement, &folio).await }
            })
            .await?;
        Ok(Commit::Done(format!(
            "Saved {} {} for {}",
            movement.kind, folio, movement.amount
        )))
    }
}

fn summary(kind: MovementKind, entry: &MovementDraft) -> String {
    let mut lines = vec![
        format!("Confirm this {}:", kind),
        format!("  Scope: {}", entry.scope),
        format!("  Amount: {}", entry.amount),
        format!("  Description: {}", entry.description),
        format!(
            "  Category: {}",
            entry.category.as_ref().map_or("none", |c| c.name.as_str())
        ),
        format!("  Date: {}", entry.date.format("%d/%m/%Y")),
    ];
    if entry.photo.is_some() {
        lines.push("  Receipt photo attached".into());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::Harness;
    use ledgerbot_common::{Actor, Role, UserId};

    fn at_amount(actor: &Actor) -> RegisterDraft {
        RegisterDraft {
            kind: MovementKind::Expense,
            step: RegisterStep::Amount {
                scope: MovementScope::Personal(actor.id),
            },
        }
    }

    #[tokio::test]
    async fn test_amount_rejects_text_without_setting_field() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let draft = at_amount(&actor);

        let transition = draft.advance(&h.ctx(&actor), Turn::text("abc")).await.unwrap();
        assert!(matches!(transition, Transition::Reject(_)));
        assert_eq!(draft.step_name(), "amount");
    }

    #[tokio::test]
    async fn test_amount_accepts_decimal_and_moves_to_description() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);

        let transition = at_amount(&actor)
            .advance(&h.ctx(&actor), Turn::text("150.50"))
            .await
            .unwrap();
        let Transition::Advance(next) = transition else {
            panic!("expected advance");
        };
        assert_eq!(next.step_name(), "description");
        assert_eq!(
            next.step,
            RegisterStep::Description {
                scope: MovementScope::Personal(UserId(7)),
                amount: Decimal::new(15050, 2),
            }
        );
    }

    #[tokio::test]
    async fn test_begin_without_companies_goes_straight_to_amount() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let Begin::Ready(draft) = RegisterDraft::begin(&h.ctx(&actor), MovementKind::Expense)
            .await
            .unwrap()
        else {
            panic!("expected ready");
        };
        assert_eq!(draft.step_name(), "amount");
    }

    #[tokio::test]
    async fn test_single_company_skips_company_select() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator).with_home("acme");
        let Begin::Ready(draft) = RegisterDraft::begin(&h.ctx(&actor), MovementKind::Expense)
            .await
            .unwrap()
        else {
            panic!("expected ready");
        };
        assert_eq!(draft.step_name(), "expense_type");

        let Transition::Advance(next) = draft
            .advance(&h.ctx(&actor), Turn::Action(Action::Type(ScopeKind::Company)))
            .await
            .unwrap()
        else {
            panic!("expected advance");
        };
        assert_eq!(
            next.step,
            RegisterStep::Amount {
                scope: MovementScope::Tenant(TenantId::new("acme"))
            }
        );
    }

    #[tokio::test]
    async fn test_company_outside_offered_list_is_rejected() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let draft = RegisterDraft {
            kind: MovementKind::Expense,
            step: RegisterStep::CompanySelect {
                companies: vec![TenantId::new("a"), TenantId::new("b")],
            },
        };
        let transition = draft
            .advance(&h.ctx(&actor), Turn::Action(Action::Company(TenantId::new("c"))))
            .await
            .unwrap();
        assert!(matches!(transition, Transition::Reject(_)));
    }

    #[tokio::test]
    async fn test_category_is_never_taken_from_free_text() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let draft = RegisterDraft {
            kind: MovementKind::Expense,
            step: RegisterStep::Category {
                scope: MovementScope::Personal(actor.id),
                amount: Decimal::ONE,
                description: "Bus fare".into(),
                options: vec![],
            },
        };
        let transition = draft.advance(&h.ctx(&actor), Turn::text("Travel")).await.unwrap();
        assert!(matches!(transition, Transition::Reject(_)));

        let Transition::Advance(next) = draft
            .advance(&h.ctx(&actor), Turn::Action(Action::Category(None)))
            .await
            .unwrap()
        else {
            panic!("expected advance");
        };
        assert_eq!(next.step_name(), "photo");
    }

    #[tokio::test]
    async fn test_photo_step_accepts_attachment_or_skip_only() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let draft = RegisterDraft {
            kind: MovementKind::Expense,
            step: RegisterStep::Photo {
                scope: MovementScope::Personal(actor.id),
                amount: Decimal::ONE,
                description: "Bus fare".into(),
                category: None,
            },
        };
        assert!(matches!(
            draft.advance(&h.ctx(&actor), Turn::text("here")).await.unwrap(),
            Transition::Reject(_)
        ));
        let Transition::Advance(next) = draft
            .advance(&h.ctx(&actor), Turn::Photo("file-123".into()))
            .await
            .unwrap()
        else {
            panic!("expected advance");
        };
        match next.step {
            RegisterStep::Date { photo, .. } => assert_eq!(photo.as_deref(), Some("file-123")),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_date_quick_pick_and_custom_entry() {
        let h = Harness::new().await;
        let actor = Actor::new(7, "Pat", Role::Operator);
        let draft = RegisterDraft {
            kind: MovementKind::Expense,
            step: RegisterStep::Date {
                scope: MovementScope::Personal(actor.id),
                amount: Decimal::ONE,
                description: "Bus fare".into(),
                category: None,
                photo: None,
            },
        };
        let ctx = h.ctx(&actor);
        let Transition::Advance(next) = draft.advance(&ctx, Turn::Action(Action::Date(1))).await.unwrap()
        else {
            panic!("expected advance");
        };
        match &next.step {
            RegisterStep::FinalConfirm(entry) => assert_eq!(entry.date, quick_date(ctx.today, 1)),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(matches!(
            draft.advance(&ctx, Turn::text("32/01")).await.unwrap(),
            Transition::Reject(_)
        ));
    }

    #[test]
    fn test_final_prompt_summarizes_draft() {
        let draft = RegisterDraft {
            kind: MovementKind::Income,
            step: RegisterStep::FinalConfirm(MovementDraft {
                scope: MovementScope::Personal(UserId(1)),
                amount: Decimal::new(15050, 2),
                description: "Consulting".into(),
                category: Some(CategoryRef {
                    id: ledgerbot_common::CategoryId(3),
                    name: "Services".into(),
                }),
                photo: None,
                date: NaiveDate::from_ymd_opt(2024, 8, 14).unwrap(),
            }),
        };
        let prompt = draft.prompt(NaiveDate::from_ymd_opt(2024, 8, 14).unwrap());
        assert!(prompt.text.contains("150.50"));
        assert!(prompt.text.contains("Services"));
        assert!(prompt.text.contains("14/08/2024"));
        assert_eq!(prompt.choices.len(), 2);
    }
}
