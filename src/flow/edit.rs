use chrono::NaiveDate;
use ledgerbot_common::{
    Capability, Movement, MovementChange, MovementFilter, MovementId, MovementScope, UserId,
    Visibility,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::draft::{CategoryRef, category_prompt, date_prompt, verify_amount, verify_text};
use super::turn::{Action, EditField, Prompt, Turn};
use super::validate::{check_length, parse_amount, parse_custom_date, quick_date};
use super::{Begin, Commit, Flow, StepContext, Transition, confirm_or_cancel, pick_from_list};
use crate::auth::AuthDecision;
use crate::errors::FlowError;

/// How many recent movements are offered as choices.
const RECENT_CHOICES: u32 = 5;

/// Replacing one field of an already saved movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditDraft {
    pub step: EditStep,
}

/// The movement being edited, as it was when selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditTarget {
    pub id: MovementId,
    pub folio: String,
    pub scope: MovementScope,
    pub created_by: UserId,
    pub amount: Decimal,
    pub description: String,
    pub date: NaiveDate,
}

impl From<Movement> for EditTarget {
    fn from(m: Movement) -> Self {
        Self {
            id: m.id,
            folio: m.folio,
            scope: m.scope,
            created_by: m.created_by,
            amount: m.amount,
            description: m.description,
            date: m.date,
        }
    }
}

impl EditTarget {
    fn label(&self) -> String {
        format!(
            "{} {} {} ({})",
            self.folio,
            self.date.format("%d/%m"),
            self.amount,
            self.description
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum EditStep {
    SelectMovement {
        recent: Vec<EditTarget>,
    },
    FieldSelect {
        target: EditTarget,
    },
    NewValue {
        target: EditTarget,
        field: EditField,
        /// Filled only when `field` is the category.
        #[serde(default)]
        options: Vec<CategoryRef>,
    },
    FinalConfirm {
        target: EditTarget,
        change: MovementChange,
        /// Human-readable new value.
        shown: String,
    },
}

/// Movements the actor may pick for editing.
async fn editable(ctx: &StepContext<'_>) -> Result<Visibility, FlowError> {
    if ctx.auth.is_super_admin(ctx.actor) {
        return Ok(Visibility::Everything);
    }
    Ok(Visibility::Tenants {
        tenants: ctx.auth.tenants_with(ctx.actor, Capability::Edit).await?,
        personal_of: ctx.actor.id,
    })
}

impl EditDraft {
    pub(crate) async fn begin(ctx: &StepContext<'_>) -> Result<Begin<Self>, FlowError> {
        let filter = MovementFilter::new(editable(ctx).await?).limit(RECENT_CHOICES);
        let recent: Vec<EditTarget> = ctx
            .ledger
            .list_movements(&filter)
            .await?
            .into_iter()
            .map(EditTarget::from)
            .collect();
        if recent.is_empty() {
            return Ok(Begin::Unavailable(
                "There are no movements you can edit yet".into(),
            ));
        }
        Ok(Begin::Ready(Self {
            step: EditStep::SelectMovement { recent },
        }))
    }

    async fn select(
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Result<EditTarget, String>, FlowError> {
        let visibility = editable(ctx).await?;
        match turn {
            Turn::Action(Action::Movement(id)) => match ctx.ledger.get_movement(id).await? {
                Some(m) if visibility.admits(&m) => Ok(Ok(m.into())),
                _ => Ok(Err("That movement is no longer available".into())),
            },
            Turn::Text(text) => {
                let folio = text.trim();
                let mut found = ctx
                    .ledger
                    .list_movements(&MovementFilter::new(visibility).with_folio(folio))
                    .await?;
                match found.len() {
                    0 => Ok(Err(format!("No movement with folio {} found", folio))),
                    1 => Ok(Ok(found.remove(0).into())),
                    _ => Ok(Err(format!(
                        "Several movements use folio {}; pick one from the list",
                        folio
                    ))),
                }
            }
            _ => Ok(Err("Type a folio or pick a movement".into())),
        }
    }
}

impl Flow for EditDraft {
    type Pending = (EditTarget, MovementChange);

    const STEPS: &'static [&'static str] =
        &["select_movement", "field_select", "new_value", "final_confirm"];

    fn step_name(&self) -> &'static str {
        match &self.step {
            EditStep::SelectMovement { .. } => "select_movement",
            EditStep::FieldSelect { .. } => "field_select",
            EditStep::NewValue { .. } => "new_value",
            EditStep::FinalConfirm { .. } => "final_confirm",
        }
    }

    fn prompt(&self, today: NaiveDate) -> Prompt {
        let prompt = match &self.step {
            EditStep::SelectMovement { recent } => recent.iter().fold(
                Prompt::new("Which movement? Type its folio or pick one"),
                |p, m| p.choice(Action::Movement(m.id), m.label()),
            ),
            EditStep::FieldSelect { target } => EditField::ALL.into_iter().fold(
                Prompt::new(format!("Editing {}. What do you want to change?", target.label())),
                |p, f| p.choice(Action::Field(f), f.as_str()),
            ),
            EditStep::NewValue { field, options, .. } => match field {
                EditField::Amount => Prompt::new("Type the new amount"),
                EditField::Description => Prompt::new("Type the new description"),
                EditField::Category => category_prompt("Pick the new category", options),
                EditField::Date => date_prompt("Pick the new date or type dd/mm", today),
            },
            EditStep::FinalConfirm {
                target,
                change,
                shown,
            } => Prompt::new(format!(
                "Change the {} of {} to {}?",
                change_field(change).as_str(),
                target.folio,
                shown
            ))
            .choice(Action::Confirm, "Save"),
        };
        prompt.cancellable()
    }

    fn verify(&self) -> Result<(), String> {
        match &self.step {
            EditStep::NewValue { field, options, .. }
                if *field != EditField::Category && !options.is_empty() =>
            {
                Err("category options attached to another field".into())
            }
            EditStep::FinalConfirm {
                change: MovementChange::Amount(amount),
                ..
            } => verify_amount(*amount),
            EditStep::FinalConfirm {
                change: MovementChange::Description(d),
                ..
            } => verify_text(d, "description"),
            _ => Ok(()),
        }
    }

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, Self::Pending>, FlowError> {
        let next = match (&self.step, turn) {
            (EditStep::SelectMovement { .. }, turn) => match Self::select(ctx, turn).await? {
                Ok(target) => EditStep::FieldSelect { target },
                Err(reason) => return Ok(Transition::Reject(reason)),
            },
            (EditStep::FieldSelect { target }, Turn::Action(Action::Field(field))) => {
                let options = if field == EditField::Category {
                    ctx.ledger
                        .list_categories(&target.scope)
                        .await?
                        .into_iter()
                        .map(CategoryRef::from)
                        .collect()
                } else {
                    Vec::new()
                };
                EditStep::NewValue {
                    target: target.clone(),
                    field,
                    options,
                }
            }
            (
                EditStep::NewValue {
                    target,
                    field,
                    options,
                },
                turn,
            ) => {
                let (change, shown) = match new_value(ctx, *field, options, turn) {
                    Ok(value) => value,
                    Err(reason) => return Ok(Transition::Reject(reason)),
                };
                EditStep::FinalConfirm {
                    target: target.clone(),
                    change,
                    shown,
                }
            }
            (EditStep::FinalConfirm { target, change, .. }, Turn::Action(Action::Confirm)) => {
                return Ok(Transition::Confirm((target.clone(), change.clone())));
            }
            (EditStep::FinalConfirm { .. }, _) => return Ok(confirm_or_cancel()),
            _ => return Ok(pick_from_list()),
        };
        Ok(Transition::Advance(Self { step: next }))
    }

    async fn commit(
        ctx: &StepContext<'_>,
        (target, change): Self::Pending,
    ) -> Result<Commit, FlowError> {
        let decision = ctx
            .auth
            .authorize_movement_edit(ctx.actor, &target.scope, target.created_by)
            .await?;
        if let AuthDecision::Denied(reason) = decision {
            return Ok(Commit::Denied(reason));
        }
        let updated = ctx.ledger.update_movement(target.id, &change).await?;
        Ok(Commit::Done(format!("Movement {} updated", updated.folio)))
    }
}

fn change_field(change: &MovementChange) -> EditField {
    match change {
        MovementChange::Amount(_) => EditField::Amount,
        MovementChange::Description(_) => EditField::Description,
        MovementChange::Category(_) => EditField::Category,
        MovementChange::Date(_) => EditField::Date,
    }
}

/// Validate the replacement value with the rule of its field.
fn new_value(
    ctx: &StepContext<'_>,
    field: EditField,
    options: &[CategoryRef],
    turn: Turn,
) -> Result<(MovementChange, String), String> {
    let limits = ctx.limits;
    match (field, turn) {
        (EditField::Amount, Turn::Text(text)) => {
            let amount = parse_amount(&text, limits.max_amount)?;
            Ok((MovementChange::Amount(amount), amount.to_string()))
        }
        (EditField::Description, Turn::Text(text)) => {
            let description = check_length(
                &text,
                limits.description_min,
                limits.edit_description_max,
                "description",
            )?;
            Ok((MovementChange::Description(description.clone()), description))
        }
        (EditField::Category, Turn::Action(Action::Category(None))) => {
            Ok((MovementChange::Category(None), "no category".into()))
        }
        (EditField::Category, Turn::Action(Action::Category(Some(id)))) => options
            .iter()
            .find(|c| c.id == id)
            .map(|c| (MovementChange::Category(Some(c.id)), c.name.clone()))
            .ok_or_else(|| "Please pick one of the options".to_string()),
        (EditField::Date, Turn::Action(Action::Date(days))) => {
            let date = quick_date(ctx.today, days);
            Ok((MovementChange::Date(date), date.format("%d/%m/%Y").to_string()))
        }
        (EditField::Date, Turn::Text(text)) => {
            let date = parse_custom_date(&text, ctx.today)?;
            Ok((MovementChange::Date(date), date.format("%d/%m/%Y").to_string()))
        }
        (EditField::Amount | EditField::Description, _) => Err("Type the new value".into()),
        _ => Err("Please pick one of the options".into()),
    }
}
