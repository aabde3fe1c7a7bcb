use chrono::NaiveDate;
use ledgerbot_common::{Category, CategoryId};
use serde::{Deserialize, Serialize};

use super::category::CategoryDraft;
use super::edit::EditDraft;
use super::register::RegisterDraft;
use super::tenant::TenantDraft;
use super::turn::{Action, MAX_QUICK_DATE, Prompt};
use super::user::AddUserDraft;
use super::validate::{quick_date, quick_date_label};
use super::Flow;

/// The one in-progress flow of a conversation, tagged by flow kind.
///
/// Each variant's step enum carries exactly the fields collected so far, so
/// a field of an unreached step cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum ActiveDraft {
    RegisterMovement(RegisterDraft),
    EditMovement(EditDraft),
    ManageCategory(CategoryDraft),
    AddUser(AddUserDraft),
    RegisterTenant(TenantDraft),
}

impl ActiveDraft {
    pub fn flow_name(&self) -> &'static str {
        match self {
            Self::RegisterMovement(_) => "register_movement",
            Self::EditMovement(_) => "edit_movement",
            Self::ManageCategory(_) => "manage_category",
            Self::AddUser(_) => "add_user",
            Self::RegisterTenant(_) => "register_tenant",
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            Self::RegisterMovement(d) => d.step_name(),
            Self::EditMovement(d) => d.step_name(),
            Self::ManageCategory(d) => d.step_name(),
            Self::AddUser(d) => d.step_name(),
            Self::RegisterTenant(d) => d.step_name(),
        }
    }

    /// Position of the current step in its flow's graph.
    pub fn step_index(&self) -> usize {
        match self {
            Self::RegisterMovement(d) => d.step_index(),
            Self::EditMovement(d) => d.step_index(),
            Self::ManageCategory(d) => d.step_index(),
            Self::AddUser(d) => d.step_index(),
            Self::RegisterTenant(d) => d.step_index(),
        }
    }

    pub fn prompt(&self, today: NaiveDate) -> Prompt {
        match self {
            Self::RegisterMovement(d) => d.prompt(today),
            Self::EditMovement(d) => d.prompt(today),
            Self::ManageCategory(d) => d.prompt(today),
            Self::AddUser(d) => d.prompt(today),
            Self::RegisterTenant(d) => d.prompt(today),
        }
    }

    pub fn verify(&self) -> Result<(), String> {
        match self {
            Self::RegisterMovement(d) => d.verify(),
            Self::EditMovement(d) => d.verify(),
            Self::ManageCategory(d) => d.verify(),
            Self::AddUser(d) => d.verify(),
            Self::RegisterTenant(d) => d.verify(),
        }
    }
}

impl From<RegisterDraft> for ActiveDraft {
    fn from(d: RegisterDraft) -> Self {
        Self::RegisterMovement(d)
    }
}

impl From<EditDraft> for ActiveDraft {
    fn from(d: EditDraft) -> Self {
        Self::EditMovement(d)
    }
}

impl From<CategoryDraft> for ActiveDraft {
    fn from(d: CategoryDraft) -> Self {
        Self::ManageCategory(d)
    }
}

impl From<AddUserDraft> for ActiveDraft {
    fn from(d: AddUserDraft) -> Self {
        Self::AddUser(d)
    }
}

impl From<TenantDraft> for ActiveDraft {
    fn from(d: TenantDraft) -> Self {
        Self::RegisterTenant(d)
    }
}

/// A category as remembered inside a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: CategoryId,
    pub name: String,
}

impl From<Category> for CategoryRef {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
        }
    }
}

/// Category choices plus the explicit "no category" choice.
pub(crate) fn category_prompt(text: &str, options: &[CategoryRef]) -> Prompt {
    options
        .iter()
        .fold(Prompt::new(text), |p, c| {
            p.choice(Action::Category(Some(c.id)), c.name.clone())
        })
        .choice(Action::Category(None), "No category")
}

/// Quick-pick date choices counted back from `today`.
pub(crate) fn date_prompt(text: &str, today: NaiveDate) -> Prompt {
    (0..=MAX_QUICK_DATE).fold(Prompt::new(text), |p, days| {
        let date = quick_date(today, days);
        p.choice(
            Action::Date(days),
            format!("{} ({})", quick_date_label(days), date.format("%d/%m")),
        )
    })
}

/// Check a stored text field is non-empty and trimmed.
pub(crate) fn verify_text(value: &str, what: &str) -> Result<(), String> {
    if !value.is_empty() && value.trim() == value {
        Ok(())
    } else {
        Err(format!("{} is empty or untrimmed", what))
    }
}

/// Check a stored amount is positive.
pub(crate) fn verify_amount(amount: rust_decimal::Decimal) -> Result<(), String> {
    if amount > rust_decimal::Decimal::ZERO {
        Ok(())
    } else {
        Err(format!("amount {} is not positive", amount))
    }
}
