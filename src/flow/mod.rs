//! Guided-dialog engine.
//!
//! A conversation holds at most one [`ActiveDraft`]. Every turn loads it,
//! feeds the input to the current step, and either re-prompts the same step
//! with a reason, stores the advanced draft, or (on confirm) runs the flow's
//! terminal write. Drafts are persisted between turns; nothing is kept in
//! memory across the turn boundary.
//!
//! | Flow               | Steps                                                                  |
//! |--------------------|------------------------------------------------------------------------|
//! | `register_movement`| expense_type, company_select, amount, description, category, photo, date, final_confirm |
//! | `edit_movement`    | select_movement, field_select, new_value, final_confirm                |
//! | `manage_category`  | operation, scope_select, target, name, final_confirm                   |
//! | `add_user`         | tenant_select, user_id, name, role, final_confirm                      |
//! | `register_tenant`  | name, description, final_confirm                                       |

mod category;
mod draft;
mod edit;
mod engine;
mod register;
mod tenant;
#[cfg(test)]
pub(crate) mod testing;
mod turn;
mod user;
pub mod validate;

pub use category::{CategoryChange, CategoryDraft, CategoryStep};
pub use draft::{ActiveDraft, CategoryRef};
pub use edit::{EditDraft, EditStep, EditTarget};
pub use engine::{FlowEngine, FlowKind, FlowSettings};
pub use register::{MovementDraft, RegisterDraft, RegisterStep};
pub use tenant::{TenantDraft, TenantStep};
pub use turn::{
    Action, CategoryOp, Choice, EditField, MAX_QUICK_DATE, Prompt, ScopeKind, Turn, TurnOutcome,
};
pub use user::{AddUserDraft, AddUserStep, NewMember};

use chrono::NaiveDate;
use ledgerbot_common::{Actor, Directory, Ledger};

use crate::auth::{AuthorizationEngine, DenialReason};
use crate::errors::FlowError;
use crate::ledger_config::LimitsSection;
use crate::sequence::SequenceGenerator;

/// Collaborators and per-turn facts available to a step.
pub(crate) struct StepContext<'a> {
    pub actor: &'a Actor,
    pub limits: &'a LimitsSection,
    pub today: NaiveDate,
    pub ledger: &'a dyn Ledger,
    pub directory: &'a dyn Directory,
    pub auth: &'a AuthorizationEngine,
    pub sequence: &'a SequenceGenerator,
}

/// Outcome of starting a flow.
pub(crate) enum Begin<D> {
    Ready(D),
    Unavailable(String),
}

impl<D: Into<ActiveDraft>> Begin<D> {
    fn into_active(self) -> Begin<ActiveDraft> {
        match self {
            Begin::Ready(draft) => Begin::Ready(draft.into()),
            Begin::Unavailable(message) => Begin::Unavailable(message),
        }
    }
}

/// Outcome of feeding one turn to the current step.
pub(crate) enum Transition<D, P> {
    /// Input accepted; the draft moved to a later step.
    Advance(D),
    /// Input rejected; the draft is unchanged.
    Reject(String),
    /// Confirmed at `final_confirm`; `P` is what the terminal write needs.
    Confirm(P),
}

/// Outcome of a terminal write that did not fail.
pub(crate) enum Commit {
    Done(String),
    Denied(DenialReason),
}

/// One flow kind's step graph.
pub(crate) trait Flow: Sized + Into<ActiveDraft> {
    type Pending;

    /// Step names in graph order.
    const STEPS: &'static [&'static str];

    fn step_name(&self) -> &'static str;

    fn step_index(&self) -> usize {
        let name = self.step_name();
        Self::STEPS.iter().position(|s| *s == name).unwrap_or(0)
    }

    fn prompt(&self, today: NaiveDate) -> Prompt;

    /// Re-check the invariants of already-collected fields on a loaded
    /// draft. A failure means the stored draft cannot be trusted.
    fn verify(&self) -> Result<(), String>;

    async fn advance(
        &self,
        ctx: &StepContext<'_>,
        turn: Turn,
    ) -> Result<Transition<Self, Self::Pending>, FlowError>;

    /// Authorize, then write. Denials are returned as values.
    async fn commit(ctx: &StepContext<'_>, pending: Self::Pending) -> Result<Commit, FlowError>;
}

/// Rejection used when a choice step receives anything but one of its
/// choices.
pub(crate) fn pick_from_list<D, P>() -> Transition<D, P> {
    Transition::Reject("Please pick one of the options".into())
}

/// Rejection used by every `final_confirm` step.
pub(crate) fn confirm_or_cancel<D, P>() -> Transition<D, P> {
    Transition::Reject("Please confirm or cancel".into())
}
