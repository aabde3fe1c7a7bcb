use std::sync::Arc;

use ledgerbot_common::{
    Actor, Directory, Ledger, MovementKind, SessionRecord, SessionStore, StoreError,
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::category::CategoryDraft;
use super::draft::ActiveDraft;
use super::edit::EditDraft;
use super::register::RegisterDraft;
use super::tenant::TenantDraft;
use super::turn::{Action, Turn, TurnOutcome};
use super::user::AddUserDraft;
use super::{Begin, Commit, Flow, StepContext, Transition};
use crate::auth::AuthorizationEngine;
use crate::clock::Clock;
use crate::errors::FlowError;
use crate::ledger_config::{LedgerToml, LimitsSection, NewFlowPolicy};
use crate::sequence::SequenceGenerator;

const EXPIRED_MESSAGE: &str = "Your previous draft expired. Please start again.";
const CORRUPT_MESSAGE: &str = "Your previous draft could not be read. Please start again.";
const FAILED_MESSAGE: &str =
    "Something went wrong while saving. Your draft is kept; confirm again to retry.";

/// Flow to start on an explicit user command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    RegisterMovement(MovementKind),
    EditMovement,
    ManageCategory,
    AddUser,
    RegisterTenant,
}

/// Engine policies and input bounds.
#[derive(Debug, Clone, Default)]
pub struct FlowSettings {
    pub limits: LimitsSection,
    /// Drafts idle longer than this are discarded on load.
    pub draft_ttl: Option<chrono::Duration>,
    pub on_new_flow: NewFlowPolicy,
}

impl From<&LedgerToml> for FlowSettings {
    fn from(toml: &LedgerToml) -> Self {
        Self {
            limits: toml.limits.clone(),
            draft_ttl: toml.flow.draft_ttl(),
            on_new_flow: toml.flow.on_new_flow,
        }
    }
}

enum Loaded {
    Empty,
    Active(ActiveDraft),
    Discarded(&'static str),
}

/// Per-conversation dialog state machine.
pub struct FlowEngine {
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn Directory>,
    sessions: Arc<dyn SessionStore>,
    auth: Arc<AuthorizationEngine>,
    sequence: Arc<SequenceGenerator>,
    clock: Arc<dyn Clock>,
    settings: FlowSettings,
}

impl FlowEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn Directory>,
        sessions: Arc<dyn SessionStore>,
        auth: Arc<AuthorizationEngine>,
        sequence: Arc<SequenceGenerator>,
        clock: Arc<dyn Clock>,
        settings: FlowSettings,
    ) -> Self {
        Self {
            ledger,
            directory,
            sessions,
            auth,
            sequence,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    fn context<'a>(&'a self, actor: &'a Actor) -> StepContext<'a> {
        StepContext {
            actor,
            limits: &self.settings.limits,
            today: self.clock.today(),
            ledger: self.ledger.as_ref(),
            directory: self.directory.as_ref(),
            auth: &self.auth,
            sequence: &self.sequence,
        }
    }

    /// Start a flow, applying the configured policy to any active draft.
    pub async fn start(
        &self,
        conversation: &str,
        actor: &Actor,
        kind: FlowKind,
    ) -> Result<TurnOutcome, FlowError> {
        let span = info_span!("turn", conversation, actor = %actor.id, turn_id = %Uuid::new_v4());
        self.start_inner(conversation, actor, kind)
            .instrument(span)
            .await
    }

    async fn start_inner(
        &self,
        conversation: &str,
        actor: &Actor,
        kind: FlowKind,
    ) -> Result<TurnOutcome, FlowError> {
        let existing = match self.load(conversation).await? {
            Loaded::Active(draft) => Some(draft),
            Loaded::Empty | Loaded::Discarded(_) => None,
        };
        let ctx = self.context(actor);
        if let Some(active) = &existing
            && self.settings.on_new_flow == NewFlowPolicy::Reject
        {
            info!(active = active.flow_name(), ?kind, "New flow refused, draft already active");
            return Ok(TurnOutcome::Busy {
                active: active.flow_name(),
                prompt: active.prompt(ctx.today),
            });
        }

        let begun = match kind {
            FlowKind::RegisterMovement(k) => RegisterDraft::begin(&ctx, k).await?.into_active(),
            FlowKind::EditMovement => EditDraft::begin(&ctx).await?.into_active(),
            FlowKind::ManageCategory => CategoryDraft::begin(&ctx).await?.into_active(),
            FlowKind::AddUser => AddUserDraft::begin(&ctx).await?.into_active(),
            FlowKind::RegisterTenant => TenantDraft::begin().into_active(),
        };
        let draft = match begun {
            Begin::Ready(draft) => draft,
            Begin::Unavailable(message) => {
                debug!(?kind, %message, "Flow unavailable");
                return Ok(TurnOutcome::Unavailable { message });
            }
        };

        if let Some(previous) = &existing {
            info!(previous = previous.flow_name(), "Discarding active draft for new flow");
        }
        self.save(conversation, &draft).await?;
        info!(flow = draft.flow_name(), step = draft.step_name(), "Flow started");
        Ok(TurnOutcome::Started {
            replaced: existing.is_some(),
            prompt: draft.prompt(ctx.today),
        })
    }

    /// Feed one inbound turn to the conversation's active draft.
    pub async fn handle(
        &self,
        conversation: &str,
        actor: &Actor,
        turn: Turn,
    ) -> Result<TurnOutcome, FlowError> {
        let span = info_span!("turn", conversation, actor = %actor.id, turn_id = %Uuid::new_v4());
        self.handle_inner(conversation, actor, turn)
            .instrument(span)
            .await
    }

    async fn handle_inner(
        &self,
        conversation: &str,
        actor: &Actor,
        turn: Turn,
    ) -> Result<TurnOutcome, FlowError> {
        let draft = match self.load(conversation).await? {
            Loaded::Empty => return Ok(TurnOutcome::Idle),
            Loaded::Discarded(message) => {
                return Ok(TurnOutcome::Discarded {
                    message: message.to_string(),
                });
            }
            Loaded::Active(draft) => draft,
        };

        if turn == Turn::Action(Action::Cancel) {
            self.sessions
                .clear(conversation)
                .await
                .map_err(FlowError::Session)?;
            info!(flow = draft.flow_name(), step = draft.step_name(), "Flow cancelled");
            return Ok(TurnOutcome::Cancelled);
        }

        let ctx = self.context(actor);
        match draft {
            ActiveDraft::RegisterMovement(d) => self.drive(&ctx, conversation, d, turn).await,
            ActiveDraft::EditMovement(d) => self.drive(&ctx, conversation, d, turn).await,
            ActiveDraft::ManageCategory(d) => self.drive(&ctx, conversation, d, turn).await,
            ActiveDraft::AddUser(d) => self.drive(&ctx, conversation, d, turn).await,
            ActiveDraft::RegisterTenant(d) => self.drive(&ctx, conversation, d, turn).await,
        }
    }

    /// The active draft, if any. Expired or unreadable drafts are discarded.
    pub async fn current(&self, conversation: &str) -> Result<Option<ActiveDraft>, FlowError> {
        Ok(match self.load(conversation).await? {
            Loaded::Active(draft) => Some(draft),
            Loaded::Empty | Loaded::Discarded(_) => None,
        })
    }

    async fn drive<F: Flow>(
        &self,
        ctx: &StepContext<'_>,
        conversation: &str,
        flow: F,
        turn: Turn,
    ) -> Result<TurnOutcome, FlowError> {
        match flow.advance(ctx, turn).await? {
            Transition::Advance(next) => {
                debug!(from = flow.step_name(), to = next.step_name(), "Step advanced");
                let prompt = next.prompt(ctx.today);
                self.save(conversation, &next.into()).await?;
                Ok(TurnOutcome::Advanced(prompt))
            }
            Transition::Reject(reason) => {
                debug!(step = flow.step_name(), %reason, "Input rejected");
                let prompt = flow.prompt(ctx.today);
                self.save(conversation, &flow.into()).await?;
                Ok(TurnOutcome::Rejected { reason, prompt })
            }
            Transition::Confirm(pending) => {
                let prompt = flow.prompt(ctx.today);
                let draft: ActiveDraft = flow.into();
                match F::commit(ctx, pending).await {
                    Ok(Commit::Done(message)) => {
                        self.sessions
                            .clear(conversation)
                            .await
                            .map_err(FlowError::Session)?;
                        info!(flow = draft.flow_name(), %message, "Flow completed");
                        Ok(TurnOutcome::Completed { message })
                    }
                    Ok(Commit::Denied(reason)) => {
                        info!(flow = draft.flow_name(), %reason, "Confirmation denied, draft kept");
                        self.save(conversation, &draft).await?;
                        Ok(TurnOutcome::Denied {
                            reason: reason.to_string(),
                            prompt,
                        })
                    }
                    Err(err) => {
                        error!(flow = draft.flow_name(), error = %err, "Terminal write failed, draft kept");
                        self.save(conversation, &draft).await?;
                        Ok(TurnOutcome::Failed {
                            message: FAILED_MESSAGE.to_string(),
                            prompt,
                        })
                    }
                }
            }
        }
    }

    async fn load(&self, conversation: &str) -> Result<Loaded, FlowError> {
        let record = match self.sessions.load(conversation).await {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(Loaded::Empty),
            Err(StoreError::Corrupt(detail)) => {
                return self.discard(conversation, &detail, CORRUPT_MESSAGE).await;
            }
            Err(err) => return Err(FlowError::Session(err)),
        };

        if let Some(ttl) = self.settings.draft_ttl
            && self.clock.now() - record.last_activity > ttl
        {
            return self
                .discard(conversation, "idle longer than the draft TTL", EXPIRED_MESSAGE)
                .await;
        }

        let draft: ActiveDraft = match serde_json::from_str(&record.payload) {
            Ok(draft) => draft,
            Err(err) => {
                return self
                    .discard(conversation, &err.to_string(), CORRUPT_MESSAGE)
                    .await;
            }
        };
        if let Err(problem) = draft.verify() {
            return self.discard(conversation, &problem, CORRUPT_MESSAGE).await;
        }
        Ok(Loaded::Active(draft))
    }

    async fn discard(
        &self,
        conversation: &str,
        detail: &str,
        message: &'static str,
    ) -> Result<Loaded, FlowError> {
        warn!(%detail, "Discarding stored draft");
        self.sessions
            .clear(conversation)
            .await
            .map_err(FlowError::Session)?;
        Ok(Loaded::Discarded(message))
    }

    async fn save(&self, conversation: &str, draft: &ActiveDraft) -> Result<(), FlowError> {
        let record = SessionRecord {
            payload: serde_json::to_string(draft)?,
            last_activity: self.clock.now(),
        };
        self.sessions
            .save(conversation, &record)
            .await
            .map_err(FlowError::Session)
    }
}
