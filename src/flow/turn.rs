//! Inbound turns, discrete actions, and the outcomes returned to a transport.

use std::fmt;
use std::str::FromStr;

use ledgerbot_common::{CategoryId, MovementId, Role, TenantId};
use serde::{Deserialize, Serialize};

/// One inbound message from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Text(String),
    Action(Action),
    /// Reference to an uploaded attachment (receipt photo).
    Photo(String),
}

impl Turn {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

impl From<Action> for Turn {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

/// Target of the expense-type choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Personal,
    Company,
}

/// Field of an existing movement that can be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditField {
    Amount,
    Description,
    Category,
    Date,
}

impl EditField {
    pub const ALL: [EditField; 4] = [Self::Amount, Self::Description, Self::Category, Self::Date];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amount => "amount",
            Self::Description => "description",
            Self::Category => "category",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryOp {
    Create,
    Rename,
    Delete,
}

impl CategoryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Rename => "rename",
            Self::Delete => "delete",
        }
    }
}

/// Discrete choice token. Its text form (`Display` / `FromStr`) is what a
/// transport attaches to a button, e.g. `company:acme` or `date:1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Confirm,
    Cancel,
    Skip,
    Type(ScopeKind),
    Company(TenantId),
    /// `None` is the explicit "no category" choice.
    Category(Option<CategoryId>),
    /// Quick-pick date, in days before today.
    Date(u8),
    Movement(MovementId),
    Field(EditField),
    CategoryOp(CategoryOp),
    Role(Role),
}

/// Largest quick-pick offset (today and the four days before it).
pub const MAX_QUICK_DATE: u8 = 4;

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirm => f.write_str("confirm"),
            Self::Cancel => f.write_str("cancel"),
            Self::Skip => f.write_str("skip"),
            Self::Type(ScopeKind::Personal) => f.write_str("type:personal"),
            Self::Type(ScopeKind::Company) => f.write_str("type:company"),
            Self::Company(t) => write!(f, "company:{}", t),
            Self::Category(None) => f.write_str("category:none"),
            Self::Category(Some(id)) => write!(f, "category:{}", id),
            Self::Date(days) => write!(f, "date:{}", days),
            Self::Movement(id) => write!(f, "movement:{}", id),
            Self::Field(field) => write!(f, "field:{}", field.as_str()),
            Self::CategoryOp(op) => write!(f, "cat:{}", op.as_str()),
            Self::Role(role) => write!(f, "role:{}", role),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("Unknown action: {}", s);
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        let action = match (name, arg) {
            ("confirm", None) => Self::Confirm,
            ("cancel", None) => Self::Cancel,
            ("skip", None) => Self::Skip,
            ("type", Some("personal")) => Self::Type(ScopeKind::Personal),
            ("type", Some("company")) => Self::Type(ScopeKind::Company),
            ("company", Some(id)) if !id.is_empty() => Self::Company(TenantId::new(id)),
            ("category", Some("none")) => Self::Category(None),
            ("category", Some(id)) => {
                Self::Category(Some(CategoryId(id.parse().map_err(|_| invalid())?)))
            }
            ("date", Some(days)) => {
                let days: u8 = days.parse().map_err(|_| invalid())?;
                if days > MAX_QUICK_DATE {
                    return Err(invalid());
                }
                Self::Date(days)
            }
            ("movement", Some(id)) => Self::Movement(MovementId(id.parse().map_err(|_| invalid())?)),
            ("field", Some(field)) => Self::Field(
                EditField::ALL
                    .into_iter()
                    .find(|f| f.as_str() == field)
                    .ok_or_else(invalid)?,
            ),
            ("cat", Some("create")) => Self::CategoryOp(CategoryOp::Create),
            ("cat", Some("rename")) => Self::CategoryOp(CategoryOp::Rename),
            ("cat", Some("delete")) => Self::CategoryOp(CategoryOp::Delete),
            ("role", Some(role)) => Self::Role(role.parse()?),
            _ => return Err(invalid()),
        };
        Ok(action)
    }
}

/// A presented choice: the action it sends and the label shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub action: Action,
    pub label: String,
}

impl Choice {
    pub fn new(action: Action, label: impl Into<String>) -> Self {
        Self {
            action,
            label: label.into(),
        }
    }
}

/// Outbound message: text plus optional choices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub choices: Vec<Choice>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: Vec::new(),
        }
    }

    pub fn choice(mut self, action: Action, label: impl Into<String>) -> Self {
        self.choices.push(Choice::new(action, label));
        self
    }

    /// Append the cancel choice offered on every step.
    pub fn cancellable(self) -> Self {
        self.choice(Action::Cancel, "Cancel")
    }
}

/// Result of handling one turn. Only infrastructure failures are `Err`;
/// everything the user should see is one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A new flow began. `replaced` is set when an earlier draft was dropped.
    Started { replaced: bool, prompt: Prompt },
    /// A new flow was refused because another draft is active.
    Busy { active: &'static str, prompt: Prompt },
    /// The flow cannot start for this actor.
    Unavailable { message: String },
    /// Input accepted; this is the next step.
    Advanced(Prompt),
    /// Input rejected; the same step is asked again.
    Rejected { reason: String, prompt: Prompt },
    /// Terminal authorization failed; the draft is kept.
    Denied { reason: String, prompt: Prompt },
    /// Terminal write failed; the draft is kept.
    Failed { message: String, prompt: Prompt },
    Completed { message: String },
    Cancelled,
    /// The stored draft was stale or unreadable and has been dropped.
    Discarded { message: String },
    /// No draft is active.
    Idle,
}

impl TurnOutcome {
    /// Prompt the transport should render next, if any.
    pub fn prompt(&self) -> Option<&Prompt> {
        match self {
            Self::Started { prompt, .. }
            | Self::Busy { prompt, .. }
            | Self::Advanced(prompt)
            | Self::Rejected { prompt, .. }
            | Self::Denied { prompt, .. }
            | Self::Failed { prompt, .. } => Some(prompt),
            Self::Unavailable { .. }
            | Self::Completed { .. }
            | Self::Cancelled
            | Self::Discarded { .. }
            | Self::Idle => None,
        }
    }
}
