//! Report envelope: which movements an actor's report may include.
//!
//! | Scope    | Included movements                                         |
//! |----------|------------------------------------------------------------|
//! | `OWN`    | created by the actor                                       |
//! | `TENANT` | in tenants where the actor can report, plus own personal   |
//! | `ALL`    | everything                                                 |

use std::fmt::Write as _;

use ledgerbot_common::{
    Actor, Capability, Ledger, Movement, MovementFilter, MovementKind, StoreError, Visibility,
    YearMonth,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::auth::{AuthorizationEngine, ReportScope};

/// Query bound for one actor's report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFilter {
    pub scope: ReportScope,
    pub filter: MovementFilter,
}

impl ReportFilter {
    pub async fn for_actor(
        auth: &AuthorizationEngine,
        actor: &Actor,
        month: Option<YearMonth>,
    ) -> Result<Self, StoreError> {
        let scope = auth.report_scope(actor).await?;
        let visibility = match scope {
            ReportScope::All => Visibility::Everything,
            ReportScope::Own => Visibility::CreatedBy(actor.id),
            ReportScope::Tenant => Visibility::Tenants {
                tenants: auth.tenants_with(actor, Capability::Report).await?,
                personal_of: actor.id,
            },
        };
        let mut filter = MovementFilter::new(visibility);
        if let Some(month) = month {
            filter = filter.in_month(month);
        }
        debug!(actor = %actor.id, %scope, "Report filter built");
        Ok(Self { scope, filter })
    }

    pub async fn run(&self, ledger: &dyn Ledger) -> Result<Report, StoreError> {
        let movements = ledger.list_movements(&self.filter).await?;
        Ok(Report {
            scope: self.scope,
            movements,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub scope: ReportScope,
    pub movements: Vec<Movement>,
}

impl Report {
    pub fn total(&self, kind: MovementKind) -> Decimal {
        self.movements
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.amount)
            .sum()
    }

    /// Plain-text table followed by totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Report scope: {}", self.scope);
        if self.movements.is_empty() {
            out.push_str("No movements.\n");
            return out;
        }
        let _ = writeln!(
            out,
            "{:<16} {:<10} {:<8} {:<16} {:>12}  {}",
            "FOLIO", "DATE", "KIND", "SCOPE", "AMOUNT", "DESCRIPTION"
        );
        for m in &self.movements {
            let _ = writeln!(
                out,
                "{:<16} {:<10} {:<8} {:<16} {:>12}  {}",
                m.folio,
                m.date,
                m.kind,
                m.scope.to_string(),
                m.amount,
                m.description
            );
        }
        let _ = writeln!(
            out,
            "\nIncome: {}  Expense: {}",
            self.total(MovementKind::Income),
            self.total(MovementKind::Expense)
        );
        out
    }
}
