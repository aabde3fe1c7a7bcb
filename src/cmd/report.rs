//! Movement report: `ledgerbot report`.

use anyhow::Result;
use ledgerbot::app::App;
use ledgerbot::ledger_config::LedgerConfig;
use ledgerbot::report::ReportFilter;
use ledgerbot_common::{UserId, YearMonth};

pub async fn cmd_report(config: LedgerConfig, user: i64, month: Option<&str>) -> Result<()> {
    let month = month
        .map(|m| m.parse::<YearMonth>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --month: {}", e))?;

    let app = App::open(config)?;
    let actor = app.actor(UserId(user)).await?;
    let report = ReportFilter::for_actor(&app.auth, &actor, month)
        .await?
        .run(app.db.as_ref())
        .await?;
    print!("{}", report.render());
    Ok(())
}
