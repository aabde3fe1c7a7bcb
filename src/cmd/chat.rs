//! Console chat: `ledgerbot chat`.

use anyhow::Result;
use ledgerbot::app::App;
use ledgerbot::chat::run_console;
use ledgerbot::ledger_config::LedgerConfig;
use ledgerbot_common::UserId;

pub async fn cmd_chat(config: LedgerConfig, user: i64, conversation: Option<String>) -> Result<()> {
    let app = App::open(config)?;
    let actor = app.actor(UserId(user)).await?;
    let conversation = conversation.unwrap_or_else(|| format!("console:{}", actor.id));
    let engine = app.engine();

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_console(&engine, &actor, &conversation, stdin.lock(), stdout.lock()).await
}
