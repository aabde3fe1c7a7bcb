//! Console chat transport.
//!
//! Reads one chat turn per line and renders the engine's reply:
//!
//! | Input            | Meaning                                  |
//! |------------------|------------------------------------------|
//! | `/expense` etc.  | start a flow (see [`COMMANDS`])          |
//! | `!<action>`      | press a button, e.g. `!confirm`          |
//! | `@photo <ref>`   | send an attachment reference             |
//! | `/help`, `/quit` | transport-local                          |
//! | anything else    | free text for the current step           |

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use console::style;
use ledgerbot_common::{Actor, MovementKind};
use tracing::error;

use crate::flow::{Action, FlowEngine, FlowKind, Prompt, Turn, TurnOutcome};

/// Slash commands that start a flow.
pub const COMMANDS: &[(&str, FlowKind, &str)] = &[
    (
        "/expense",
        FlowKind::RegisterMovement(MovementKind::Expense),
        "register an expense",
    ),
    (
        "/income",
        FlowKind::RegisterMovement(MovementKind::Income),
        "register an income",
    ),
    ("/edit", FlowKind::EditMovement, "edit a recent movement"),
    ("/category", FlowKind::ManageCategory, "create, rename or delete a category"),
    ("/adduser", FlowKind::AddUser, "add a person to a company"),
    ("/tenant", FlowKind::RegisterTenant, "register a new company"),
];

const GENERIC_FAILURE: &str = "Something went wrong. Please try again in a moment.";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start(FlowKind),
    Turn(Turn),
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> Result<Input, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    if let Some(action) = line.strip_prefix('!') {
        return action.parse::<Action>().map(|a| Input::Turn(Turn::Action(a)));
    }
    if let Some(reference) = line.strip_prefix("@photo") {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err("Usage: @photo <reference>".into());
        }
        return Ok(Input::Turn(Turn::Photo(reference.to_string())));
    }
    if line.starts_with('/') {
        return match line {
            "/quit" | "/exit" => Ok(Input::Quit),
            "/help" => Ok(Input::Help),
            _ => COMMANDS
                .iter()
                .find(|(name, _, _)| *name == line)
                .map(|(_, kind, _)| Input::Start(*kind))
                .ok_or_else(|| format!("Unknown command {}. Type /help for the list.", line)),
        };
    }
    Ok(Input::Turn(Turn::text(line)))
}

pub fn render_prompt(prompt: &Prompt) -> String {
    let mut out = prompt.text.clone();
    for choice in &prompt.choices {
        out.push_str(&format!(
            "\n  {} {}",
            style(format!("[!{}]", choice.action)).cyan(),
            choice.label
        ));
    }
    out
}

pub fn render(outcome: &TurnOutcome) -> String {
    let lead = match outcome {
        TurnOutcome::Started { replaced: true, .. } => {
            Some(style("Previous draft discarded.").yellow().to_string())
        }
        TurnOutcome::Started { .. } | TurnOutcome::Advanced(_) => None,
        TurnOutcome::Busy { active, .. } => Some(
            style(format!(
                "Finish or cancel your {} draft first.",
                active.replace('_', " ")
            ))
            .yellow()
            .to_string(),
        ),
        TurnOutcome::Unavailable { message } | TurnOutcome::Discarded { message } => {
            Some(style(message).yellow().to_string())
        }
        TurnOutcome::Rejected { reason, .. } => Some(style(format!("✗ {}", reason)).red().to_string()),
        TurnOutcome::Denied { reason, .. } => {
            Some(style(format!("Not allowed: {}", reason)).red().to_string())
        }
        TurnOutcome::Failed { message, .. } => Some(style(message).red().to_string()),
        TurnOutcome::Completed { message } => Some(style(format!("✓ {}", message)).green().to_string()),
        TurnOutcome::Cancelled => Some(style("Cancelled.").dim().to_string()),
        TurnOutcome::Idle => Some("Nothing in progress. Type /help for commands.".to_string()),
    };
    match (lead, outcome.prompt()) {
        (Some(lead), Some(prompt)) => format!("{}\n{}", lead, render_prompt(prompt)),
        (Some(lead), None) => lead,
        (None, Some(prompt)) => render_prompt(prompt),
        (None, None) => String::new(),
    }
}

fn help() -> String {
    let mut out = String::from("Commands:");
    for (name, _, about) in COMMANDS {
        out.push_str(&format!("\n  {:<10} {}", style(name).bold(), about));
    }
    out.push_str("\n  !<action>  press a choice, e.g. !confirm or !cancel");
    out.push_str("\n  @photo <r> attach a photo reference");
    out.push_str("\n  /quit      leave the chat");
    out
}

/// Drive one conversation from `input` until EOF or `/quit`.
pub async fn run_console<R: BufRead, W: Write>(
    engine: &FlowEngine,
    actor: &Actor,
    conversation: &str,
    input: R,
    mut output: W,
) -> Result<()> {
    writeln!(
        output,
        "{} Signed in as {} ({}). Type /help for commands.",
        style("ledgerbot").bold(),
        actor.name,
        actor.role.label()
    )?;
    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        let reply = match parse_line(&line) {
            Ok(Input::Empty) => continue,
            Ok(Input::Quit) => break,
            Ok(Input::Help) => help(),
            Ok(Input::Start(kind)) => respond(engine.start(conversation, actor, kind).await),
            Ok(Input::Turn(turn)) => respond(engine.handle(conversation, actor, turn).await),
            Err(message) => style(message).red().to_string(),
        };
        writeln!(output, "{}", reply)?;
        output.flush()?;
    }
    Ok(())
}

fn respond(result: Result<TurnOutcome, crate::errors::FlowError>) -> String {
    match result {
        Ok(outcome) => render(&outcome),
        Err(err) => {
            error!(error = %err, "Turn failed");
            style(GENERIC_FAILURE).red().to_string()
        }
    }
}
