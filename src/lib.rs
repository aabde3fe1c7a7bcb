//! Chat-driven expense and income tracker.
//!
//! | Module          | Role                                                      |
//! |-----------------|-----------------------------------------------------------|
//! | `flow`          | Guided dialogs: drafts, steps, validation, prompts        |
//! | `auth`          | Role hierarchy and per-tenant capability checks           |
//! | `sequence`      | Monthly folio allocation                                  |
//! | `store`         | SQLite implementation of the collaborator traits          |
//! | `report`        | Report envelope over movement queries                     |
//! | `chat`          | Console transport                                         |
//! | `app`           | Wiring of the above over one database                     |

pub mod app;
pub mod auth;
pub mod chat;
pub mod clock;
pub mod errors;
pub mod flow;
pub mod init;
pub mod ledger_config;
pub mod logging;
pub mod report;
pub mod sequence;
pub mod store;
