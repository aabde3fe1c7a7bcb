//! CLI command implementations.
//!
//! | Module   | Commands handled                 |
//! |----------|----------------------------------|
//! | `init`   | `Init`                           |
//! | `admin`  | `Tenant`, `User`, `Grant`        |
//! | `chat`   | `Chat`                           |
//! | `report` | `Report`                         |
//! | `config` | `Config`                         |

pub mod admin;
pub mod chat;
pub mod config;
pub mod init;
pub mod report;

pub use admin::{cmd_grant, cmd_tenant, cmd_user};
pub use chat::cmd_chat;
pub use config::cmd_config;
pub use init::cmd_init;
pub use report::cmd_report;
