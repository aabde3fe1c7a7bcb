//! Project initialization: `ledgerbot init`.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use ledgerbot::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized ledgerbot project at {}",
            result.ledger_dir.display()
        );
        println!();
        println!("Created:");
        println!("  .ledgerbot/");
        println!("  ├── ledgerbot.toml   # Configuration");
        println!("  ├── ledger.db        # Database");
        println!("  └── logs/            # Log files (when [logging].directory is set)");
        println!();
        println!("Next steps:");
        println!("  1. `ledgerbot tenant add <id> <name>` to register a company");
        println!("  2. `ledgerbot user add <id> <name> --role OPERATOR --home <id>`");
        println!("  3. `ledgerbot chat --user <id>` to start chatting");
    } else {
        println!(
            "Ledgerbot project already initialized at {}",
            result.ledger_dir.display()
        );
        println!("Database: {}", result.db_path.display());
    }

    Ok(())
}
