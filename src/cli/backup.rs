use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::Context;
use crate::dedup::Keep;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::ledger::LedgerStore;

fn store(ctx: &Context) -> LedgerStore {
    LedgerStore::new(&ctx.settings.paths().ledger_dir)
}

pub fn run(ctx: &Context, event: &str) -> Result<()> {
    let dest = store(ctx).backup(event)?;
    let size = std::fs::metadata(&dest)?.len();
    println!("Backup saved to {}", dest.display());
    println!("Size: {}", format_bytes(size));
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let backups = store(ctx).backups()?;
    if backups.is_empty() {
        println!("No backups yet.");
        return Ok(());
    }
    let mut table = Table::new();
    table.set_header(vec!["Taken", "Event", "Size", "File"]);
    for b in &backups {
        let taken = chrono::DateTime::from_timestamp_nanos(b.nanos as i64)
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S");
        let size = std::fs::metadata(&b.path).map(|m| m.len()).unwrap_or_default();
        table.add_row(vec![
            Cell::new(taken),
            Cell::new(&b.event),
            Cell::new(format_bytes(size)),
            Cell::new(b.path.display()),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn dedupe(ctx: &Context, keep: Keep) -> Result<()> {
    let removed = store(ctx).drop_duplicates(keep, "drop_duplicates")?;
    if removed == 0 {
        println!("{}", "No duplicates found.".green());
    } else {
        println!("{}", format!("Removed {removed} duplicate row(s).").green());
    }
    Ok(())
}
