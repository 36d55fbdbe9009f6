use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::Context;
use crate::error::Result;
use crate::fmt::money;
use crate::ledger::{filter, LedgerFilter, LedgerStore};
use crate::reports::summary_by_tag;

pub fn run(ctx: &Context, year: Option<i32>, month: Option<u32>, tags: Vec<String>) -> Result<()> {
    let ledger = LedgerStore::new(&ctx.settings.paths().ledger_dir).read()?;
    let rows = filter(&ledger, &LedgerFilter { year, month, tags });

    if rows.is_empty() {
        println!("No matching rows.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["#", "Date", "Description", "Amount", "Tag", "Type", "Check"]);
    for (i, r) in &rows {
        table.add_row(vec![
            Cell::new(i),
            Cell::new(r.date),
            Cell::new(&r.description),
            Cell::new(money(r.amount)).set_alignment(CellAlignment::Right),
            Cell::new(&r.tags),
            Cell::new(r.source_type),
            Cell::new(r.check_number.as_deref().unwrap_or("")),
        ]);
    }
    println!("{table}");

    let mut summary = Table::new();
    summary.set_header(vec!["Tag", "Total"]);
    for (tag, total) in summary_by_tag(rows.iter().map(|(_, r)| *r)) {
        summary.add_row(vec![
            Cell::new(tag),
            Cell::new(money(total)).set_alignment(CellAlignment::Right),
        ]);
    }
    let total = rows.iter().map(|(_, r)| r.amount).sum();
    summary.add_row(vec![
        Cell::new("Total"),
        Cell::new(money(total)).set_alignment(CellAlignment::Right),
    ]);
    println!("\n{summary}");
    println!("{} row(s)", rows.len());
    Ok(())
}
