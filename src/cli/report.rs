use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{Context, ReportKind};
use crate::error::Result;
use crate::fmt::{money, money_colored};
use crate::ledger::LedgerStore;
use crate::reports::{current_balance, monthly_report, write_reports, yearly_report, Pivot};

/// Pivots get wide fast; the terminal view shows the most recent periods.
const MAX_COLUMNS: usize = 6;

pub fn run(ctx: &Context, kind: ReportKind, write: bool) -> Result<()> {
    let paths = ctx.settings.paths();
    let ledger = LedgerStore::new(&paths.ledger_dir).read()?;
    if ledger.is_empty() {
        println!("Ledger is empty.");
        return Ok(());
    }

    match kind {
        ReportKind::Monthly => print_pivot("Monthly summary", &monthly_report(&ledger)),
        ReportKind::Yearly => print_pivot("Yearly summary", &yearly_report(&ledger)),
        ReportKind::Balance => {
            println!("Current balance: {}", money_colored(current_balance(&ledger)).bold());
        }
    }

    if write {
        let (monthly, yearly) = write_reports(&ledger, &paths.reports_dir)?;
        println!("Wrote {}", monthly.display());
        println!("Wrote {}", yearly.display());
    }
    Ok(())
}

fn print_pivot(title: &str, pivot: &Pivot) {
    let shown = pivot.columns.len().min(MAX_COLUMNS);
    let mut table = Table::new();
    let mut header = vec![Cell::new("Tag")];
    header.extend(pivot.columns[..shown].iter().map(Cell::new));
    table.set_header(header);

    for (label, values) in &pivot.rows {
        let mut row = vec![Cell::new(label)];
        row.extend(
            values[..shown]
                .iter()
                .map(|v| Cell::new(money(*v)).set_alignment(CellAlignment::Right)),
        );
        table.add_row(row);
    }
    println!("{}\n{table}", title.bold());
    if pivot.columns.len() > shown {
        println!("({} older period(s) not shown; use --write for the full CSV)", pivot.columns.len() - shown);
    }
}
