use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::atomic::atomic_write;
use crate::error::{FinbotError, Result};
use crate::models::{format_amount, TransactionRecord};

pub const UNTAGGED: &str = "(untagged)";

/// Tag rows by period columns, newest period first, followed by
/// `Inflow`, `Outflow` and `Netflow` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Decimal>)>,
}

fn tag_label(r: &TransactionRecord) -> String {
    if r.is_tagged() {
        r.tags.clone()
    } else {
        UNTAGGED.to_string()
    }
}

fn pivot(ledger: &[TransactionRecord], period: impl Fn(&TransactionRecord) -> String) -> Pivot {
    let periods: BTreeSet<String> = ledger.iter().map(&period).collect();
    let columns: Vec<String> = periods.into_iter().rev().collect();

    let mut cells: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
    for r in ledger {
        *cells
            .entry(tag_label(r))
            .or_default()
            .entry(period(r))
            .or_default() += r.amount;
    }

    let mut rows: Vec<(String, Vec<Decimal>)> = cells
        .into_iter()
        .map(|(tag, by_period)| {
            let values = columns
                .iter()
                .map(|c| by_period.get(c).copied().unwrap_or_default())
                .collect();
            (tag, values)
        })
        .collect();

    let flow = |keep: fn(&Decimal) -> bool| -> Vec<Decimal> {
        (0..columns.len())
            .map(|i| rows.iter().map(|(_, v)| v[i]).filter(|v| keep(v)).sum())
            .collect()
    };
    let inflow = flow(|v| v.is_sign_positive() && !v.is_zero());
    let outflow = flow(|v| v.is_sign_negative() && !v.is_zero());
    let netflow = inflow.iter().zip(&outflow).map(|(a, b)| a + b).collect();
    rows.push(("Inflow".to_string(), inflow));
    rows.push(("Outflow".to_string(), outflow));
    rows.push(("Netflow".to_string(), netflow));

    Pivot { columns, rows }
}

pub fn monthly_report(ledger: &[TransactionRecord]) -> Pivot {
    pivot(ledger, |r| format!("{}-{:02}", r.date.year(), r.date.month()))
}

pub fn yearly_report(ledger: &[TransactionRecord]) -> Pivot {
    pivot(ledger, |r| r.date.year().to_string())
}

pub fn current_balance(ledger: &[TransactionRecord]) -> Decimal {
    ledger.iter().map(|r| r.amount).sum()
}

/// Tag totals, most negative first.
pub fn summary_by_tag<'a>(records: impl IntoIterator<Item = &'a TransactionRecord>) -> Vec<(String, Decimal)> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for r in records {
        *totals.entry(tag_label(r)).or_default() += r.amount;
    }
    let mut out: Vec<_> = totals.into_iter().collect();
    out.sort_by(|a, b| a.1.cmp(&b.1));
    out
}

pub fn write_pivot(pivot: &Pivot, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    let mut header = vec!["tags".to_string()];
    header.extend(pivot.columns.iter().cloned());
    wtr.write_record(&header)?;
    for (label, values) in &pivot.rows {
        let mut record = vec![label.clone()];
        record.extend(values.iter().map(|v| format_amount(*v)));
        wtr.write_record(&record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| FinbotError::Io(e.into_error()))?;
    atomic_write(path, &bytes)
}

pub fn write_reports(ledger: &[TransactionRecord], reports_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let monthly = reports_dir.join("monthly_summary.csv");
    let yearly = reports_dir.join("yearly_summary.csv");
    write_pivot(&monthly_report(ledger), &monthly)?;
    write_pivot(&yearly_report(ledger), &yearly)?;
    tracing::debug!(dir = %reports_dir.display(), "reports refreshed");
    Ok((monthly, yearly))
}
