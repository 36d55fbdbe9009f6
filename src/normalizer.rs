use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{FinbotError, Result};
use crate::models::{normalize_check_number, TransactionRecord};
use crate::sources::{Field, RowPolicy, SourceConfig};

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d"];

// ---------------------------------------------------------------------------
// Field coercion
// ---------------------------------------------------------------------------

pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let s = raw.trim().replace(['"', ',', ' '], "");
    let (negative, s) = match s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        Some(inner) => (true, inner.to_string()),
        None => (false, s),
    };
    let s = s.replacen('$', "", 1);
    let value = Decimal::from_str(&s).map_err(|_| FinbotError::InvalidAmount(raw.trim().to_string()))?;
    Ok(if negative { -value } else { value })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

// ---------------------------------------------------------------------------
// normalize_file
// ---------------------------------------------------------------------------

/// Result of normalizing one or more raw exports. Malformed rows never
/// abort the batch; they are collected here and reported at the end.
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<TransactionRecord>,
    pub malformed: Vec<FinbotError>,
    /// Rows dropped by a `DropIncomplete` policy.
    pub incomplete: usize,
    /// Whole files skipped; their errors are in `malformed`.
    pub failed_files: usize,
}

impl Normalized {
    pub fn absorb(&mut self, other: Normalized) {
        self.records.extend(other.records);
        self.malformed.extend(other.malformed);
        self.incomplete += other.incomplete;
        self.failed_files += other.failed_files;
    }
}

pub fn normalize_file(file_path: &Path, source: &SourceConfig) -> Result<Normalized> {
    let file = std::fs::File::open(file_path)?;
    normalize_reader(std::io::BufReader::new(file), file_path, source)
}

pub fn normalize_reader<R: std::io::Read>(
    reader: R,
    file_path: &Path,
    source: &SourceConfig,
) -> Result<Normalized> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = rdr.records().skip(source.header_row);

    let header = match records.next() {
        Some(h) => h?,
        None => return Ok(Normalized::default()),
    };
    let positions: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    let mut columns = Vec::with_capacity(source.columns.len());
    for col in &source.columns {
        let idx = positions.get(col.raw.trim()).copied().ok_or_else(|| FinbotError::MissingColumn {
            file: file_path.to_path_buf(),
            column: col.raw.clone(),
        })?;
        columns.push((idx, col.field));
    }

    let mut out = Normalized::default();
    for result in records {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                let row = e.position().map(|p| p.line() as usize).unwrap_or(0);
                out.malformed.push(malformed(file_path, row, e.to_string()));
                continue;
            }
        };
        let row = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let cell = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

        let blank_required = columns
            .iter()
            .find(|(idx, field)| field.is_required() && cell(*idx).is_empty());
        let any_blank = columns.iter().any(|(idx, _)| cell(*idx).is_empty());

        match source.row_policy {
            RowPolicy::DropIncomplete if any_blank => {
                out.incomplete += 1;
                continue;
            }
            RowPolicy::DiscardOptional => {
                if let Some((_, field)) = blank_required {
                    out.malformed.push(malformed(file_path, row, format!("missing {field:?}").to_lowercase()));
                    continue;
                }
            }
            _ => {}
        }

        match coerce_row(&columns, &record, source) {
            Ok(txn) => out.records.push(txn),
            Err(reason) => out.malformed.push(malformed(file_path, row, reason)),
        }
    }

    if !out.malformed.is_empty() || out.incomplete > 0 {
        tracing::warn!(
            file = %file_path.display(),
            malformed = out.malformed.len(),
            incomplete = out.incomplete,
            "rows dropped during normalization"
        );
    }
    Ok(out)
}

fn coerce_row(
    columns: &[(usize, Field)],
    record: &csv::StringRecord,
    source: &SourceConfig,
) -> std::result::Result<TransactionRecord, String> {
    let mut date = None;
    let mut description = "";
    let mut amount = None;
    let mut check = None;
    let mut notes = "";

    for (idx, field) in columns {
        let value = record.get(*idx).map(str::trim).unwrap_or("");
        match field {
            Field::Date => {
                date = Some(parse_date(value).ok_or_else(|| format!("bad date '{value}'"))?);
            }
            Field::Description => description = value,
            Field::Amount => {
                amount = Some(parse_amount(value).map_err(|_| format!("non-numeric amount '{value}'"))?);
            }
            Field::Check => check = normalize_check_number(value),
            Field::Notes => notes = value,
            Field::Ignore => {}
        }
    }

    let (Some(date), Some(amount)) = (date, amount) else {
        return Err("missing date or amount".to_string());
    };
    let mut txn = TransactionRecord::new(date, description, amount, source.source_type, check);
    txn.notes = notes.to_string();
    Ok(txn)
}

fn malformed(file: &Path, row: usize, reason: String) -> FinbotError {
    FinbotError::MalformedRecord {
        file: PathBuf::from(file),
        row,
        reason,
    }
}

/// Normalize every input. A file that cannot be read or lacks a mapped
/// column is reported alongside the malformed rows and the rest still load.
pub fn normalize_all(inputs: &[(PathBuf, &SourceConfig)]) -> Normalized {
    let mut out = Normalized::default();
    for (path, source) in inputs {
        let batch = match normalize_file(path, source) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "skipping unreadable export");
                out.failed_files += 1;
                out.malformed.push(e);
                continue;
            }
        };
        tracing::info!(
            file = %path.display(),
            source = %source.source_type,
            rows = batch.records.len(),
            "normalized export"
        );
        out.absorb(batch);
    }
    out
}
