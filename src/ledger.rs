use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::atomic::{atomic_write, checksum, parse_versioned_name, versioned_path, write_once};
use crate::dedup::{dedupe, duplicate_indexes, merge_with_priority, Keep};
use crate::error::{FinbotError, Result};
use crate::models::{format_amount, normalize_check_number, round_amount, TransactionRecord};
use crate::normalizer::{parse_amount, parse_date};

pub const HEADER: [&str; 7] = ["date", "description", "amount", "tags", "notes", "type", "check"];

/// On-disk row. Every text column is a plain string; absent values are
/// empty strings, never a null marker.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerRow {
    #[serde(default)]
    date: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    notes: String,
    #[serde(rename = "type", default)]
    source_type: String,
    #[serde(default)]
    check: String,
}

impl From<&TransactionRecord> for LedgerRow {
    fn from(r: &TransactionRecord) -> Self {
        Self {
            date: r.date.format("%Y-%m-%d").to_string(),
            description: r.description.clone(),
            amount: format_amount(r.amount),
            tags: r.tags.clone(),
            notes: r.notes.clone(),
            source_type: r.source_type.to_string(),
            check: r.check_number.clone().unwrap_or_default(),
        }
    }
}

impl LedgerRow {
    fn into_record(self, file: &Path, row: usize) -> Result<TransactionRecord> {
        let bad = |reason: String| FinbotError::MalformedRecord {
            file: file.to_path_buf(),
            row,
            reason,
        };
        // Tolerate a time component left behind by older tools.
        let date = parse_date(self.date.get(..10).unwrap_or(&self.date))
            .ok_or_else(|| bad(format!("bad date '{}'", self.date)))?;
        let amount = parse_amount(&self.amount).map_err(|_| bad(format!("bad amount '{}'", self.amount)))?;
        let source_type = self.source_type.parse().map_err(|_| bad(format!("bad type '{}'", self.source_type)))?;
        Ok(TransactionRecord {
            date,
            description: self.description,
            amount: round_amount(amount),
            tags: self.tags,
            notes: self.notes,
            source_type,
            check_number: normalize_check_number(&self.check),
        })
    }
}

/// Which rows a tag update touches.
pub enum Selector {
    Index(usize),
    Indices(Vec<usize>),
    TagEquals(String),
    Where(Box<dyn Fn(&TransactionRecord) -> bool>),
}

impl Selector {
    fn resolve(&self, ledger: &[TransactionRecord]) -> Result<Vec<usize>> {
        let check = |i: usize| {
            if i < ledger.len() {
                Ok(i)
            } else {
                Err(FinbotError::RecordNotFound(i))
            }
        };
        match self {
            Self::Index(i) => Ok(vec![check(*i)?]),
            Self::Indices(idxs) => {
                let mut out = idxs.iter().map(|i| check(*i)).collect::<Result<Vec<_>>>()?;
                out.sort_unstable();
                out.dedup();
                Ok(out)
            }
            Self::TagEquals(tag) => Ok(matching(ledger, |r| &r.tags == tag)),
            Self::Where(pred) => Ok(matching(ledger, |r| pred(r))),
        }
    }
}

fn matching(ledger: &[TransactionRecord], pred: impl Fn(&TransactionRecord) -> bool) -> Vec<usize> {
    ledger
        .iter()
        .enumerate()
        .filter(|(_, r)| pred(r))
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug)]
pub struct InsertOutcome {
    pub ledger: Vec<TransactionRecord>,
    pub added: usize,
    pub backup: Option<PathBuf>,
}

#[derive(Debug)]
pub struct TagUpdate {
    pub ledger: Vec<TransactionRecord>,
    pub updated: Vec<usize>,
    pub backup: Option<PathBuf>,
}

#[derive(Debug)]
pub struct OffsetOutcome {
    pub ledger: Vec<TransactionRecord>,
    pub offset_index: usize,
    pub backup: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupEntry {
    pub nanos: u128,
    pub event: String,
    pub path: PathBuf,
}

/// The only owner of the ledger file. Every mutation takes a verified
/// byte-for-byte backup of the current file first and then swaps the new
/// content in atomically.
pub struct LedgerStore {
    path: PathBuf,
    backups_dir: PathBuf,
}

impl LedgerStore {
    pub fn new(ledger_dir: &Path) -> Self {
        Self {
            path: ledger_dir.join("ledger.csv"),
            backups_dir: ledger_dir.join("backups"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing ledger file reads as an empty ledger.
    pub fn read(&self) -> Result<Vec<TransactionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();
        for (i, result) in rdr.deserialize::<LedgerRow>().enumerate() {
            records.push(result?.into_record(&self.path, i + 2)?);
        }
        Ok(records)
    }

    pub fn serialize(records: &[TransactionRecord]) -> Result<Vec<u8>> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        if records.is_empty() {
            wtr.write_record(HEADER)?;
        }
        for record in records {
            wtr.serialize(LedgerRow::from(record))?;
        }
        wtr.into_inner().map_err(|e| FinbotError::Io(e.into_error()))
    }

    /// Snapshot the current ledger as `ledger_<nanos>_<event>.csv`. The
    /// copy is re-read and checksummed before this returns.
    pub fn backup(&self, event: &str) -> Result<PathBuf> {
        let failed = |e: &dyn std::fmt::Display| FinbotError::BackupFailed(e.to_string());
        let current = if self.path.exists() {
            std::fs::read(&self.path).map_err(|e| failed(&e))?
        } else {
            Self::serialize(&[])?
        };
        let dest = versioned_path(&self.backups_dir, "ledger", event, "csv");
        write_once(&dest, &current).map_err(|e| failed(&e))?;
        let written = std::fs::read(&dest).map_err(|e| failed(&e))?;
        if checksum(&written) != checksum(&current) {
            return Err(FinbotError::BackupFailed(format!(
                "{} does not match the ledger",
                dest.display()
            )));
        }
        tracing::info!(backup = %dest.display(), event, bytes = current.len(), "ledger backed up");
        Ok(dest)
    }

    /// Back up, then replace the ledger with `records`. Nothing is written
    /// if the backup fails.
    pub fn write(&self, records: &[TransactionRecord], event: &str) -> Result<PathBuf> {
        let bytes = Self::serialize(records)?;
        let backup = self.backup(event)?;
        atomic_write(&self.path, &bytes)?;
        tracing::info!(ledger = %self.path.display(), rows = records.len(), event, "ledger written");
        Ok(backup)
    }

    pub fn insert_batch(&self, records: Vec<TransactionRecord>, event: &str) -> Result<InsertOutcome> {
        let current = self.read()?;
        let merged = merge_with_priority(&current, records);
        if merged.records == current {
            return Ok(InsertOutcome {
                ledger: current,
                added: 0,
                backup: None,
            });
        }
        let backup = self.write(&merged.records, event)?;
        Ok(InsertOutcome {
            ledger: merged.records,
            added: merged.added,
            backup: Some(backup),
        })
    }

    pub fn update_tag(&self, selector: &Selector, new_tag: &str, event: &str, write: bool) -> Result<TagUpdate> {
        let mut ledger = self.read()?;
        let updated = selector.resolve(&ledger)?;
        for &i in &updated {
            ledger[i].tags = new_tag.to_string();
        }
        let backup = if write && !updated.is_empty() {
            Some(self.write(&ledger, event)?)
        } else {
            None
        };
        Ok(TagUpdate { ledger, updated, backup })
    }

    /// Rename a tag on every row carrying it, as one backup and one write.
    pub fn replace_tag(&self, old_tag: &str, new_tag: &str, write: bool) -> Result<TagUpdate> {
        self.update_tag(
            &Selector::TagEquals(old_tag.to_string()),
            new_tag,
            &format!("replace_tag_{old_tag}_{new_tag}"),
            write,
        )
    }

    /// Move `offset_amount` out of row `index` into a new row tagged
    /// `offset_tag`. The original keeps its date, description and source;
    /// its amount drops by exactly the offset.
    pub fn add_offset(
        &self,
        index: usize,
        offset_amount: Decimal,
        offset_tag: &str,
        notes: &str,
    ) -> Result<OffsetOutcome> {
        let mut ledger = self.read()?;
        let original = ledger.get(index).cloned().ok_or(FinbotError::RecordNotFound(index))?;
        let offset_amount = round_amount(offset_amount);

        let mut offset = TransactionRecord::new(
            original.date,
            &format!("offset: {}", original.description),
            offset_amount,
            original.source_type,
            None,
        );
        offset.tags = offset_tag.to_string();
        offset.notes = notes.to_string();

        let mut updated = original.clone();
        updated.amount = round_amount(original.amount - offset_amount);

        let others: HashSet<_> = ledger
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, r)| r.key())
            .collect();
        if others.contains(&offset.key()) || others.contains(&updated.key()) {
            return Err(FinbotError::Other(format!(
                "offset would duplicate an existing ledger row: {}",
                offset.key()
            )));
        }

        ledger[index] = updated;
        ledger.push(offset);
        ledger.sort_by_key(|r| r.date);
        let offset_index = ledger
            .iter()
            .rposition(|r| r.date == original.date && r.tags == offset_tag && r.description.starts_with("offset: "))
            .unwrap_or(ledger.len() - 1);

        let backup = self.write(&ledger, &format!("offset_{offset_tag}"))?;
        Ok(OffsetOutcome {
            ledger,
            offset_index,
            backup,
        })
    }

    /// Remove rows whose identity key repeats another row, keeping the
    /// occurrence `keep` names. Returns the number removed; nothing is
    /// backed up or written when it is zero.
    pub fn drop_duplicates(&self, keep: Keep, event: &str) -> Result<usize> {
        let ledger = self.read()?;
        let dupes = duplicate_indexes(&ledger).len();
        if dupes == 0 {
            return Ok(0);
        }
        let kept = dedupe(ledger, keep);
        self.write(&kept, event)?;
        Ok(dupes)
    }

    pub fn backups(&self) -> Result<Vec<BackupEntry>> {
        if !self.backups_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries: Vec<BackupEntry> = std::fs::read_dir(&self.backups_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                let (nanos, event) = parse_versioned_name(&name, "ledger")?;
                Some(BackupEntry {
                    nanos,
                    event,
                    path: e.path(),
                })
            })
            .collect();
        entries.sort_by_key(|e| e.nanos);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Read-side helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct LedgerFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub tags: Vec<String>,
}

impl LedgerFilter {
    pub fn matches(&self, r: &TransactionRecord) -> bool {
        self.year.map_or(true, |y| r.date.year() == y)
            && self.month.map_or(true, |m| r.date.month() == m)
            && (self.tags.is_empty() || self.tags.contains(&r.tags))
    }
}

/// Matching rows with their ledger index.
pub fn filter<'a>(ledger: &'a [TransactionRecord], f: &LedgerFilter) -> Vec<(usize, &'a TransactionRecord)> {
    ledger.iter().enumerate().filter(|(_, r)| f.matches(r)).collect()
}

pub fn labels_in_use(ledger: &[TransactionRecord]) -> BTreeSet<String> {
    ledger
        .iter()
        .filter(|r| r.is_tagged())
        .map(|r| r.tags.clone())
        .collect()
}
