use std::collections::HashSet;

use clap::ValueEnum;

use crate::models::{IdentityKey, TransactionRecord};

/// Which occurrence of a duplicated identity key survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Keep {
    #[default]
    First,
    Last,
}

/// Drop records whose identity key already appeared in this pass. Order of
/// the survivors is preserved, and the surviving row keeps its own tag and
/// notes.
pub fn dedupe(records: Vec<TransactionRecord>, keep: Keep) -> Vec<TransactionRecord> {
    match keep {
        Keep::First => dedupe_first(records),
        Keep::Last => {
            let mut reversed = records;
            reversed.reverse();
            let mut kept = dedupe_first(reversed);
            kept.reverse();
            kept
        }
    }
}

fn dedupe_first(records: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(records.len());
    records
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect()
}

/// Indexes of rows that repeat an earlier row's identity key.
pub fn duplicate_indexes(records: &[TransactionRecord]) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .enumerate()
        .filter(|(_, r)| !seen.insert(r.key()))
        .map(|(i, _)| i)
        .collect()
}

pub struct Merged {
    pub records: Vec<TransactionRecord>,
    pub added: usize,
}

/// Merge fresh rows into the ledger. Ledger rows always win over a fresh
/// duplicate: the combined sequence is ledger-first, stably sorted by date,
/// and deduplicated keep-first. Since the date is part of the key, a fresh
/// duplicate always sorts after its ledger twin.
pub fn merge_with_priority(ledger: &[TransactionRecord], incoming: Vec<TransactionRecord>) -> Merged {
    let before = ledger.len();
    let mut combined: Vec<TransactionRecord> = ledger.to_vec();
    combined.extend(incoming);
    combined.sort_by_key(|r| r.date);
    let ledger_dupes = duplicate_indexes(ledger).len();
    let records = dedupe(combined, Keep::First);
    let added = records.len() + ledger_dupes - before;
    Merged { records, added }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::SourceType;

    fn txn(day: u32, desc: &str, amount: &str, tag: &str) -> TransactionRecord {
        let mut t = TransactionRecord::new(
            NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
            desc,
            Decimal::from_str(amount).unwrap(),
            SourceType::Checking,
            None,
        );
        t.tags = tag.to_string();
        t
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence_with_its_tag() {
        let rows = vec![
            txn(1, "COFFEE", "-4.50", "Dining"),
            txn(2, "RENT", "-900.00", ""),
            txn(1, "COFFEE", "-4.50", "Food"),
        ];
        let out = dedupe(rows, Keep::First);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].tags, "Dining");
        assert_eq!(out[1].description, "RENT");
    }

    #[test]
    fn test_dedupe_keep_last() {
        let rows = vec![txn(1, "COFFEE", "-4.50", "Dining"), txn(1, "COFFEE", "-4.50", "Food")];
        let out = dedupe(rows, Keep::Last);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tags, "Food");
    }

    #[test]
    fn test_check_number_distinguishes_records() {
        let a = txn(1, "CHECK", "-100.00", "");
        let mut b = a.clone();
        b.check_number = Some("1042".into());
        assert_eq!(dedupe(vec![a, b], Keep::First).len(), 2);
    }

    #[test]
    fn test_source_type_distinguishes_records() {
        let a = txn(1, "AMAZON", "-10.00", "");
        let mut b = a.clone();
        b.source_type = SourceType::CreditCard;
        assert_eq!(dedupe(vec![a, b], Keep::First).len(), 2);
    }

    #[test]
    fn test_merge_ledger_wins() {
        let ledger = vec![txn(1, "COFFEE", "-4.50", "Dining")];
        let incoming = vec![txn(1, "COFFEE", "-4.50", "Groceries"), txn(3, "RENT", "-900.00", "")];
        let merged = merge_with_priority(&ledger, incoming);
        assert_eq!(merged.added, 1);
        assert_eq!(merged.records.len(), 2);
        assert_eq!(merged.records[0].tags, "Dining");
    }

    #[test]
    fn test_merge_sorts_by_date() {
        let ledger = vec![txn(5, "B", "-1.00", "x")];
        let incoming = vec![txn(9, "C", "-1.00", ""), txn(2, "A", "-1.00", "")];
        let merged = merge_with_priority(&ledger, incoming);
        let descs: Vec<_> = merged.records.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descs, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let ledger = vec![txn(1, "COFFEE", "-4.50", "Dining")];
        let batch = vec![txn(2, "RENT", "-900.00", "Housing"), txn(3, "GAS", "-30.00", "Auto")];
        let once = merge_with_priority(&ledger, batch.clone());
        let twice = merge_with_priority(&once.records, batch);
        assert_eq!(twice.added, 0);
        assert_eq!(once.records, twice.records);
    }

    #[test]
    fn test_duplicate_indexes() {
        let rows = vec![
            txn(1, "A", "-1.00", ""),
            txn(1, "A", "-1.00", "tagged"),
            txn(2, "B", "-1.00", ""),
            txn(1, "A", "-1.00", ""),
        ];
        assert_eq!(duplicate_indexes(&rows), vec![1, 3]);
    }
}
