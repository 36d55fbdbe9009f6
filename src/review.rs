use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::atomic_write;
use crate::classifier::argmax;
use crate::error::{FinbotError, Result};
use crate::models::{IdentityKey, TransactionRecord};

pub const TOP_K: usize = 3;

/// What a non-interactive run does with a tag that fell below threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowConfidencePolicy {
    /// Blank the tag so the row shows up as untagged.
    #[default]
    Clear,
    /// Keep the model's best guess.
    KeepGuess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewCandidate {
    pub record: TransactionRecord,
    pub predicted_tag: String,
    pub confidence: f64,
    /// Most to least likely, at most `TOP_K`.
    pub alternatives: Vec<(String, f64)>,
}

#[derive(Debug, Default)]
pub struct Partition {
    pub auto_accepted: Vec<TransactionRecord>,
    pub needs_review: Vec<ReviewCandidate>,
}

impl Partition {
    /// Flatten back into one batch for a non-interactive merge.
    pub fn into_batch(self, policy: LowConfidencePolicy) -> Vec<TransactionRecord> {
        let mut batch = self.auto_accepted;
        batch.extend(self.needs_review.into_iter().map(|c| {
            let mut record = c.record;
            record.tags = match policy {
                LowConfidencePolicy::Clear => String::new(),
                LowConfidencePolicy::KeepGuess => c.predicted_tag,
            };
            record
        }));
        batch.sort_by_key(|r| r.date);
        batch
    }
}

pub fn validate_threshold(threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(FinbotError::InvalidThreshold(threshold))
    }
}

/// The `k` most likely labels. Equal probabilities keep label-set order.
pub fn top_k(labels: &[String], dist: &[f64], k: usize) -> Vec<(String, f64)> {
    let mut ranked: Vec<(usize, f64)> = dist.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .filter_map(|(i, p)| labels.get(i).map(|l| (l.clone(), p)))
        .take(k)
        .collect()
}

/// Tag every record with its prediction and split on confidence. Records at
/// or above `threshold` are accepted as-is; the rest become candidates.
/// `probas[i]` belongs to `records[i]` and is ordered like `labels`.
pub fn partition_scored(
    records: Vec<TransactionRecord>,
    probas: Vec<Vec<f64>>,
    labels: &[String],
    threshold: f64,
) -> Result<Partition> {
    validate_threshold(threshold)?;
    if probas.len() != records.len() {
        return Err(FinbotError::ModelStale(format!(
            "{} distributions for {} records",
            probas.len(),
            records.len()
        )));
    }

    let mut out = Partition::default();
    for (mut record, dist) in records.into_iter().zip(probas) {
        let best = argmax(&dist);
        let confidence = dist.get(best).copied().unwrap_or(0.0);
        let predicted = labels
            .get(best)
            .cloned()
            .ok_or_else(|| FinbotError::ModelStale(format!("no label for class index {best}")))?;
        record.tags = predicted.clone();
        if confidence >= threshold {
            out.auto_accepted.push(record);
        } else {
            out.needs_review.push(ReviewCandidate {
                alternatives: top_k(labels, &dist, TOP_K),
                record,
                predicted_tag: predicted,
                confidence,
            });
        }
    }
    tracing::info!(
        accepted = out.auto_accepted.len(),
        review = out.needs_review.len(),
        threshold,
        "partitioned predictions"
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Resolution checkpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved {
    pub key: IdentityKey,
    pub tag: String,
}

/// Durable state of an interactive review. Progress is the set of
/// identity keys still unresolved, so a restart or an edit between
/// sessions never skips or repeats a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCheckpoint {
    pub created_at: DateTime<Utc>,
    pub event: String,
    pub accepted: Vec<TransactionRecord>,
    /// Presentation order: confidence ascending, then ledger order.
    pub candidates: Vec<ReviewCandidate>,
    pub unresolved: BTreeSet<IdentityKey>,
    pub resolutions: Vec<Resolved>,
}

impl ReviewCheckpoint {
    pub fn new(event: &str, partition: Partition) -> Self {
        let mut candidates = partition.needs_review;
        candidates.sort_by(|a, b| {
            a.confidence
                .total_cmp(&b.confidence)
                .then(a.record.date.cmp(&b.record.date))
        });
        let unresolved = candidates.iter().map(|c| c.record.key()).collect();
        Self {
            created_at: Utc::now(),
            event: event.to_string(),
            accepted: partition.auto_accepted,
            candidates,
            unresolved,
            resolutions: Vec::new(),
        }
    }

    pub fn pending(&self) -> impl Iterator<Item = &ReviewCandidate> {
        self.candidates
            .iter()
            .filter(|c| self.unresolved.contains(&c.record.key()))
    }

    pub fn next_pending(&self) -> Option<&ReviewCandidate> {
        self.pending().next()
    }

    pub fn pending_count(&self) -> usize {
        self.unresolved.len()
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Record a tag for `key`. Returns false when the key was not pending,
    /// which makes repeated resolutions harmless.
    pub fn resolve(&mut self, key: &IdentityKey, tag: &str) -> bool {
        if !self.unresolved.remove(key) {
            return false;
        }
        self.resolutions.push(Resolved {
            key: key.clone(),
            tag: tag.to_string(),
        });
        true
    }

    /// Resolutions whose tag differs from what the model predicted.
    pub fn changed_count(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| {
                self.candidates
                    .iter()
                    .find(|c| c.record.key() == r.key)
                    .is_some_and(|c| c.predicted_tag != r.tag)
            })
            .count()
    }

    /// The full batch with resolutions applied. Anything still unresolved
    /// falls back to `policy`.
    pub fn into_batch(self, policy: LowConfidencePolicy) -> Vec<TransactionRecord> {
        let mut batch = self.accepted;
        for candidate in self.candidates {
            let key = candidate.record.key();
            let mut record = candidate.record;
            record.tags = match self.resolutions.iter().find(|r| r.key == key) {
                Some(resolved) => resolved.tag.clone(),
                None => match policy {
                    LowConfidencePolicy::Clear => String::new(),
                    LowConfidencePolicy::KeepGuess => candidate.predicted_tag,
                },
            };
            batch.push(record);
        }
        batch.sort_by_key(|r| r.date);
        batch
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, format!("{json}\n").as_bytes())
    }

    pub fn discard(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Resolving
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Take the suggested tag.
    Accept,
    /// Use a tag the operator typed.
    Replace(String),
    /// Leave for a later session.
    Skip,
    /// Stop presenting; keep the checkpoint.
    Pause,
}

/// Source of decisions for review candidates. The CLI prompts a human;
/// tests script the answers.
pub trait Resolver {
    fn decide(&mut self, candidate: &ReviewCandidate, position: usize, total: usize) -> Result<Decision>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Complete,
    Paused,
}

/// Present every pending candidate once, saving the checkpoint after each
/// resolution.
pub fn resolve_pending(
    checkpoint: &mut ReviewCheckpoint,
    resolver: &mut dyn Resolver,
    checkpoint_path: &Path,
) -> Result<ReviewState> {
    let queue: Vec<ReviewCandidate> = checkpoint.pending().cloned().collect();
    let total = queue.len();

    for (i, candidate) in queue.iter().enumerate() {
        let key = candidate.record.key();
        let tag = match resolver.decide(candidate, i + 1, total)? {
            Decision::Accept => candidate.predicted_tag.clone(),
            Decision::Replace(tag) if !tag.trim().is_empty() => tag.trim().to_string(),
            Decision::Replace(_) | Decision::Skip => continue,
            Decision::Pause => {
                checkpoint.save(checkpoint_path)?;
                tracing::info!(pending = checkpoint.pending_count(), "review paused");
                return Ok(ReviewState::Paused);
            }
        };
        if checkpoint.resolve(&key, &tag) {
            checkpoint.save(checkpoint_path)?;
        }
    }

    checkpoint.save(checkpoint_path)?;
    if checkpoint.is_complete() {
        Ok(ReviewState::Complete)
    } else {
        Ok(ReviewState::Paused)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::classifier::Classifier;
    use crate::models::SourceType;

    /// Classifier stub: a fixed distribution per description.
    struct StubClassifier {
        labels: Vec<String>,
        table: HashMap<String, Vec<f64>>,
    }

    impl StubClassifier {
        fn new(labels: &[&str], rows: &[(&str, &[f64])]) -> Self {
            Self {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                table: rows.iter().map(|(d, p)| (d.to_string(), p.to_vec())).collect(),
            }
        }
    }

    impl Classifier for StubClassifier {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict_proba(&self, records: &[TransactionRecord]) -> Result<Vec<Vec<f64>>> {
            Ok(records.iter().map(|r| self.table[&r.description].clone()).collect())
        }
    }

    struct Scripted(Vec<Decision>);

    impl Resolver for Scripted {
        fn decide(&mut self, _: &ReviewCandidate, _: usize, _: usize) -> Result<Decision> {
            Ok(if self.0.is_empty() { Decision::Pause } else { self.0.remove(0) })
        }
    }

    fn txn(day: u32, desc: &str) -> TransactionRecord {
        TransactionRecord::new(
            NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
            desc,
            Decimal::from_str("-10.00").unwrap(),
            SourceType::Checking,
            None,
        )
    }

    fn stub() -> StubClassifier {
        StubClassifier::new(
            &["Auto", "Dining", "Groceries", "Shopping"],
            &[
                ("COFFEE", &[0.05, 0.90, 0.03, 0.02]),
                ("MARKET", &[0.10, 0.35, 0.45, 0.10]),
                ("TIED", &[0.30, 0.30, 0.10, 0.30]),
                ("GAS", &[0.55, 0.15, 0.15, 0.15]),
            ],
        )
    }

    fn partition(records: Vec<TransactionRecord>, classifier: &dyn Classifier, threshold: f64) -> Result<Partition> {
        let probas = classifier.predict_proba(&records)?;
        partition_scored(records, probas, classifier.labels(), threshold)
    }

    fn batch() -> Vec<TransactionRecord> {
        vec![txn(1, "COFFEE"), txn(2, "MARKET"), txn(3, "TIED"), txn(4, "GAS")]
    }

    #[test]
    fn test_partition_complete_and_disjoint() {
        let input = batch();
        let p = partition(input.clone(), &stub(), 0.5).unwrap();
        assert_eq!(p.auto_accepted.len() + p.needs_review.len(), input.len());
        let accepted: BTreeSet<_> = p.auto_accepted.iter().map(|r| r.key()).collect();
        let review: BTreeSet<_> = p.needs_review.iter().map(|c| c.record.key()).collect();
        assert!(accepted.is_disjoint(&review));
        let all: BTreeSet<_> = input.iter().map(|r| r.key()).collect();
        assert_eq!(&accepted | &review, all);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let p = partition(vec![txn(4, "GAS")], &stub(), 0.55).unwrap();
        assert_eq!(p.auto_accepted.len(), 1);
        assert_eq!(p.auto_accepted[0].tags, "Auto");
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        assert!(matches!(
            partition(batch(), &stub(), 1.5).unwrap_err(),
            FinbotError::InvalidThreshold(_)
        ));
        assert!(partition(batch(), &stub(), -0.1).is_err());
    }

    #[test]
    fn test_distribution_count_must_match_records() {
        let labels = stub().labels.clone();
        let err = partition_scored(batch(), vec![vec![1.0, 0.0, 0.0]], &labels, 0.5).unwrap_err();
        assert!(matches!(err, FinbotError::ModelStale(_)), "{err:?}");
    }

    #[test]
    fn test_candidates_carry_top3_with_stable_ties() {
        let p = partition(vec![txn(3, "TIED")], &stub(), 0.5).unwrap();
        let c = &p.needs_review[0];
        assert_eq!(c.predicted_tag, "Auto");
        assert!((c.confidence - 0.30).abs() < 1e-12);
        let names: Vec<_> = c.alternatives.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(names, vec!["Auto", "Dining", "Shopping"]);
    }

    #[test]
    fn test_non_interactive_clear_blanks_low_confidence() {
        let p = partition(batch(), &stub(), 0.5).unwrap();
        let out = p.into_batch(LowConfidencePolicy::Clear);
        let tags: Vec<_> = out.iter().map(|r| r.tags.as_str()).collect();
        assert_eq!(tags, vec!["Dining", "", "", "Auto"]);
    }

    #[test]
    fn test_keep_guess_policy_retains_prediction() {
        let p = partition(batch(), &stub(), 0.5).unwrap();
        let out = p.into_batch(LowConfidencePolicy::KeepGuess);
        let tags: Vec<_> = out.iter().map(|r| r.tags.as_str()).collect();
        assert_eq!(tags, vec!["Dining", "Groceries", "Auto", "Auto"]);
    }

    #[test]
    fn test_checkpoint_orders_by_confidence_ascending() {
        let p = partition(batch(), &stub(), 0.95).unwrap();
        let cp = ReviewCheckpoint::new("insert", p);
        let order: Vec<_> = cp.pending().map(|c| c.record.description.as_str()).collect();
        assert_eq!(order, vec!["TIED", "MARKET", "GAS", "COFFEE"]);
    }

    #[test]
    fn test_resolve_is_keyed_and_idempotent() {
        let p = partition(batch(), &stub(), 0.5).unwrap();
        let mut cp = ReviewCheckpoint::new("insert", p);
        let key = cp.next_pending().unwrap().record.key();
        assert!(cp.resolve(&key, "Shopping"));
        assert!(!cp.resolve(&key, "Dining"));
        assert_eq!(cp.resolutions.len(), 1);
        assert_eq!(cp.next_pending().unwrap().record.description, "MARKET");
    }

    #[test]
    fn test_pause_and_resume_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("review_checkpoint.json");
        let p = partition(batch(), &stub(), 0.5).unwrap();
        let mut cp = ReviewCheckpoint::new("insert", p);

        let state = resolve_pending(&mut cp, &mut Scripted(vec![Decision::Replace("Fees".into())]), &path).unwrap();
        assert_eq!(state, ReviewState::Paused);

        // Simulates a process restart.
        let mut reloaded = ReviewCheckpoint::load(&path).unwrap().unwrap();
        assert_eq!(reloaded.pending_count(), 1);
        assert_eq!(reloaded.next_pending().unwrap().record.description, "MARKET");

        let state = resolve_pending(&mut reloaded, &mut Scripted(vec![Decision::Accept]), &path).unwrap();
        assert_eq!(state, ReviewState::Complete);
        assert_eq!(reloaded.changed_count(), 1);

        let out = reloaded.into_batch(LowConfidencePolicy::Clear);
        let tags: Vec<_> = out.iter().map(|r| r.tags.as_str()).collect();
        assert_eq!(tags, vec!["Dining", "Groceries", "Fees", "Auto"]);
    }

    #[test]
    fn test_skip_leaves_candidate_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let p = partition(batch(), &stub(), 0.5).unwrap();
        let mut cp = ReviewCheckpoint::new("insert", p);
        let state = resolve_pending(&mut cp, &mut Scripted(vec![Decision::Skip, Decision::Accept]), &path).unwrap();
        assert_eq!(state, ReviewState::Paused);
        assert_eq!(cp.pending_count(), 1);
        assert_eq!(cp.next_pending().unwrap().record.description, "TIED");
        assert_eq!(cp.changed_count(), 0);
    }

    #[test]
    fn test_load_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ReviewCheckpoint::load(&dir.path().join("none.json")).unwrap().is_none());
    }
}
