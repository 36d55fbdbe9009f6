use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::atomic::{atomic_write, versioned_path, write_once};
use crate::error::{FinbotError, Result};
use crate::models::TransactionRecord;

/// A trained tagger. The label set is fixed when the model is trained;
/// every distribution returned by `predict_proba` is over that set, in
/// that order.
pub trait Classifier {
    fn labels(&self) -> &[String];

    fn predict_proba(&self, records: &[TransactionRecord]) -> Result<Vec<Vec<f64>>>;

    fn predict(&self, records: &[TransactionRecord]) -> Result<Vec<String>> {
        let labels = self.labels();
        Ok(self
            .predict_proba(records)?
            .iter()
            .map(|dist| labels[argmax(dist)].clone())
            .collect())
    }
}

/// Index of the largest value; the earliest index wins a tie.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

fn tokens(description: &str) -> Vec<String> {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Order-of-magnitude bucket, signed: `-4.50` -> `amt:-1`, `1200.00` -> `amt:+4`.
fn amount_bucket(record: &TransactionRecord) -> String {
    let value = record.amount.to_f64().unwrap_or(0.0);
    let sign = if value < 0.0 { '-' } else { '+' };
    let magnitude = value.abs();
    let digits = if magnitude < 1.0 {
        0
    } else {
        magnitude.log10().floor() as i32 + 1
    };
    format!("amt:{sign}{digits}")
}

pub fn features(record: &TransactionRecord) -> Vec<String> {
    let words = tokens(&record.description);
    let mut out: Vec<String> = words.iter().map(|w| format!("w:{w}")).collect();
    out.extend(words.windows(2).map(|pair| format!("b:{} {}", pair[0], pair[1])));
    out.push(amount_bucket(record));
    out.push(format!("type:{}", record.source_type));
    out
}

// ---------------------------------------------------------------------------
// NaiveBayesModel
// ---------------------------------------------------------------------------

const ALPHA: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    labels: Vec<String>,
    class_rows: Vec<u64>,
    class_totals: Vec<f64>,
    /// feature -> occurrence count per class, indexed like `labels`.
    vocabulary: BTreeMap<String, Vec<f64>>,
    pub trained_at: DateTime<Utc>,
    pub training_rows: usize,
    pub cutoff_year: i32,
}

impl NaiveBayesModel {
    /// Train on tagged records dated in `cutoff_year` or later. Older rows
    /// carry categories that are no longer used.
    pub fn fit(records: &[TransactionRecord], cutoff_year: i32) -> Result<Self> {
        let training: Vec<&TransactionRecord> = records
            .iter()
            .filter(|r| r.is_tagged() && r.date.year() >= cutoff_year)
            .collect();
        if training.is_empty() {
            return Err(FinbotError::ModelStale(format!(
                "no tagged records dated {cutoff_year} or later to train on"
            )));
        }

        let mut labels: Vec<String> = training.iter().map(|r| r.tags.clone()).collect();
        labels.sort();
        labels.dedup();

        let n = labels.len();
        let mut class_rows = vec![0u64; n];
        let mut class_totals = vec![0f64; n];
        let mut vocabulary: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for record in &training {
            let Ok(class) = labels.binary_search(&record.tags) else {
                continue;
            };
            class_rows[class] += 1;
            for feature in features(record) {
                vocabulary.entry(feature).or_insert_with(|| vec![0.0; n])[class] += 1.0;
                class_totals[class] += 1.0;
            }
        }

        tracing::info!(
            rows = training.len(),
            labels = n,
            features = vocabulary.len(),
            cutoff_year,
            "trained tag model"
        );
        Ok(Self {
            labels,
            class_rows,
            class_totals,
            vocabulary,
            trained_at: Utc::now(),
            training_rows: training.len(),
            cutoff_year,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn distribution(&self, record: &TransactionRecord) -> Vec<f64> {
        let rows: u64 = self.class_rows.iter().sum();
        let v = self.vocabulary.len() as f64;
        let mut scores: Vec<f64> = self
            .class_rows
            .iter()
            .map(|count| (*count as f64 / rows as f64).ln())
            .collect();

        for feature in features(record) {
            // Unseen features carry no evidence either way.
            let Some(counts) = self.vocabulary.get(&feature) else {
                continue;
            };
            for (class, score) in scores.iter_mut().enumerate() {
                *score += ((counts[class] + ALPHA) / (self.class_totals[class] + ALPHA * v)).ln();
            }
        }
        softmax(&scores)
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

impl Classifier for NaiveBayesModel {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict_proba(&self, records: &[TransactionRecord]) -> Result<Vec<Vec<f64>>> {
        if self.labels.is_empty() {
            return Err(FinbotError::ModelStale("model has an empty label set".into()));
        }
        Ok(records.iter().map(|r| self.distribution(r)).collect())
    }
}

// ---------------------------------------------------------------------------
// ModelStore
// ---------------------------------------------------------------------------

/// Owns the model artifact and its versioned backups.
pub struct ModelStore {
    path: PathBuf,
    backups_dir: PathBuf,
}

impl ModelStore {
    pub fn new(model_dir: &Path) -> Self {
        Self {
            path: model_dir.join("model.json"),
            backups_dir: model_dir.join("backups"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<NaiveBayesModel> {
        if !self.path.exists() {
            return Err(FinbotError::ModelNotLoaded(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        let model: NaiveBayesModel = serde_json::from_str(&content)?;
        if model.labels().is_empty() {
            return Err(FinbotError::ModelStale(format!(
                "{} has an empty label set",
                self.path.display()
            )));
        }
        Ok(model)
    }

    /// Write a versioned copy of `model` first, then replace the primary
    /// artifact. Returns the backup path.
    pub fn save(&self, model: &NaiveBayesModel, event: &str) -> Result<PathBuf> {
        let json = serde_json::to_string(model)?;
        let backup = versioned_path(&self.backups_dir, "model", event, "json");
        write_once(&backup, json.as_bytes()).map_err(|e| FinbotError::BackupFailed(e.to_string()))?;
        atomic_write(&self.path, json.as_bytes())?;
        tracing::info!(backup = %backup.display(), event, "saved tag model");
        Ok(backup)
    }

    pub fn train(&self, ledger: &[TransactionRecord], cutoff_year: i32, event: &str) -> Result<NaiveBayesModel> {
        let model = NaiveBayesModel::fit(ledger, cutoff_year)?;
        self.save(&model, event)?;
        Ok(model)
    }
}
