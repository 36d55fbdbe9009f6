use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use crate::classifier::{Classifier, ModelStore};
use crate::dedup::{dedupe, Keep};
use crate::error::{FinbotError, Result};
use crate::ledger::LedgerStore;
use crate::models::TransactionRecord;
use crate::normalizer::normalize_all;
use crate::reports::write_reports;
use crate::review::{partition_scored, resolve_pending, validate_threshold, ReviewCheckpoint, ReviewState, Resolver};
use crate::settings::{DataPaths, Settings};
use crate::sources::discover_inputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    CollectRaw,
    Normalize,
    Deduplicate,
    Predict,
    Partition,
    Resolve,
    Merge,
    Retrain,
    Merged,
    Paused,
    Aborted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CollectRaw => "collect",
            Self::Normalize => "normalize",
            Self::Deduplicate => "deduplicate",
            Self::Predict => "predict",
            Self::Partition => "partition",
            Self::Resolve => "resolve",
            Self::Merge => "merge",
            Self::Retrain => "retrain",
            Self::Merged => "merged",
            Self::Paused => "paused",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub interactive: bool,
    pub threshold: f64,
    pub event: String,
    pub write_reports: bool,
}

impl IngestOptions {
    pub fn from_settings(settings: &Settings, interactive: bool) -> Self {
        Self {
            interactive,
            threshold: settings.confidence_threshold,
            event: "insert".to_string(),
            write_reports: settings.write_reports,
        }
    }
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub files: usize,
    pub normalized: usize,
    pub malformed: Vec<FinbotError>,
    pub failed_files: usize,
    pub incomplete: usize,
    pub batch_duplicates: usize,
    pub already_in_ledger: usize,
    pub auto_accepted: usize,
    pub needs_review: usize,
    pub resolved: usize,
    pub changed: usize,
    pub added: usize,
    pub pending: usize,
    pub backup: Option<PathBuf>,
    pub retrained: bool,
    pub retrain_error: Option<String>,
    pub stage: Stage,
}

/// Raw exports to ledger, one direction only. The ledger is written in
/// the merge stage and nowhere else, so any failure before it leaves the
/// ledger exactly as it was.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    paths: DataPaths,
    ledger: LedgerStore,
    models: ModelStore,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        let paths = settings.paths();
        Self {
            ledger: LedgerStore::new(&paths.ledger_dir),
            models: ModelStore::new(&paths.model_dir),
            paths,
            settings,
            stage: Stage::CollectRaw,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = %self.stage, to = %stage, "pipeline stage");
        self.stage = stage;
    }

    fn abort_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!(stage = %self.stage, error = %e, "ingestion aborted");
            self.stage = Stage::Aborted;
        }
        result
    }

    pub fn run(
        &mut self,
        classifier: &dyn Classifier,
        resolver: Option<&mut dyn Resolver>,
        opts: &IngestOptions,
    ) -> Result<IngestOutcome> {
        let result = self.ingest(classifier, resolver, opts);
        self.abort_on_err(result)
    }

    /// Continue a paused interactive review and merge once it completes.
    pub fn resume(&mut self, resolver: &mut dyn Resolver, opts: &IngestOptions) -> Result<IngestOutcome> {
        let result = self.resume_inner(resolver, opts);
        self.abort_on_err(result)
    }

    fn ingest(
        &mut self,
        classifier: &dyn Classifier,
        resolver: Option<&mut dyn Resolver>,
        opts: &IngestOptions,
    ) -> Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();
        validate_threshold(opts.threshold)?;
        if self.paths.checkpoint.exists() {
            return Err(FinbotError::Other(
                "A paused review is pending. Run `finbot review` to finish it first.".into(),
            ));
        }

        self.enter(Stage::CollectRaw);
        let inputs = discover_inputs(&self.paths.input_dir, &self.settings.sources)?;
        outcome.files = inputs.len();

        self.enter(Stage::Normalize);
        let normalized = normalize_all(&inputs);
        outcome.normalized = normalized.records.len();
        outcome.failed_files = normalized.failed_files;
        outcome.incomplete = normalized.incomplete;
        outcome.malformed = normalized.malformed;

        self.enter(Stage::Deduplicate);
        let batch = self.deduplicate(normalized.records, &mut outcome)?;
        if batch.is_empty() {
            self.enter(Stage::Merged);
            outcome.stage = Stage::Merged;
            return Ok(outcome);
        }

        self.enter(Stage::Predict);
        let probas = classifier.predict_proba(&batch)?;

        self.enter(Stage::Partition);
        let split = partition_scored(batch, probas, classifier.labels(), opts.threshold)?;
        outcome.auto_accepted = split.auto_accepted.len();
        outcome.needs_review = split.needs_review.len();

        if !opts.interactive {
            let records = split.into_batch(self.settings.low_confidence_policy);
            self.merge(records, opts, &mut outcome)?;
            return Ok(outcome);
        }

        let Some(resolver) = resolver else {
            return Err(FinbotError::Other("interactive ingest needs a resolver".into()));
        };
        let checkpoint = ReviewCheckpoint::new(&opts.event, split);
        checkpoint.save(&self.paths.checkpoint)?;
        self.review(checkpoint, resolver, opts, outcome)
    }

    fn resume_inner(&mut self, resolver: &mut dyn Resolver, opts: &IngestOptions) -> Result<IngestOutcome> {
        let checkpoint = ReviewCheckpoint::load(&self.paths.checkpoint)?
            .ok_or_else(|| FinbotError::NoCheckpoint(self.paths.checkpoint.clone()))?;
        let outcome = IngestOutcome {
            auto_accepted: checkpoint.accepted.len(),
            needs_review: checkpoint.candidates.len(),
            ..Default::default()
        };
        let opts = IngestOptions {
            event: checkpoint.event.clone(),
            ..opts.clone()
        };
        self.review(checkpoint, resolver, &opts, outcome)
    }

    /// Drop repeats inside the batch, then anything the ledger already
    /// holds. Ledger rows win, so there is no point predicting them.
    fn deduplicate(
        &mut self,
        records: Vec<TransactionRecord>,
        outcome: &mut IngestOutcome,
    ) -> Result<Vec<TransactionRecord>> {
        let before = records.len();
        let mut batch = dedupe(records, Keep::First);
        outcome.batch_duplicates = before - batch.len();

        let known: HashSet<_> = self.ledger.read()?.iter().map(|r| r.key()).collect();
        let before = batch.len();
        batch.retain(|r| !known.contains(&r.key()));
        outcome.already_in_ledger = before - batch.len();

        batch.sort_by_key(|r| r.date);
        Ok(batch)
    }

    fn review(
        &mut self,
        mut checkpoint: ReviewCheckpoint,
        resolver: &mut dyn Resolver,
        opts: &IngestOptions,
        mut outcome: IngestOutcome,
    ) -> Result<IngestOutcome> {
        self.enter(Stage::Resolve);
        let state = resolve_pending(&mut checkpoint, resolver, &self.paths.checkpoint)?;
        outcome.resolved = checkpoint.resolutions.len();
        outcome.changed = checkpoint.changed_count();
        outcome.pending = checkpoint.pending_count();

        if state == ReviewState::Paused {
            self.enter(Stage::Paused);
            outcome.stage = Stage::Paused;
            return Ok(outcome);
        }

        let records = checkpoint.into_batch(self.settings.low_confidence_policy);
        self.merge(records, opts, &mut outcome)?;
        ReviewCheckpoint::discard(&self.paths.checkpoint)?;

        if outcome.changed > 0 {
            self.retrain(&mut outcome);
        }
        Ok(outcome)
    }

    fn merge(
        &mut self,
        records: Vec<TransactionRecord>,
        opts: &IngestOptions,
        outcome: &mut IngestOutcome,
    ) -> Result<()> {
        self.enter(Stage::Merge);
        let inserted = self.ledger.insert_batch(records, &opts.event)?;
        outcome.added = inserted.added;
        outcome.backup = inserted.backup;

        if opts.write_reports {
            if let Err(e) = write_reports(&inserted.ledger, &self.paths.reports_dir) {
                tracing::warn!(error = %e, "could not refresh reports");
            }
        }
        self.enter(Stage::Merged);
        outcome.stage = Stage::Merged;
        Ok(())
    }

    /// Runs after the merge; a failure here is reported but never undoes
    /// the merge.
    fn retrain(&mut self, outcome: &mut IngestOutcome) {
        self.enter(Stage::Retrain);
        let result = self
            .ledger
            .read()
            .and_then(|ledger| self.models.train(&ledger, self.settings.training_cutoff_year, "new_validated_inputs"));
        match result {
            Ok(_) => outcome.retrained = true,
            Err(e) => {
                tracing::warn!(error = %e, "retraining failed");
                outcome.retrain_error = Some(e.to_string());
            }
        }
        self.enter(Stage::Merged);
    }
}
