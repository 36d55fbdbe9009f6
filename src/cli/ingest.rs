use colored::Colorize;

use crate::classifier::ModelStore;
use crate::cli::review::PromptResolver;
use crate::cli::Context;
use crate::error::Result;
use crate::pipeline::{IngestOptions, IngestOutcome, Pipeline, Stage};

pub fn run(ctx: &Context, interactive: bool, threshold: Option<f64>, no_reports: bool) -> Result<()> {
    let settings = &ctx.settings;
    let mut opts = IngestOptions::from_settings(settings, interactive);
    if let Some(t) = threshold {
        opts.threshold = t;
    }
    if no_reports {
        opts.write_reports = false;
    }

    // Loading first means a missing model stops us before anything is read.
    let model = ModelStore::new(&settings.paths().model_dir).load()?;

    let mut pipeline = Pipeline::new(settings);
    let result = if interactive {
        let mut resolver = PromptResolver;
        pipeline.run(&model, Some(&mut resolver), &opts)
    } else {
        pipeline.run(&model, None, &opts)
    };
    if pipeline.stage() == Stage::Aborted {
        eprintln!("{}", "Ingestion aborted; the ledger was not changed.".red());
    }
    print_outcome(&result?);
    Ok(())
}

pub(crate) fn print_outcome(outcome: &IngestOutcome) {
    if outcome.files > 0 {
        println!(
            "Read {} file(s): {} rows, {} incomplete dropped",
            outcome.files, outcome.normalized, outcome.incomplete
        );
    }
    if outcome.failed_files > 0 {
        println!(
            "{}",
            format!("  {} file(s) could not be read and were skipped", outcome.failed_files).yellow()
        );
    }
    for err in &outcome.malformed {
        println!("  {} {err}", "skipped".yellow());
    }
    if outcome.batch_duplicates > 0 || outcome.already_in_ledger > 0 {
        println!(
            "  {} duplicate(s) in batch, {} already in ledger",
            outcome.batch_duplicates, outcome.already_in_ledger
        );
    }
    if outcome.auto_accepted + outcome.needs_review > 0 {
        println!(
            "  {} auto-tagged, {} below threshold",
            outcome.auto_accepted, outcome.needs_review
        );
    }
    if outcome.resolved > 0 {
        println!("  {} reviewed, {} changed from the suggestion", outcome.resolved, outcome.changed);
    }

    match outcome.stage {
        Stage::Paused => {
            println!(
                "{}",
                format!(
                    "Review paused with {} left. Run `finbot review` to continue.",
                    outcome.pending
                )
                .yellow()
            );
        }
        _ if outcome.files == 0 => println!("{}", "No input files found.".yellow()),
        _ => {
            println!("{}", format!("{} new row(s) added to the ledger.", outcome.added).green());
            if let Some(path) = &outcome.backup {
                println!("  Backup: {}", path.display());
            }
        }
    }

    if outcome.retrained {
        println!("{}", "Model retrained with your corrections.".green());
    } else if let Some(err) = &outcome.retrain_error {
        println!("{}", format!("Retraining failed: {err}").red());
    }
}
