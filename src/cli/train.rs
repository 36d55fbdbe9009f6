use chrono::Datelike;
use colored::Colorize;

use crate::classifier::{Classifier, ModelStore};
use crate::cli::Context;
use crate::error::Result;
use crate::ledger::LedgerStore;

pub fn run(ctx: &Context, event: &str) -> Result<()> {
    let paths = ctx.settings.paths();
    let ledger = LedgerStore::new(&paths.ledger_dir).read()?;
    let store = ModelStore::new(&paths.model_dir);
    let model = store.train(&ledger, ctx.settings.training_cutoff_year, event)?;

    println!(
        "{}",
        format!(
            "Trained on {} rows from {} onward: {} tags, {} features.",
            model.training_rows,
            model.cutoff_year,
            model.labels().len(),
            model.vocabulary_size()
        )
        .green()
    );
    println!("  Model: {}", store.path().display());

    let tagged: Vec<_> = ledger
        .into_iter()
        .filter(|r| r.is_tagged() && r.date.year() >= model.cutoff_year)
        .collect();
    let predicted = model.predict(&tagged)?;
    let agree = tagged.iter().zip(&predicted).filter(|(r, p)| &r.tags == *p).count();
    println!(
        "  Agrees with {agree} of {} training rows ({:.0}%)",
        tagged.len(),
        agree as f64 * 100.0 / tagged.len().max(1) as f64
    );
    Ok(())
}
