use crate::classifier::{Classifier, ModelStore};
use crate::cli::Context;
use crate::error::Result;
use crate::fmt::{format_bytes, money};
use crate::ledger::{labels_in_use, LedgerStore};
use crate::reports::current_balance;
use crate::review::ReviewCheckpoint;

pub fn run(ctx: &Context) -> Result<()> {
    let settings = &ctx.settings;
    let paths = settings.paths();
    let store = LedgerStore::new(&paths.ledger_dir);

    println!("Settings:   {}", ctx.config_path.display());
    println!("Data dir:   {}", paths.root.display());
    println!("Ledger:     {}", store.path().display());
    println!("Threshold:  {}", settings.confidence_threshold);

    if store.path().exists() {
        let size = std::fs::metadata(store.path())?.len();
        let ledger = store.read()?;
        let untagged = ledger.iter().filter(|r| !r.is_tagged()).count();
        println!("Size:       {}", format_bytes(size));
        println!();
        println!("Rows:       {}", ledger.len());
        println!("Untagged:   {untagged}");
        println!("Tags:       {}", labels_in_use(&ledger).len());
        println!("Balance:    {}", money(current_balance(&ledger)));
        println!("Backups:    {}", store.backups()?.len());
    } else {
        println!();
        println!("Ledger not found. Run `finbot init`, then `finbot ingest`.");
    }

    println!();
    let models = ModelStore::new(&paths.model_dir);
    match models.load() {
        Ok(model) => {
            println!(
                "Model:      {} tags, trained {} on {} rows",
                model.labels().len(),
                model.trained_at.format("%Y-%m-%d %H:%M"),
                model.training_rows
            );
        }
        Err(e) => println!("Model:      {e}"),
    }

    match ReviewCheckpoint::load(&paths.checkpoint)? {
        Some(cp) => {
            println!(
                "Review:     {} pending (started {}). Run `finbot review`.",
                cp.pending_count(),
                cp.created_at.format("%Y-%m-%d %H:%M")
            );
            if let Some(next) = cp.next_pending() {
                println!("Next:       {} {} ({:.0}%)", next.record.date, next.record.description, next.confidence * 100.0);
            }
        }
        None => println!("Review:     none pending"),
    }
    Ok(())
}
