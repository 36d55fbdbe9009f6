use colored::Colorize;
use regex::Regex;

use crate::classifier::ModelStore;
use crate::cli::Context;
use crate::error::{FinbotError, Result};
use crate::fmt::money;
use crate::ledger::{LedgerStore, Selector};
use crate::models::TransactionRecord;
use crate::normalizer::parse_amount;

fn store(ctx: &Context) -> LedgerStore {
    LedgerStore::new(&ctx.settings.paths().ledger_dir)
}

fn parse_index(raw: &str) -> Result<usize> {
    raw.parse()
        .map_err(|_| FinbotError::Other(format!("'{raw}' is not a row index")))
}

/// `tag <INDEX>... <TAG>`, `tag --where-tag OLD <TAG>` or
/// `tag --where-desc REGEX <TAG>`.
pub fn tag(ctx: &Context, where_tag: Option<&str>, where_desc: Option<&str>, args: &[String]) -> Result<()> {
    let (selector, new_tag, event) = match (where_tag, where_desc, args) {
        (Some(old), None, [new_tag]) => (
            Selector::TagEquals(old.to_string()),
            new_tag.as_str(),
            format!("retag_{old}"),
        ),
        (None, Some(pattern), [new_tag]) => {
            let re = Regex::new(pattern)?;
            (
                Selector::Where(Box::new(move |r: &TransactionRecord| re.is_match(&r.description))),
                new_tag.as_str(),
                format!("tag_{new_tag}"),
            )
        }
        (None, None, [index, new_tag]) => {
            let index = parse_index(index)?;
            (Selector::Index(index), new_tag.as_str(), format!("tag_{index}"))
        }
        (None, None, [indices @ .., new_tag]) if !indices.is_empty() => {
            let indices = indices.iter().map(|i| parse_index(i)).collect::<Result<Vec<_>>>()?;
            (Selector::Indices(indices), new_tag.as_str(), format!("tag_{new_tag}"))
        }
        _ => {
            return Err(FinbotError::Other(
                "usage: finbot tag <INDEX>... <TAG> | finbot tag --where-tag <OLD> <TAG> | finbot tag --where-desc <REGEX> <TAG>"
                    .into(),
            ))
        }
    };

    let update = store(ctx).update_tag(&selector, new_tag, &event, true)?;
    if update.updated.is_empty() {
        println!("{}", "No matching rows.".yellow());
        return Ok(());
    }
    for &i in &update.updated {
        let r = &update.ledger[i];
        println!("  {i:>5}  {}  {:<40}  {}", r.date, r.description, money(r.amount));
    }
    println!("{}", format!("Tagged {} row(s) as {new_tag}.", update.updated.len()).green());
    if let Some(backup) = &update.backup {
        println!("  Backup: {}", backup.display());
    }
    Ok(())
}

pub fn replace(ctx: &Context, old: &str, new: &str, retrain: bool) -> Result<()> {
    let update = store(ctx).replace_tag(old, new, true)?;
    if update.updated.is_empty() {
        println!("{}", format!("No rows tagged {old}.").yellow());
        return Ok(());
    }
    println!(
        "{}",
        format!("Renamed {old} to {new} on {} row(s).", update.updated.len()).green()
    );

    if retrain {
        let models = ModelStore::new(&ctx.settings.paths().model_dir);
        models.train(&update.ledger, ctx.settings.training_cutoff_year, &format!("replace_tag_{old}_{new}"))?;
        println!("{}", "Model retrained.".green());
    }
    Ok(())
}

pub fn offset(ctx: &Context, index: usize, amount: &str, tag: &str, notes: &str) -> Result<()> {
    let amount = parse_amount(amount)?;
    let outcome = store(ctx).add_offset(index, amount, tag, notes)?;
    let offset = &outcome.ledger[outcome.offset_index];
    println!(
        "{}",
        format!(
            "Added offset row {}: {} {} tagged {tag}.",
            outcome.offset_index,
            offset.description,
            money(offset.amount)
        )
        .green()
    );
    println!("  Backup: {}", outcome.backup.display());
    Ok(())
}
