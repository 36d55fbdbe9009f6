use colored::Colorize;
use comfy_table::{Cell, Table};
use dialoguer::Input;

use crate::cli::ingest::print_outcome;
use crate::cli::Context;
use crate::error::{FinbotError, Result};
use crate::fmt::money_colored;
use crate::pipeline::{IngestOptions, Pipeline};
use crate::review::{Decision, ReviewCandidate, Resolver};

/// Asks the operator at the terminal.
#[derive(Debug, Default)]
pub struct PromptResolver;

impl Resolver for PromptResolver {
    fn decide(&mut self, candidate: &ReviewCandidate, position: usize, total: usize) -> Result<Decision> {
        let r = &candidate.record;
        println!("{}", "\u{2500}".repeat(60));
        println!("  [{position}/{total}]");
        println!("  Date:        {}", r.date);
        println!("  Description: {}", r.description);
        println!("  Amount:      {}", money_colored(r.amount));
        println!("  Source:      {}", r.source_type);
        if let Some(check) = &r.check_number {
            println!("  Check:       {check}");
        }

        let mut table = Table::new();
        table.set_header(vec!["#", "Tag", "Probability"]);
        for (i, (tag, p)) in candidate.alternatives.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(tag),
                Cell::new(format!("{:.1}%", p * 100.0)),
            ]);
        }
        println!("{table}");

        let choice: String = Input::new()
            .with_prompt(format!(
                "Tag (Enter={}, 1-{} pick, s=skip, q=quit, or type a tag)",
                candidate.predicted_tag,
                candidate.alternatives.len()
            ))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| FinbotError::Other(format!("prompt failed: {e}")))?;
        let choice = choice.trim();

        let decision = match choice.to_lowercase().as_str() {
            "" => Decision::Accept,
            "q" => Decision::Pause,
            "s" => Decision::Skip,
            _ => match choice.parse::<usize>() {
                Ok(n) if n >= 1 && n <= candidate.alternatives.len() => {
                    Decision::Replace(candidate.alternatives[n - 1].0.clone())
                }
                _ => Decision::Replace(choice.to_string()),
            },
        };
        match &decision {
            Decision::Accept => println!("{}", format!("\u{2192} {}", candidate.predicted_tag).green()),
            Decision::Replace(tag) => println!("{}", format!("\u{2192} {tag}").green()),
            Decision::Skip => println!("{}", "skipped".dimmed()),
            Decision::Pause => println!("{}", "Review paused.".yellow()),
        }
        Ok(decision)
    }
}

pub fn run(ctx: &Context) -> Result<()> {
    let opts = IngestOptions::from_settings(&ctx.settings, true);
    let mut resolver = PromptResolver;
    let outcome = Pipeline::new(&ctx.settings).resume(&mut resolver, &opts)?;
    print_outcome(&outcome);
    Ok(())
}
