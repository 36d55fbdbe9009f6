mod atomic;
mod classifier;
mod cli;
mod dedup;
mod error;
mod fmt;
mod ledger;
mod models;
mod normalizer;
mod pipeline;
mod reports;
mod review;
mod settings;
mod sources;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, Context};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = Context::load(cli.config.as_deref(), cli.data_dir.as_deref()).and_then(|ctx| match cli.command {
        Commands::Init => cli::init::run(&ctx),
        Commands::Ingest {
            interactive,
            threshold,
            no_reports,
        } => cli::ingest::run(&ctx, interactive, threshold, no_reports),
        Commands::Review => cli::review::run(&ctx),
        Commands::Train { event } => cli::train::run(&ctx, &event),
        Commands::List { year, month, tag } => cli::list::run(&ctx, year, month, tag),
        Commands::Tag {
            where_tag,
            where_desc,
            args,
        } => cli::tags::tag(&ctx, where_tag.as_deref(), where_desc.as_deref(), &args),
        Commands::ReplaceTag { old, new, retrain } => cli::tags::replace(&ctx, &old, &new, retrain),
        Commands::Offset {
            index,
            amount,
            tag,
            notes,
        } => cli::tags::offset(&ctx, index, &amount, &tag, &notes),
        Commands::Dedupe { keep } => cli::backup::dedupe(&ctx, keep),
        Commands::Backup { event, list } => {
            if list {
                cli::backup::list(&ctx)
            } else {
                cli::backup::run(&ctx, &event)
            }
        }
        Commands::Report { kind, write } => cli::report::run(&ctx, kind, write),
        Commands::Status => cli::status::run(&ctx),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
