use colored::Colorize;

use crate::cli::Context;
use crate::error::Result;
use crate::settings::save_settings;

pub fn run(ctx: &Context) -> Result<()> {
    let paths = ctx.settings.paths();
    paths.create_all()?;
    save_settings(&ctx.config_path, &ctx.settings)?;

    println!("Initialized finbot at {}", paths.root.display());
    println!("  Settings: {}", ctx.config_path.display());
    println!("  Drop bank exports into {}", paths.input_dir.display());
    println!(
        "{}",
        "Tag a few ledger rows and run `finbot train` before the first ingest.".dimmed()
    );
    Ok(())
}
